//! The contract the flow client needs from a completer service.

use super::model::AddStageRequest;
use crate::core::{CompletionResult, FlowId, FlowState, StageId};
use crate::errors::FlowError;
use crate::flow::Closure;
use async_trait::async_trait;
use std::time::Duration;

/// Graph-construction and retrieval calls against a completer service.
///
/// Implementations own scheduling, persistence and execution of stages. The
/// client only ever refers to flows and stages by ID.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompleterClient: Send + Sync {
    /// Creates a new flow for the given function.
    async fn create_flow(&self, function_id: &str) -> Result<FlowId, FlowError>;

    /// Adds a stage and returns its ID.
    async fn add_stage(&self, flow_id: &FlowId, request: AddStageRequest) -> Result<StageId, FlowError>;

    /// Adds a stage that is already terminal with the given result.
    async fn add_completed_value(
        &self,
        flow_id: &FlowId,
        result: CompletionResult,
    ) -> Result<StageId, FlowError>;

    /// Adds a stage that resolves to `success(empty)` after `delay`.
    async fn add_delay(&self, flow_id: &FlowId, delay: Duration) -> Result<StageId, FlowError>;

    /// Waits until the stage is terminal and returns its result.
    ///
    /// With a timeout, fails with [`FlowError::Timeout`] if the stage is still
    /// pending when it elapses.
    async fn await_stage(
        &self,
        flow_id: &FlowId,
        stage_id: &StageId,
        timeout: Option<Duration>,
    ) -> Result<CompletionResult, FlowError>;

    /// Registers a termination hook on the flow.
    async fn add_termination_hook(&self, flow_id: &FlowId, closure: Closure) -> Result<(), FlowError>;

    /// Marks the end of the invocation that built the flow.
    ///
    /// No further stages will be added by that invocation. The flow becomes
    /// terminal once every stage has resolved.
    async fn commit(&self, flow_id: &FlowId, state: FlowState) -> Result<(), FlowError>;
}
