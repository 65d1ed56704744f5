//! Request and response bodies exchanged with the completer service.

use crate::core::{CompletionOperation, CompletionResult, FlowId, FlowState, StageId};
use crate::flow::Closure;
use serde::{Deserialize, Serialize};

/// Body of a create-flow request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFlowRequest {
    /// The function the flow belongs to.
    pub function_id: String,
}

/// Response to a create-flow request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFlowResponse {
    /// The new flow.
    pub flow_id: FlowId,
}

/// Body of a create-stage request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddStageRequest {
    /// What the stage does.
    pub operation: CompletionOperation,
    /// Body to run, for operations that have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure: Option<Closure>,
    /// Stages this stage waits on, in order.
    #[serde(default)]
    pub deps: Vec<StageId>,
}

impl AddStageRequest {
    /// Creates a request for a stage without a body.
    #[must_use]
    pub fn new(operation: CompletionOperation, deps: Vec<StageId>) -> Self {
        Self {
            operation,
            closure: None,
            deps,
        }
    }

    /// Attaches a body.
    #[must_use]
    pub fn with_closure(mut self, closure: Closure) -> Self {
        self.closure = Some(closure);
        self
    }
}

/// Body of a request creating an already-completed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCompletedValueRequest {
    /// The stage's result.
    pub result: CompletionResult,
}

/// Body of a delay request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddDelayRequest {
    /// Delay in milliseconds.
    pub delay_ms: u64,
}

/// Body of a termination hook registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddTerminationHookRequest {
    /// The hook body.
    pub closure: Closure,
}

/// Body of a commit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    /// Outcome of the invocation that built the graph.
    pub state: FlowState,
}

/// Response carrying a new stage ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStageResponse {
    /// The new stage.
    pub stage_id: StageId,
}

/// Response to an await-stage request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwaitStageResponse {
    /// The stage's terminal result.
    pub result: CompletionResult,
}

/// A request from the completer to run one stage body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeStageRequest {
    /// The owning flow.
    pub flow_id: FlowId,
    /// The stage being run.
    pub stage_id: StageId,
    /// The body to run.
    pub closure: Closure,
    /// Results of the stage's inputs, in dependency order.
    #[serde(default)]
    pub args: Vec<CompletionResult>,
}

/// The outcome of running one stage body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeStageResponse {
    /// The stage's result.
    pub result: CompletionResult,
}
