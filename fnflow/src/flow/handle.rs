//! The flow handle: graph-level combinators.

use super::closure::Closure;
use super::future::{AsStageId, FlowFuture, ResultsFuture, CAPTURED_ENTRY};
use crate::completer::{AddStageRequest, CompleterClient};
use crate::core::{CompletionOperation, CompletionResult, Datum, FlowId, StageId};
use crate::engine;
use crate::errors::FlowError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A handle to one completion graph.
///
/// Cheap to clone. All clones talk to the same graph on the same completer.
#[derive(Clone)]
pub struct Flow {
    id: FlowId,
    client: Arc<dyn CompleterClient>,
}

impl Flow {
    /// Creates a handle for an existing graph.
    #[must_use]
    pub fn new(id: FlowId, client: Arc<dyn CompleterClient>) -> Self {
        Self { id, client }
    }

    /// Returns the graph ID.
    #[must_use]
    pub fn id(&self) -> &FlowId {
        &self.id
    }

    /// Returns the completer client this handle talks to.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn CompleterClient> {
        &self.client
    }

    pub(crate) async fn add_stage<T>(&self, request: AddStageRequest) -> Result<FlowFuture<T>, FlowError> {
        let operation = request.operation;
        let stage_id = self.client.add_stage(&self.id, request).await?;
        debug!(flow_id = %self.id, stage_id = %stage_id, operation = %operation, "Added stage");
        Ok(FlowFuture::new(self.clone(), stage_id))
    }

    /// Creates a root stage that runs `closure` with no inputs.
    pub async fn supply<T>(&self, closure: Closure) -> Result<FlowFuture<T>, FlowError> {
        self.add_stage(AddStageRequest::new(CompletionOperation::Supply, Vec::new()).with_closure(closure))
            .await
    }

    /// Creates a stage that is already completed with `value`.
    pub async fn completed_value<T: Serialize>(&self, value: &T) -> Result<FlowFuture<T>, FlowError> {
        let result = CompletionResult::success(Datum::json(value)?);
        let stage_id = self.client.add_completed_value(&self.id, result).await?;
        Ok(FlowFuture::new(self.clone(), stage_id))
    }

    /// Creates a stage that is already failed with `datum`.
    ///
    /// Retrieving it surfaces `datum` unchanged.
    pub async fn failed_future<T>(&self, datum: Datum) -> Result<FlowFuture<T>, FlowError> {
        let stage_id = self
            .client
            .add_completed_value(&self.id, CompletionResult::failure(datum))
            .await?;
        Ok(FlowFuture::new(self.clone(), stage_id))
    }

    /// Creates a stage that completes with no value after `delay`.
    pub async fn delay(&self, delay: Duration) -> Result<FlowFuture<()>, FlowError> {
        let stage_id = self.client.add_delay(&self.id, delay).await?;
        debug!(flow_id = %self.id, stage_id = %stage_id, delay = ?delay, "Added delay");
        Ok(FlowFuture::new(self.clone(), stage_id))
    }

    /// Creates a barrier that completes once every input is terminal.
    ///
    /// The barrier always completes with no value, even when inputs failed.
    /// Inspect each input with [`FlowFuture::get`] afterwards.
    pub async fn all_of(&self, futures: &[&dyn AsStageId]) -> Result<FlowFuture<()>, FlowError> {
        let deps = self.dependencies(CompletionOperation::AllOf, futures)?;
        self.add_stage(AddStageRequest::new(CompletionOperation::AllOf, deps))
            .await
    }

    /// Creates a stage that takes the outcome of the first input to complete.
    pub async fn any_of<T>(&self, futures: &[FlowFuture<T>]) -> Result<FlowFuture<T>, FlowError> {
        let refs: Vec<&dyn AsStageId> = futures.iter().map(|f| f as &dyn AsStageId).collect();
        let deps = self.dependencies(CompletionOperation::AnyOf, &refs)?;
        self.add_stage(AddStageRequest::new(CompletionOperation::AnyOf, deps))
            .await
    }

    /// Waits for all inputs, then hands back the input handles.
    ///
    /// Equivalent to `all_of(futures).then_apply(|_| futures)`. Never fails
    /// because an input failed.
    pub async fn all_results<T>(&self, futures: &[FlowFuture<T>]) -> Result<ResultsFuture<T>, FlowError> {
        let refs: Vec<&dyn AsStageId> = futures.iter().map(|f| f as &dyn AsStageId).collect();
        let barrier = self.all_of(&refs).await?;
        let ids: Vec<&StageId> = futures.iter().map(FlowFuture::id).collect();
        let collect = Closure::with_captured(CAPTURED_ENTRY, &ids)?;
        let inner = barrier.then_apply::<Vec<StageId>>(collect).await?;
        Ok(ResultsFuture::new(inner))
    }

    /// Registers a termination hook.
    ///
    /// Hooks run once each, in registration order, when the graph terminates.
    pub async fn add_termination_hook(&self, closure: Closure) -> Result<(), FlowError> {
        debug!(flow_id = %self.id, entry = %closure, "Adding termination hook");
        self.client.add_termination_hook(&self.id, closure).await
    }

    pub(crate) fn dependencies(
        &self,
        operation: CompletionOperation,
        futures: &[&dyn AsStageId],
    ) -> Result<Vec<StageId>, FlowError> {
        engine::check_inputs(operation, futures.len())?;
        futures
            .iter()
            .map(|f| {
                if f.flow_id() == &self.id {
                    Ok(f.stage_id().clone())
                } else {
                    Err(FlowError::invalid_argument(format!(
                        "stage {} belongs to flow {}, not {}",
                        f.stage_id(),
                        f.flow_id(),
                        self.id
                    )))
                }
            })
            .collect()
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow").field("id", &self.id).finish()
    }
}
