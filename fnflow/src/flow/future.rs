//! Stage handles.

use super::closure::Closure;
use super::handle::Flow;
use crate::bridge::bridge;
use crate::completer::AddStageRequest;
use crate::core::{CompletionOperation, CompletionResult, FlowId, StageId};
use crate::errors::FlowError;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

/// Entry name of the built-in continuation that returns its captured data.
pub const CAPTURED_ENTRY: &str = "fnflow.captured";

/// Anything that identifies a stage in a flow.
///
/// Lets barriers accept handles of different value types.
pub trait AsStageId: Send + Sync {
    /// The flow the stage belongs to.
    fn flow_id(&self) -> &FlowId;
    /// The stage.
    fn stage_id(&self) -> &StageId;
}

/// A typed reference to one stage of a flow.
///
/// Handles are plain values: cloning one does not create a stage, and
/// dropping one does not affect the stage.
pub struct FlowFuture<T> {
    flow: Flow,
    stage_id: StageId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FlowFuture<T> {
    /// Creates a handle for an existing stage.
    #[must_use]
    pub fn new(flow: Flow, stage_id: StageId) -> Self {
        Self {
            flow,
            stage_id,
            _marker: PhantomData,
        }
    }

    /// Returns the stage ID.
    #[must_use]
    pub fn id(&self) -> &StageId {
        &self.stage_id
    }

    /// Returns the ID of the owning flow.
    #[must_use]
    pub fn flow_id(&self) -> &FlowId {
        self.flow.id()
    }

    /// Returns the owning flow.
    #[must_use]
    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Waits for the stage and returns its raw result.
    pub async fn result(&self) -> Result<CompletionResult, FlowError> {
        self.await_result(None).await
    }

    async fn await_result(&self, timeout: Option<Duration>) -> Result<CompletionResult, FlowError> {
        self.flow
            .client()
            .await_stage(self.flow.id(), &self.stage_id, timeout)
            .await
    }

    /// Creates a stage that runs `closure` on this stage's value.
    ///
    /// If this stage fails, the new stage is never run and fails with the
    /// same datum.
    pub async fn then_apply<U>(&self, closure: Closure) -> Result<FlowFuture<U>, FlowError> {
        self.dependent(CompletionOperation::ThenApply, closure).await
    }

    /// Creates a stage that runs `closure` on this stage's value and adopts
    /// the outcome of the stage it returns.
    pub async fn then_compose<U>(&self, closure: Closure) -> Result<FlowFuture<U>, FlowError> {
        self.dependent(CompletionOperation::ThenCompose, closure).await
    }

    /// Creates a stage that recovers from this stage's failure.
    ///
    /// On success the value is forwarded unchanged and `closure` is not run.
    pub async fn exceptionally(&self, closure: Closure) -> Result<FlowFuture<T>, FlowError> {
        self.dependent(CompletionOperation::Exceptionally, closure).await
    }

    /// Creates a stage that recovers from this stage's failure by adopting
    /// the stage `closure` returns.
    ///
    /// On success the value is forwarded unchanged and `closure` is not run.
    pub async fn exceptionally_compose(&self, closure: Closure) -> Result<FlowFuture<T>, FlowError> {
        self.dependent(CompletionOperation::ExceptionallyCompose, closure).await
    }

    /// Creates a stage that runs `closure` on this stage's outcome, success or
    /// failure, and resolves to the body's result.
    pub async fn handle<U>(&self, closure: Closure) -> Result<FlowFuture<U>, FlowError> {
        self.dependent(CompletionOperation::Handle, closure).await
    }

    /// Creates a stage that runs `closure` on this stage's outcome and then
    /// resolves to that same outcome.
    ///
    /// The body's own result, including an error, is discarded.
    pub async fn when_complete(&self, closure: Closure) -> Result<FlowFuture<T>, FlowError> {
        self.dependent(CompletionOperation::WhenComplete, closure).await
    }

    /// Creates a stage that runs `closure` on the values of this stage and
    /// `other`.
    ///
    /// If either parent fails the body is not run and the stage fails with
    /// the first failure, this stage's taking precedence.
    pub async fn then_combine<U, R>(
        &self,
        other: &FlowFuture<U>,
        closure: Closure,
    ) -> Result<FlowFuture<R>, FlowError> {
        self.joined(CompletionOperation::ThenCombine, other, closure).await
    }

    /// Creates a stage that runs `closure` on the value of whichever of this
    /// stage and `other` completes first.
    ///
    /// If the first to complete failed, the stage fails with that failure.
    pub async fn apply_to_either<U>(
        &self,
        other: &FlowFuture<T>,
        closure: Closure,
    ) -> Result<FlowFuture<U>, FlowError> {
        self.joined(CompletionOperation::ApplyToEither, other, closure).await
    }

    async fn joined<U, R>(
        &self,
        operation: CompletionOperation,
        other: &FlowFuture<U>,
        closure: Closure,
    ) -> Result<FlowFuture<R>, FlowError> {
        let inputs: [&dyn AsStageId; 2] = [self, other];
        let deps = self.flow.dependencies(operation, &inputs)?;
        let request = AddStageRequest::new(operation, deps).with_closure(closure);
        self.flow.add_stage(request).await
    }

    async fn dependent<U>(
        &self,
        operation: CompletionOperation,
        closure: Closure,
    ) -> Result<FlowFuture<U>, FlowError> {
        let request = AddStageRequest::new(operation, vec![self.stage_id.clone()]).with_closure(closure);
        self.flow.add_stage(request).await
    }
}

impl<T: DeserializeOwned> FlowFuture<T> {
    /// Waits for the stage and returns its value.
    ///
    /// A failed stage surfaces as [`FlowError::StageFailure`] carrying the
    /// original failure datum. Repeated calls give the same outcome.
    pub async fn get(&self) -> Result<T, FlowError> {
        Self::unwrap_result(self.await_result(None).await?)
    }

    /// As [`get`](Self::get), failing with [`FlowError::Timeout`] if the stage
    /// is not terminal within `timeout`.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<T, FlowError> {
        Self::unwrap_result(self.await_result(Some(timeout)).await?)
    }

    /// Returns the stage's value if it is already terminal, else `default`.
    ///
    /// A stage that already failed surfaces its failure as [`get`](Self::get) does.
    pub async fn get_now(&self, default: T) -> Result<T, FlowError> {
        match self.get_timeout(Duration::ZERO).await {
            Err(FlowError::Timeout(_)) => Ok(default),
            other => other,
        }
    }

    fn unwrap_result(result: CompletionResult) -> Result<T, FlowError> {
        match result {
            CompletionResult::Success(datum) => datum.decode(),
            CompletionResult::Failure(datum) => Err(bridge(datum)),
        }
    }
}

impl<T> AsStageId for FlowFuture<T> {
    fn flow_id(&self) -> &FlowId {
        self.flow.id()
    }

    fn stage_id(&self) -> &StageId {
        &self.stage_id
    }
}

impl<T> Clone for FlowFuture<T> {
    fn clone(&self) -> Self {
        Self::new(self.flow.clone(), self.stage_id.clone())
    }
}

impl<T> fmt::Debug for FlowFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowFuture")
            .field("flow_id", self.flow.id())
            .field("stage_id", &self.stage_id)
            .finish()
    }
}

/// The handle returned by [`Flow::all_results`].
///
/// Resolves to the original input handles once every input is terminal.
pub struct ResultsFuture<T> {
    inner: FlowFuture<Vec<StageId>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResultsFuture<T> {
    pub(crate) fn new(inner: FlowFuture<Vec<StageId>>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Returns the underlying stage ID.
    #[must_use]
    pub fn id(&self) -> &StageId {
        self.inner.id()
    }

    /// Waits for every input and returns their handles in input order.
    pub async fn get(&self) -> Result<Vec<FlowFuture<T>>, FlowError> {
        let ids = self.inner.get().await?;
        let flow = self.inner.flow();
        Ok(ids
            .into_iter()
            .map(|id| FlowFuture::new(flow.clone(), id))
            .collect())
    }
}

impl<T> AsStageId for ResultsFuture<T> {
    fn flow_id(&self) -> &FlowId {
        self.inner.flow_id()
    }

    fn stage_id(&self) -> &StageId {
        self.inner.id()
    }
}

impl<T> Clone for ResultsFuture<T> {
    fn clone(&self) -> Self {
        Self::new(self.inner.clone())
    }
}

impl<T> fmt::Debug for ResultsFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultsFuture")
            .field("stage_id", self.inner.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completer::MockCompleterClient;
    use crate::core::{Datum, ErrorType};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn future_with<T>(mock: MockCompleterClient) -> FlowFuture<T> {
        FlowFuture::new(Flow::new(FlowId::new("f"), Arc::new(mock)), StageId::new("1"))
    }

    #[tokio::test]
    async fn test_get_decodes_success() {
        let mut mock = MockCompleterClient::new();
        mock.expect_await_stage()
            .times(2)
            .returning(|_, _, _| Ok(CompletionResult::success(Datum::json(&42).unwrap())));

        let future: FlowFuture<i32> = future_with(mock);
        assert_eq!(future.get().await.unwrap(), 42);
        assert_eq!(future.get().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_get_bridges_failure() {
        let datum = Datum::error(ErrorType::UserError, "bad");
        let returned = datum.clone();
        let mut mock = MockCompleterClient::new();
        mock.expect_await_stage()
            .returning(move |_, _, _| Ok(CompletionResult::failure(returned.clone())));

        let future: FlowFuture<i32> = future_with(mock);
        let err = future.get().await.unwrap_err();
        assert_eq!(err.as_stage_failure().unwrap().datum(), &datum);
    }

    #[tokio::test]
    async fn test_get_timeout_passes_timeout() {
        let mut mock = MockCompleterClient::new();
        mock.expect_await_stage()
            .withf(|_, _, timeout| *timeout == Some(Duration::from_millis(10)))
            .returning(|_, stage_id, _| Err(FlowError::Timeout(stage_id.clone())));

        let future: FlowFuture<i32> = future_with(mock);
        let err = future.get_timeout(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, FlowError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_then_apply_depends_on_parent() {
        let mut mock = MockCompleterClient::new();
        mock.expect_add_stage()
            .withf(|_, request| {
                request.operation == CompletionOperation::ThenApply
                    && request.deps == vec![StageId::new("1")]
            })
            .returning(|_, _| Ok(StageId::new("2")));

        let future: FlowFuture<i32> = future_with(mock);
        let next = future.then_apply::<i32>(Closure::new("plus_three")).await.unwrap();
        assert_eq!(next.id().as_str(), "2");
        assert_eq!(next.flow_id(), future.flow_id());
    }

    #[tokio::test]
    async fn test_then_combine_depends_on_both_parents() {
        let mut mock = MockCompleterClient::new();
        mock.expect_add_stage()
            .withf(|_, request| {
                request.operation == CompletionOperation::ThenCombine
                    && request.deps == vec![StageId::new("1"), StageId::new("3")]
                    && request.closure.is_some()
            })
            .times(1)
            .returning(|_, _| Ok(StageId::new("4")));

        let future: FlowFuture<i32> = future_with(mock);
        let other: FlowFuture<String> = FlowFuture::new(future.flow().clone(), StageId::new("3"));
        let combined = future
            .then_combine::<String, i32>(&other, Closure::new("join"))
            .await
            .unwrap();
        assert_eq!(combined.id().as_str(), "4");
    }

    #[tokio::test]
    async fn test_then_combine_rejects_foreign_flow() {
        let future: FlowFuture<i32> = future_with(MockCompleterClient::new());
        let foreign: FlowFuture<i32> = FlowFuture::new(
            Flow::new(FlowId::new("other"), Arc::new(MockCompleterClient::new())),
            StageId::new("1"),
        );
        let err = future
            .then_combine::<i32, i32>(&foreign, Closure::new("join"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_get_now_falls_back_on_timeout() {
        let mut mock = MockCompleterClient::new();
        mock.expect_await_stage()
            .withf(|_, _, timeout| *timeout == Some(Duration::ZERO))
            .returning(|_, stage_id, _| Err(FlowError::Timeout(stage_id.clone())));

        let future: FlowFuture<i32> = future_with(mock);
        assert_eq!(future.get_now(7).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_results_future_rebinds_handles() {
        let mut mock = MockCompleterClient::new();
        mock.expect_await_stage().returning(|_, _, _| {
            Ok(CompletionResult::success(
                Datum::json(&vec![StageId::new("4"), StageId::new("5")]).unwrap(),
            ))
        });

        let results: ResultsFuture<i32> = ResultsFuture::new(future_with(mock));
        let handles = results.get().await.unwrap();
        let ids: Vec<&str> = handles.iter().map(|h| h.id().as_str()).collect();
        assert_eq!(ids, vec!["4", "5"]);
        assert!(handles.iter().all(|h| h.flow_id().as_str() == "f"));
    }
}
