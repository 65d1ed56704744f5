//! Ambient access to the flow of the running invocation.
//!
//! The invocation harness binds a [`Flow`] to the task executing the
//! invocation body. Code running inside that task reaches it through
//! [`current_flow`] without threading a handle through every call. The binding
//! ends when the body returns, whatever its outcome.
//!
//! The binding is task-local: tasks spawned from the body do not inherit it
//! unless they are wrapped in [`scope`] themselves.

use crate::errors::FlowError;
use crate::flow::Flow;
use std::future::Future;

tokio::task_local! {
    static CURRENT_FLOW: Flow;
}

/// Returns the flow owning the running invocation.
///
/// Fails with [`FlowError::NoActiveFlow`] outside an invocation.
pub fn current_flow() -> Result<Flow, FlowError> {
    CURRENT_FLOW
        .try_with(Flow::clone)
        .map_err(|_| FlowError::NoActiveFlow)
}

/// Alias of [`current_flow`].
pub fn current_runtime() -> Result<Flow, FlowError> {
    current_flow()
}

/// Returns true while an invocation's flow is bound to this task.
#[must_use]
pub fn is_active() -> bool {
    CURRENT_FLOW.try_with(|_| ()).is_ok()
}

/// Runs `body` with `flow` bound as the current flow.
pub async fn scope<F: Future>(flow: Flow, body: F) -> F::Output {
    CURRENT_FLOW.scope(flow, body).await
}
