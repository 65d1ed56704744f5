//! Flow-scoped invocation harness.

use crate::bridge;
use crate::completer::CompleterClient;
use crate::config::FlowConfig;
use crate::context;
use crate::core::{FlowId, FlowState};
use crate::errors::FlowError;
use crate::flow::Flow;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{info, warn};

/// The outcome of one flow invocation.
#[derive(Debug)]
pub struct InvocationOutcome<T> {
    /// The flow created for the invocation.
    pub flow_id: FlowId,
    /// What the invocation body returned.
    pub result: anyhow::Result<T>,
}

impl<T> InvocationOutcome<T> {
    /// Returns the body's result, dropping the flow ID.
    pub fn into_result(self) -> anyhow::Result<T> {
        self.result
    }
}

/// Runs function invocations that own a flow.
///
/// Each run creates a fresh flow before user code starts, binds it as the
/// current flow while the body runs and commits it afterwards.
#[derive(Clone)]
pub struct FlowInvocation {
    client: Arc<dyn CompleterClient>,
    config: FlowConfig,
}

impl FlowInvocation {
    /// Creates a harness over `client`.
    #[must_use]
    pub fn new(client: Arc<dyn CompleterClient>, config: FlowConfig) -> Self {
        Self { client, config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Runs one invocation body.
    ///
    /// Fails only if the flow cannot be created. The flow is committed
    /// whatever the body returns, and also when it panics, in which case the
    /// panic becomes the invocation's error. A failed commit after a
    /// successful body becomes the invocation's error.
    pub async fn run<Fut, T>(&self, body: Fut) -> Result<InvocationOutcome<T>, FlowError>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let flow_id = self.client.create_flow(&self.config.function_id).await?;
        info!(flow_id = %flow_id, function_id = %self.config.function_id, "Flow created");

        let flow = Flow::new(flow_id.clone(), Arc::clone(&self.client));
        let mut result = match AssertUnwindSafe(context::scope(flow, body)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = bridge::panic_message(&*panic);
                warn!(flow_id = %flow_id, "Invocation body panicked: {}", message);
                Err(anyhow::anyhow!("invocation body panicked: {message}"))
            }
        };

        let state = if result.is_ok() {
            FlowState::Succeeded
        } else {
            FlowState::Failed
        };

        match self.client.commit(&flow_id, state).await {
            Ok(()) => info!(flow_id = %flow_id, state = %state, "Flow committed"),
            Err(err) => {
                warn!(flow_id = %flow_id, state = %state, "Failed to commit flow: {}", err);
                if result.is_ok() {
                    result = Err(err.into());
                }
            }
        }

        Ok(InvocationOutcome { flow_id, result })
    }
}

impl std::fmt::Debug for FlowInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowInvocation")
            .field("config", &self.config)
            .finish()
    }
}
