//! Termination hooks.
//!
//! A [`TerminationHookRegistry`] holds the hooks of one flow. Once the flow is
//! terminal every hook runs exactly once, in registration order, and receives
//! the flow's final [`FlowState`]. A failing hook is logged and recorded as a
//! [`HookFailure`]; it never stops the hooks after it.
//!
//! Hooks registered after termination still run, after every hook registered
//! before them.

use crate::bridge::panic_message;
use crate::core::FlowState;
use crate::errors::HookFailure;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

type HookFn = Box<dyn FnOnce(FlowState) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct PendingHook {
    index: usize,
    name: Option<String>,
    hook: HookFn,
}

#[derive(Default)]
struct State {
    pending: VecDeque<PendingHook>,
    next_index: usize,
    terminal: Option<FlowState>,
    draining: bool,
    completed: usize,
    failures: Vec<HookFailure>,
}

struct Inner {
    state: Mutex<State>,
    idle: Notify,
    hook_timeout: Duration,
}

/// Ordered termination hooks of one flow.
///
/// Cheap to clone; clones share the same hooks.
#[derive(Clone)]
pub struct TerminationHookRegistry {
    inner: Arc<Inner>,
}

impl Default for TerminationHookRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl TerminationHookRegistry {
    /// Creates a registry allowing each hook `hook_timeout` to finish.
    #[must_use]
    pub fn new(hook_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                idle: Notify::new(),
                hook_timeout,
            }),
        }
    }

    /// Registers a hook and returns its position.
    ///
    /// Never blocks. If the flow is already terminal the hook is scheduled
    /// right away on the current tokio runtime.
    pub fn register<F, Fut>(&self, name: Option<&str>, hook: F) -> usize
    where
        F: FnOnce(FlowState) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (index, start_drain) = {
            let mut state = self.inner.state.lock();
            let index = state.next_index;
            state.next_index += 1;
            state.pending.push_back(PendingHook {
                index,
                name: name.map(String::from),
                hook: Box::new(move |flow_state| hook(flow_state).boxed()),
            });
            let start_drain = state.terminal.is_some() && !state.draining;
            if start_drain {
                state.draining = true;
            }
            (index, start_drain)
        };

        if start_drain {
            debug!(index, "Hook registered after termination, running now");
            let registry = self.clone();
            tokio::spawn(async move {
                registry.drain().await;
            });
        }
        index
    }

    /// Marks the flow terminal and runs the pending hooks.
    ///
    /// Only the first call has any effect. Returns the failures of the hooks
    /// run by this call.
    pub async fn terminate(&self, flow_state: FlowState) -> Vec<HookFailure> {
        {
            let mut state = self.inner.state.lock();
            if state.terminal.is_some() {
                return Vec::new();
            }
            state.terminal = Some(flow_state);
            if state.draining {
                return Vec::new();
            }
            state.draining = true;
        }
        self.drain().await
    }

    async fn drain(&self) -> Vec<HookFailure> {
        let mut failures = Vec::new();
        loop {
            let (next, flow_state) = {
                let mut state = self.inner.state.lock();
                match state.pending.pop_front() {
                    Some(next) => (next, state.terminal.unwrap_or_default()),
                    None => {
                        state.draining = false;
                        drop(state);
                        self.inner.idle.notify_waiters();
                        return failures;
                    }
                }
            };

            let outcome = self.run_hook(next.hook, flow_state).await;
            let label = next.name.unwrap_or_else(|| format!("#{}", next.index));
            let mut state = self.inner.state.lock();
            state.completed += 1;
            if let Err(message) = outcome {
                warn!(hook = %label, flow_state = %flow_state, "Termination hook failed: {}", message);
                let failure = HookFailure::new(next.index, message);
                state.failures.push(failure.clone());
                failures.push(failure);
            }
        }
    }

    async fn run_hook(&self, hook: HookFn, flow_state: FlowState) -> Result<(), String> {
        let running = AssertUnwindSafe(hook(flow_state)).catch_unwind();
        match tokio::time::timeout(self.inner.hook_timeout, running).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(format!("{err:#}")),
            Ok(Err(panic)) => Err(format!("hook panicked: {}", panic_message(&*panic))),
            Err(_) => Err(format!("hook timed out after {:?}", self.inner.hook_timeout)),
        }
    }

    /// Waits until the flow is terminal and no hook is pending or running.
    pub async fn settled(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.inner.state.lock();
                if state.terminal.is_some() && !state.draining && state.pending.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Returns true once the flow has been marked terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.inner.state.lock().terminal.is_some()
    }

    /// Returns the number of hooks waiting to run.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Returns the number of hooks that have run, successfully or not.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.inner.state.lock().completed
    }

    /// Returns every hook failure recorded so far.
    #[must_use]
    pub fn failures(&self) -> Vec<HookFailure> {
        self.inner.state.lock().failures.clone()
    }
}

impl std::fmt::Debug for TerminationHookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TerminationHookRegistry")
            .field("terminal", &state.terminal)
            .field("pending_count", &state.pending.len())
            .field("completed", &state.completed)
            .finish()
    }
}
