//! An in-process completer for tests.
//!
//! Runs every stage as a tokio task in the current process. Stage bodies are
//! executed through a [`ContinuationInvoker`], so the same registry serves as
//! "the function" for every stage of every flow.

use crate::completer::{AddStageRequest, CompleterClient, InvokeStageRequest};
use crate::core::{CompletionOperation, CompletionResult, Datum, ErrorType, FlowId, FlowState, StageId};
use crate::engine::{self, Composition, Readiness, Resolution};
use crate::errors::FlowError;
use crate::flow::Closure;
use crate::hooks::TerminationHookRegistry;
use crate::runtime::{ContinuationInvoker, ContinuationRegistry};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::select_all;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

type Slot = Arc<watch::Sender<Option<CompletionResult>>>;

#[derive(Debug, Default)]
struct Lifecycle {
    committed: Option<FlowState>,
    active: usize,
    terminating: bool,
}

struct Graph {
    id: FlowId,
    stages: RwLock<Vec<Slot>>,
    lifecycle: Mutex<Lifecycle>,
    hooks: TerminationHookRegistry,
    terminated: watch::Sender<Option<FlowState>>,
}

impl Graph {
    fn new(id: FlowId, hook_timeout: Duration) -> Self {
        Self {
            id,
            stages: RwLock::new(Vec::new()),
            lifecycle: Mutex::new(Lifecycle::default()),
            hooks: TerminationHookRegistry::new(hook_timeout),
            terminated: watch::channel(None).0,
        }
    }

    fn slot(&self, stage_id: &StageId) -> Result<Slot, FlowError> {
        stage_id
            .as_str()
            .parse::<usize>()
            .ok()
            .and_then(|index| self.stages.read().get(index).cloned())
            .ok_or_else(|| FlowError::UnknownStage {
                flow_id: self.id.clone(),
                stage_id: stage_id.clone(),
            })
    }

    /// Allocates a stage. Pending stages count as active until resolved.
    fn allocate(&self, pending: bool) -> Result<(StageId, Slot), FlowError> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.terminating {
            return Err(FlowError::FlowTerminated(self.id.clone()));
        }
        if pending {
            lifecycle.active += 1;
        }
        let mut stages = self.stages.write();
        let slot = Arc::new(watch::channel(None).0);
        stages.push(Arc::clone(&slot));
        Ok((StageId::new((stages.len() - 1).to_string()), slot))
    }

    /// Records a result. Returns false if the stage already had one.
    fn complete(&self, slot: &Slot, result: CompletionResult) -> bool {
        slot.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(result);
            true
        })
    }

    /// Marks one active stage resolved and reports whether the graph should terminate.
    fn release(&self) -> Option<FlowState> {
        let mut lifecycle = self.lifecycle.lock();
        lifecycle.active = lifecycle.active.saturating_sub(1);
        Self::termination_due(&mut lifecycle)
    }

    fn commit(&self, state: FlowState) -> Result<Option<FlowState>, FlowError> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.committed.is_some() {
            return Err(FlowError::invalid_argument(format!(
                "flow {} has already been committed",
                self.id
            )));
        }
        lifecycle.committed = Some(state);
        Ok(Self::termination_due(&mut lifecycle))
    }

    fn termination_due(lifecycle: &mut Lifecycle) -> Option<FlowState> {
        match lifecycle.committed {
            Some(state) if lifecycle.active == 0 && !lifecycle.terminating => {
                lifecycle.terminating = true;
                Some(state)
            }
            _ => None,
        }
    }

    async fn wait(slot: &Slot) -> CompletionResult {
        let mut receiver = slot.subscribe();
        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map(|value| value.clone());
        match outcome {
            Ok(Some(result)) => result,
            _ => CompletionResult::failure(Datum::error(ErrorType::StageLost, "stage result was lost")),
        }
    }
}

/// A [`CompleterClient`] that runs flows in the current process.
pub struct InMemCompleter {
    this: Weak<InMemCompleter>,
    flows: DashMap<FlowId, Arc<Graph>>,
    registry: Arc<ContinuationRegistry>,
    hook_timeout: Duration,
}

impl InMemCompleter {
    /// Creates a completer running bodies from `registry`.
    #[must_use]
    pub fn new(registry: Arc<ContinuationRegistry>) -> Arc<Self> {
        Self::with_hook_timeout(registry, Duration::from_secs(10))
    }

    /// Creates a completer with a custom per-hook timeout.
    #[must_use]
    pub fn with_hook_timeout(registry: Arc<ContinuationRegistry>, hook_timeout: Duration) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            flows: DashMap::new(),
            registry,
            hook_timeout,
        })
    }

    /// Returns the continuation registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ContinuationRegistry> {
        &self.registry
    }

    /// Returns the number of stages created in a flow.
    pub fn stage_count(&self, flow_id: &FlowId) -> Result<usize, FlowError> {
        Ok(self.graph(flow_id)?.stages.read().len())
    }

    /// Returns the number of flows still held by this completer.
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Drops the graph of a terminated flow.
    ///
    /// Fails while the flow is still running or its termination hooks have
    /// not finished.
    pub fn remove_flow(&self, flow_id: &FlowId) -> Result<(), FlowError> {
        let graph = self.graph(flow_id)?;
        if graph.terminated.borrow().is_none() {
            return Err(FlowError::invalid_argument(format!(
                "flow {flow_id} has not terminated"
            )));
        }
        self.flows.remove(flow_id);
        debug!(flow_id = %flow_id, "Flow removed");
        Ok(())
    }

    /// Returns the hook registry of a flow.
    pub fn hooks(&self, flow_id: &FlowId) -> Result<TerminationHookRegistry, FlowError> {
        Ok(self.graph(flow_id)?.hooks.clone())
    }

    /// Waits until the flow is terminal and its termination hooks have run.
    ///
    /// Returns the state the flow was committed with.
    pub async fn await_termination(&self, flow_id: &FlowId) -> Result<FlowState, FlowError> {
        let graph = self.graph(flow_id)?;
        let mut receiver = graph.terminated.subscribe();
        let state = *receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| FlowError::platform(format!("flow {flow_id} was dropped")))?;
        Ok(state.unwrap_or_default())
    }

    fn graph(&self, flow_id: &FlowId) -> Result<Arc<Graph>, FlowError> {
        self.flows
            .get(flow_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.clone()))
    }

    fn invoker(&self) -> Result<ContinuationInvoker, FlowError> {
        let client: Arc<dyn CompleterClient> = self
            .this
            .upgrade()
            .ok_or_else(|| FlowError::platform("in-memory completer has been dropped"))?;
        Ok(ContinuationInvoker::new(Arc::clone(&self.registry), client))
    }

    fn spawn_termination(graph: Arc<Graph>, state: FlowState) {
        tokio::spawn(async move {
            let failures = graph.hooks.terminate(state).await;
            info!(flow_id = %graph.id, state = %state, hook_failures = failures.len(), "Flow terminated");
            graph.terminated.send_replace(Some(state));
        });
    }

    fn finish_stage(graph: &Arc<Graph>, slot: &Slot, stage_id: &StageId, result: CompletionResult) {
        debug!(flow_id = %graph.id, stage_id = %stage_id, successful = result.is_success(), "Stage resolved");
        graph.complete(slot, result);
        if let Some(state) = graph.release() {
            Self::spawn_termination(Arc::clone(graph), state);
        }
    }

    async fn run_stage(
        invoker: ContinuationInvoker,
        graph: Arc<Graph>,
        stage_id: StageId,
        request: AddStageRequest,
        deps: Vec<Slot>,
    ) -> CompletionResult {
        let inputs = match engine::readiness(request.operation) {
            Readiness::Immediate => Vec::new(),
            Readiness::AllInputs => {
                let mut inputs = Vec::with_capacity(deps.len());
                for dep in &deps {
                    inputs.push(Graph::wait(dep).await);
                }
                inputs
            }
            Readiness::FirstInput => {
                let waits = deps.iter().map(|dep| Graph::wait(dep).boxed());
                let (first, _, _) = select_all(waits).await;
                vec![first]
            }
        };

        let (args, forward) = match engine::resolve(request.operation, inputs) {
            Ok(Resolution::Complete(result)) => return result,
            Ok(Resolution::Invoke(args)) => (args, None),
            Ok(Resolution::Observe { args, forward }) => (args, Some(forward)),
            Err(err) => return crate::bridge::to_result(err),
        };

        let Some(closure) = request.closure else {
            return CompletionResult::failure(Datum::error(
                ErrorType::InvalidStageResponse,
                format!("{} stage has no body", request.operation),
            ));
        };

        let response = invoker
            .invoke(InvokeStageRequest {
                flow_id: graph.id.clone(),
                stage_id: stage_id.clone(),
                closure,
                args,
            })
            .await;

        if let Some(forward) = forward {
            if !response.result.is_success() {
                debug!(flow_id = %graph.id, stage_id = %stage_id, "Observer body failed, forwarding parent result");
            }
            return forward;
        }
        if !request.operation.adopts_stage() {
            return response.result;
        }
        match engine::compose(response.result) {
            Composition::Complete(result) => result,
            Composition::Adopt(target) => match graph.slot(&target) {
                Ok(slot) => Graph::wait(&slot).await,
                Err(err) => crate::bridge::to_result(err),
            },
        }
    }
}

impl std::fmt::Debug for InMemCompleter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemCompleter")
            .field("flows", &self.flows.len())
            .finish()
    }
}

#[async_trait]
impl CompleterClient for InMemCompleter {
    async fn create_flow(&self, function_id: &str) -> Result<FlowId, FlowError> {
        let flow_id = FlowId::new(uuid::Uuid::new_v4().to_string());
        self.flows
            .insert(flow_id.clone(), Arc::new(Graph::new(flow_id.clone(), self.hook_timeout)));
        info!(flow_id = %flow_id, function_id, "Created in-memory flow");
        Ok(flow_id)
    }

    async fn add_stage(&self, flow_id: &FlowId, request: AddStageRequest) -> Result<StageId, FlowError> {
        engine::check_inputs(request.operation, request.deps.len())?;
        if request.operation.has_body() && request.closure.is_none() {
            return Err(FlowError::invalid_argument(format!(
                "{} stages need a body",
                request.operation
            )));
        }
        if matches!(
            request.operation,
            CompletionOperation::Delay | CompletionOperation::CompletedValue | CompletionOperation::TerminationHook
        ) {
            return Err(FlowError::invalid_argument(format!(
                "{} stages have their own endpoint",
                request.operation
            )));
        }

        let graph = self.graph(flow_id)?;
        let deps = request
            .deps
            .iter()
            .map(|dep| graph.slot(dep))
            .collect::<Result<Vec<_>, _>>()?;
        let invoker = self.invoker()?;
        let (stage_id, slot) = graph.allocate(true)?;
        debug!(flow_id = %flow_id, stage_id = %stage_id, operation = %request.operation, deps = ?request.deps, "Stage added");

        let task_stage = stage_id.clone();
        tokio::spawn(async move {
            let result = Self::run_stage(invoker, Arc::clone(&graph), task_stage.clone(), request, deps).await;
            Self::finish_stage(&graph, &slot, &task_stage, result);
        });
        Ok(stage_id)
    }

    async fn add_completed_value(
        &self,
        flow_id: &FlowId,
        result: CompletionResult,
    ) -> Result<StageId, FlowError> {
        let graph = self.graph(flow_id)?;
        let (stage_id, slot) = graph.allocate(false)?;
        graph.complete(&slot, result);
        debug!(flow_id = %flow_id, stage_id = %stage_id, "Completed stage added");
        Ok(stage_id)
    }

    async fn add_delay(&self, flow_id: &FlowId, delay: Duration) -> Result<StageId, FlowError> {
        let graph = self.graph(flow_id)?;
        let (stage_id, slot) = graph.allocate(true)?;
        let task_stage = stage_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Self::finish_stage(&graph, &slot, &task_stage, CompletionResult::empty());
        });
        Ok(stage_id)
    }

    async fn await_stage(
        &self,
        flow_id: &FlowId,
        stage_id: &StageId,
        timeout: Option<Duration>,
    ) -> Result<CompletionResult, FlowError> {
        let slot = self.graph(flow_id)?.slot(stage_id)?;
        match timeout {
            None => Ok(Graph::wait(&slot).await),
            Some(timeout) => tokio::time::timeout(timeout, Graph::wait(&slot))
                .await
                .map_err(|_| FlowError::Timeout(stage_id.clone())),
        }
    }

    async fn add_termination_hook(&self, flow_id: &FlowId, closure: Closure) -> Result<(), FlowError> {
        let graph = self.graph(flow_id)?;
        let invoker = self.invoker()?;
        let owner = graph.id.clone();
        let name = closure.entry.clone();
        let index = graph.hooks.register(Some(name.as_str()), move |state| async move {
            let response = invoker
                .invoke(InvokeStageRequest {
                    flow_id: owner,
                    stage_id: StageId::new("termination-hook"),
                    closure,
                    args: vec![CompletionResult::success(Datum::State(state))],
                })
                .await;
            match response.result {
                CompletionResult::Success(_) => Ok(()),
                CompletionResult::Failure(datum) => Err(crate::bridge::bridge(datum).into()),
            }
        });
        debug!(flow_id = %flow_id, entry = %name, index, "Termination hook added");
        Ok(())
    }

    async fn commit(&self, flow_id: &FlowId, state: FlowState) -> Result<(), FlowError> {
        let graph = self.graph(flow_id)?;
        let due = graph.commit(state)?;
        info!(flow_id = %flow_id, state = %state, "Flow committed");
        if let Some(state) = due {
            Self::spawn_termination(graph, state);
        }
        Ok(())
    }
}
