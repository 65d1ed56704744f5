//! Registered stage bodies and their execution.
//!
//! Stage bodies are shipped as [`Closure`]s: an entry name plus captured data.
//! The [`ContinuationRegistry`] maps entry names to typed async handlers and
//! the [`ContinuationInvoker`] runs them for incoming stage invocations.

use crate::bridge;
use crate::completer::{CompleterClient, InvokeStageRequest, InvokeStageResponse};
use crate::context;
use crate::core::{CompletionResult, Datum, ErrorType, FlowState};
use crate::errors::FlowError;
use crate::flow::{Closure, Flow, FlowFuture, CAPTURED_ENTRY};
use crate::observability;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

type HandlerFuture = BoxFuture<'static, anyhow::Result<Datum>>;
type Handler = Arc<dyn Fn(Closure, Vec<CompletionResult>) -> HandlerFuture + Send + Sync>;

/// The shape of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationKind {
    /// No inputs.
    Supplier,
    /// One successful input.
    Function,
    /// One successful input, returns a stage to adopt.
    Composer,
    /// One failed input.
    Recovery,
    /// One failed input, returns a stage to adopt.
    RecoveryComposer,
    /// Two successful inputs.
    Combiner,
    /// One input of either outcome.
    Handler,
    /// The flow's terminal state.
    Hook,
}

impl ContinuationKind {
    /// Number of arguments a handler of this kind receives.
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Self::Supplier => 0,
            Self::Function
            | Self::Composer
            | Self::Recovery
            | Self::RecoveryComposer
            | Self::Hook => 1,
            Self::Combiner | Self::Handler => 2,
        }
    }
}

impl fmt::Display for ContinuationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supplier => write!(f, "supplier"),
            Self::Function => write!(f, "function"),
            Self::Composer => write!(f, "composer"),
            Self::Recovery => write!(f, "recovery"),
            Self::RecoveryComposer => write!(f, "recovery composer"),
            Self::Combiner => write!(f, "combiner"),
            Self::Handler => write!(f, "handler"),
            Self::Hook => write!(f, "hook"),
        }
    }
}

#[derive(Clone)]
struct Continuation {
    kind: ContinuationKind,
    handler: Handler,
}

/// Registry of named stage bodies.
///
/// Every process that may run stages of a flow must register the same entry
/// names. Handlers receive the closure's captured data decoded as `C`.
pub struct ContinuationRegistry {
    entries: RwLock<HashMap<String, Continuation>>,
}

impl Default for ContinuationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContinuationRegistry {
    /// Creates a registry holding only the built-in entries.
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            entries: RwLock::new(HashMap::new()),
        };
        registry.register_function(
            CAPTURED_ENTRY,
            |captured: serde_json::Value, _parent: serde_json::Value| async move { Ok(captured) },
        );
        registry
    }

    fn insert(&self, name: impl Into<String>, kind: ContinuationKind, handler: Handler) {
        let name = name.into();
        if self
            .entries
            .write()
            .insert(name.clone(), Continuation { kind, handler })
            .is_some()
        {
            debug!(entry = %name, "Replaced continuation");
        }
    }

    /// Registers a body that takes no input.
    pub fn register_supplier<C, R, F, Fut>(&self, name: impl Into<String>, body: F)
    where
        C: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let body = Arc::new(body);
        self.insert(
            name,
            ContinuationKind::Supplier,
            Arc::new(move |closure: Closure, _args: Vec<CompletionResult>| -> HandlerFuture {
                let body = Arc::clone(&body);
                Box::pin(async move {
                    let captured = closure.captured::<C>()?;
                    let value = body(captured).await?;
                    Ok(Datum::json(&value)?)
                })
            }),
        );
    }

    /// Registers a body that transforms its parent's value.
    pub fn register_function<C, A, R, F, Fut>(&self, name: impl Into<String>, body: F)
    where
        C: DeserializeOwned + Send + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(C, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let body = Arc::new(body);
        self.insert(
            name,
            ContinuationKind::Function,
            Arc::new(move |closure: Closure, args: Vec<CompletionResult>| -> HandlerFuture {
                let body = Arc::clone(&body);
                Box::pin(async move {
                    let captured = closure.captured::<C>()?;
                    let arg = success_arg::<A>(args)?;
                    let value = body(captured, arg).await?;
                    Ok(Datum::json(&value)?)
                })
            }),
        );
    }

    /// Registers a body that returns another stage to adopt.
    pub fn register_composer<C, A, R, F, Fut>(&self, name: impl Into<String>, body: F)
    where
        C: DeserializeOwned + Send + 'static,
        A: DeserializeOwned + Send + 'static,
        R: 'static,
        F: Fn(C, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<FlowFuture<R>>> + Send + 'static,
    {
        let body = Arc::new(body);
        self.insert(
            name,
            ContinuationKind::Composer,
            Arc::new(move |closure: Closure, args: Vec<CompletionResult>| -> HandlerFuture {
                let body = Arc::clone(&body);
                Box::pin(async move {
                    let captured = closure.captured::<C>()?;
                    let arg = success_arg::<A>(args)?;
                    let target = body(captured, arg).await?;
                    Ok(stage_reference(&target)?)
                })
            }),
        );
    }

    /// Registers a body that recovers from its parent's failure.
    ///
    /// The body receives the failure as a [`FlowError::StageFailure`].
    pub fn register_recovery<C, R, F, Fut>(&self, name: impl Into<String>, body: F)
    where
        C: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(C, FlowError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let body = Arc::new(body);
        self.insert(
            name,
            ContinuationKind::Recovery,
            Arc::new(move |closure: Closure, args: Vec<CompletionResult>| -> HandlerFuture {
                let body = Arc::clone(&body);
                Box::pin(async move {
                    let captured = closure.captured::<C>()?;
                    let error = failure_arg(args)?;
                    let value = body(captured, error).await?;
                    Ok(Datum::json(&value)?)
                })
            }),
        );
    }

    /// Registers a body that recovers from its parent's failure by returning
    /// another stage to adopt.
    pub fn register_recovery_composer<C, R, F, Fut>(&self, name: impl Into<String>, body: F)
    where
        C: DeserializeOwned + Send + 'static,
        R: 'static,
        F: Fn(C, FlowError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<FlowFuture<R>>> + Send + 'static,
    {
        let body = Arc::new(body);
        self.insert(
            name,
            ContinuationKind::RecoveryComposer,
            Arc::new(move |closure: Closure, args: Vec<CompletionResult>| -> HandlerFuture {
                let body = Arc::clone(&body);
                Box::pin(async move {
                    let captured = closure.captured::<C>()?;
                    let error = failure_arg(args)?;
                    let target = body(captured, error).await?;
                    Ok(stage_reference(&target)?)
                })
            }),
        );
    }

    /// Registers a body that combines the values of two parents.
    pub fn register_combiner<C, A, B, R, F, Fut>(&self, name: impl Into<String>, body: F)
    where
        C: DeserializeOwned + Send + 'static,
        A: DeserializeOwned + Send + 'static,
        B: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(C, A, B) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let body = Arc::new(body);
        self.insert(
            name,
            ContinuationKind::Combiner,
            Arc::new(move |closure: Closure, args: Vec<CompletionResult>| -> HandlerFuture {
                let body = Arc::clone(&body);
                Box::pin(async move {
                    let captured = closure.captured::<C>()?;
                    let mut args = args.into_iter();
                    let first = success_value::<A>(args.next())?;
                    let second = success_value::<B>(args.next())?;
                    let value = body(captured, first, second).await?;
                    Ok(Datum::json(&value)?)
                })
            }),
        );
    }

    /// Registers a body that runs on its parent's outcome, success or failure.
    ///
    /// Serves both `handle` stages, whose result is the body's value, and
    /// `when_complete` stages, which discard it.
    pub fn register_handler<C, A, R, F, Fut>(&self, name: impl Into<String>, body: F)
    where
        C: DeserializeOwned + Send + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(C, Result<A, FlowError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let body = Arc::new(body);
        self.insert(
            name,
            ContinuationKind::Handler,
            Arc::new(move |closure: Closure, args: Vec<CompletionResult>| -> HandlerFuture {
                let body = Arc::clone(&body);
                Box::pin(async move {
                    let captured = closure.captured::<C>()?;
                    let outcome = outcome_arg::<A>(args)?;
                    let value = body(captured, outcome).await?;
                    Ok(Datum::json(&value)?)
                })
            }),
        );
    }

    /// Registers a termination hook body.
    pub fn register_hook<C, F, Fut>(&self, name: impl Into<String>, body: F)
    where
        C: DeserializeOwned + Send + 'static,
        F: Fn(C, FlowState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body = Arc::new(body);
        self.insert(
            name,
            ContinuationKind::Hook,
            Arc::new(move |closure: Closure, args: Vec<CompletionResult>| -> HandlerFuture {
                let body = Arc::clone(&body);
                Box::pin(async move {
                    let captured = closure.captured::<C>()?;
                    let state = match args.into_iter().next() {
                        Some(CompletionResult::Success(Datum::State(state))) => state,
                        _ => {
                            return Err(FlowError::invalid_argument(
                                "hook bodies take the flow state as their only input",
                            )
                            .into())
                        }
                    };
                    body(captured, state).await?;
                    Ok(Datum::Empty)
                })
            }),
        );
    }

    /// Returns the kind of a registered entry.
    #[must_use]
    pub fn kind(&self, name: &str) -> Option<ContinuationKind> {
        self.entries.read().get(name).map(|c| c.kind)
    }

    /// Returns true if the entry is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Returns the registered entry names, sorted.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn get(&self, name: &str) -> Option<Continuation> {
        self.entries.read().get(name).cloned()
    }
}

impl fmt::Debug for ContinuationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationRegistry")
            .field("entries", &self.entries())
            .finish()
    }
}

fn failure_arg(args: Vec<CompletionResult>) -> Result<FlowError, FlowError> {
    match args.into_iter().next() {
        Some(CompletionResult::Failure(datum)) => Ok(bridge::bridge(datum)),
        _ => Err(FlowError::invalid_argument(
            "recovery bodies take exactly one failed input",
        )),
    }
}

/// Decodes `[value, empty]` or `[empty, failure]` into the parent's outcome.
fn outcome_arg<A: DeserializeOwned>(args: Vec<CompletionResult>) -> Result<Result<A, FlowError>, FlowError> {
    match <[CompletionResult; 2]>::try_from(args) {
        Ok([_, CompletionResult::Failure(datum)]) => Ok(Err(bridge::bridge(datum))),
        Ok([CompletionResult::Success(datum), _]) => Ok(Ok(datum.decode()?)),
        _ => Err(FlowError::invalid_argument(
            "handler bodies take a value slot and an error slot",
        )),
    }
}

/// Turns a handle returned by a compose body into a reference the completer
/// can adopt. Only stages of the running flow can be adopted.
fn stage_reference<R>(target: &FlowFuture<R>) -> Result<Datum, FlowError> {
    let current = context::current_flow()?;
    if target.flow_id() != current.id() {
        return Err(FlowError::invalid_argument(format!(
            "stage {} belongs to flow {}, not {}",
            target.id(),
            target.flow_id(),
            current.id()
        )));
    }
    Ok(Datum::stage_ref(target.id().clone()))
}

fn success_arg<A: DeserializeOwned>(args: Vec<CompletionResult>) -> Result<A, FlowError> {
    success_value(args.into_iter().next())
}

fn success_value<A: DeserializeOwned>(arg: Option<CompletionResult>) -> Result<A, FlowError> {
    match arg {
        Some(CompletionResult::Success(datum)) => datum.decode(),
        Some(CompletionResult::Failure(datum)) => Err(bridge::bridge(datum)),
        None => Err(FlowError::invalid_argument("missing stage input")),
    }
}

/// Runs registered stage bodies for incoming invocations.
#[derive(Clone)]
pub struct ContinuationInvoker {
    registry: Arc<ContinuationRegistry>,
    client: Arc<dyn CompleterClient>,
}

impl ContinuationInvoker {
    /// Creates an invoker whose bodies build stages through `client`.
    #[must_use]
    pub fn new(registry: Arc<ContinuationRegistry>, client: Arc<dyn CompleterClient>) -> Self {
        Self { registry, client }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ContinuationRegistry> {
        &self.registry
    }

    /// Runs one stage body.
    ///
    /// Never fails: unknown entries, argument mismatches, errors and panics
    /// all become failure results.
    pub async fn invoke(&self, request: InvokeStageRequest) -> InvokeStageResponse {
        let InvokeStageRequest {
            flow_id,
            stage_id,
            closure,
            args,
        } = request;

        let Some(continuation) = self.registry.get(&closure.entry) else {
            warn!(flow_id = %flow_id, stage_id = %stage_id, entry = %closure.entry, "No continuation registered");
            return Self::failed(ErrorType::FunctionInvokeFailed, format!(
                "no continuation registered for entry '{}'",
                closure.entry
            ));
        };

        let arity = continuation.kind.arity();
        if args.len() != arity {
            warn!(flow_id = %flow_id, stage_id = %stage_id, entry = %closure.entry, "Argument count mismatch");
            return Self::failed(ErrorType::InvalidStageResponse, format!(
                "{} '{}' takes {} argument(s) but the stage supplied {}",
                continuation.kind,
                closure.entry,
                arity,
                args.len()
            ));
        }

        debug!(flow_id = %flow_id, stage_id = %stage_id, entry = %closure.entry, "Invoking continuation");
        let flow = Flow::new(flow_id.clone(), Arc::clone(&self.client));
        let body = (continuation.handler)(closure, args);
        let outcome = AssertUnwindSafe(context::scope(flow, body))
            .catch_unwind()
            .instrument(observability::stage_span(&flow_id, &stage_id))
            .await;

        let result = match outcome {
            Ok(Ok(datum)) => CompletionResult::success(datum),
            Ok(Err(err)) => {
                debug!(flow_id = %flow_id, stage_id = %stage_id, "Continuation failed: {:#}", err);
                bridge::to_result(err)
            }
            Err(panic) => {
                warn!(flow_id = %flow_id, stage_id = %stage_id, "Continuation panicked");
                bridge::panic_to_result(&*panic)
            }
        };
        InvokeStageResponse { result }
    }

    /// Runs one stage body from a JSON-encoded [`InvokeStageRequest`] and
    /// returns the JSON-encoded [`InvokeStageResponse`].
    pub async fn invoke_json(&self, body: &[u8]) -> Result<Vec<u8>, FlowError> {
        let request: InvokeStageRequest = serde_json::from_slice(body)
            .map_err(|e| FlowError::codec(format!("invalid stage invocation: {e}")))?;
        let response = self.invoke(request).await;
        serde_json::to_vec(&response)
            .map_err(|e| FlowError::codec(format!("failed to encode stage response: {e}")))
    }

    fn failed(error_type: ErrorType, message: String) -> InvokeStageResponse {
        InvokeStageResponse {
            result: CompletionResult::failure(Datum::error(error_type, message)),
        }
    }
}

impl fmt::Debug for ContinuationInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationInvoker")
            .field("registry", &self.registry)
            .finish()
    }
}
