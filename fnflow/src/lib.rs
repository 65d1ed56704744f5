//! # fnflow
//!
//! A client for building distributed completion graphs on top of a flow
//! completer service.
//!
//! A function invocation owns one flow. Inside it, code builds stages that
//! the completer schedules and runs later, possibly in other invocations:
//!
//! - **Stage handles**: [`FlowFuture`](crate::flow::FlowFuture) values that
//!   chain with `then_apply`, `then_compose`, `then_combine`, `handle` and
//!   `exceptionally`
//! - **Combinators**: `supply`, `all_of`, `any_of`, `all_results`, `delay`
//! - **Result codec**: typed payloads, blobs, stage references and errors
//! - **Exception bridge**: failed stages surface as typed Rust errors
//! - **Termination hooks**: run once, in order, when the flow ends
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fnflow::prelude::*;
//!
//! let registry = ContinuationRegistry::new();
//! registry.register_supplier("parse", |s: String| async move { Ok(s.parse::<i64>()?) });
//! registry.register_function("add", |n: i64, v: i64| async move { Ok(v + n) });
//!
//! let completer = InMemCompleter::new(Arc::new(registry));
//! let outcome = FlowInvocation::new(completer, FlowConfig::default())
//!     .run(async {
//!         let flow = current_flow()?;
//!         let parsed = flow.supply::<i64>(Closure::with_captured("parse", &"39")?).await?;
//!         let sum = parsed.then_apply::<i64>(Closure::with_captured("add", &3)?).await?;
//!         Ok(sum.get().await?)
//!     })
//!     .await?;
//! assert_eq!(outcome.into_result()?, 42);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bridge;
pub mod completer;
pub mod config;
pub mod context;
pub mod core;
pub mod engine;
pub mod errors;
pub mod flow;
pub mod hooks;
pub mod observability;
pub mod runtime;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::completer::CompleterClient;
    #[cfg(feature = "remote")]
    pub use crate::completer::RemoteCompleterClient;
    pub use crate::config::FlowConfig;
    pub use crate::context::{current_flow, current_runtime};
    pub use crate::core::{
        CompletionResult, Datum, ErrorDatum, ErrorType, FlowId, FlowState, StageId,
    };
    pub use crate::errors::{FlowError, HookFailure, StageFailure};
    pub use crate::flow::{AsStageId, Closure, Flow, FlowFuture, ResultsFuture};
    pub use crate::hooks::TerminationHookRegistry;
    pub use crate::observability::init_tracing;
    pub use crate::runtime::{
        ContinuationInvoker, ContinuationRegistry, FlowInvocation, InvocationOutcome,
    };
    pub use crate::testing::InMemCompleter;
}
