//! Function-side runtime.
//!
//! This module provides:
//! - The continuation registry and invoker that run stage bodies
//! - The invocation harness that owns one flow per invocation

mod continuation;
mod continuation_tests;
mod invocation;

pub use continuation::{ContinuationInvoker, ContinuationKind, ContinuationRegistry};
pub use invocation::{FlowInvocation, InvocationOutcome};
