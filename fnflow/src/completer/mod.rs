//! Completer service contract.
//!
//! The completer owns scheduling and execution of stages. This module defines
//! what the client needs from it ([`CompleterClient`]), the request and
//! response bodies exchanged with it, and an HTTP implementation.

mod client;
pub mod model;
#[cfg(feature = "remote")]
mod remote;

pub use client::CompleterClient;
#[cfg(test)]
pub use client::MockCompleterClient;
pub use model::{AddStageRequest, InvokeStageRequest, InvokeStageResponse};
#[cfg(feature = "remote")]
pub use remote::RemoteCompleterClient;
