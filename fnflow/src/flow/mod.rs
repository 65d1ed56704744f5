//! Flow and stage handles.
//!
//! A [`Flow`] names one completion graph on a completer service. Stages are
//! created through it and referenced locally by [`FlowFuture`] handles.

mod closure;
mod future;
mod handle;

pub use closure::Closure;
pub use future::{AsStageId, FlowFuture, ResultsFuture, CAPTURED_ENTRY};
pub use handle::Flow;
