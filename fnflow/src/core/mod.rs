//! Core data model for fnflow.
//!
//! This module contains the values exchanged with the completer service:
//! - Flow and stage identifiers
//! - Datums and completion results
//! - The byte-level codec
//! - Stage operations and combinator kinds

pub mod codec;
mod datum;
mod ids;
mod operation;
mod result;

pub use codec::{CONTENT_TYPE_JSON, CONTENT_TYPE_OCTET_STREAM};
pub use datum::{BlobDatum, Datum, ErrorDatum, ErrorType, FlowState, StageRefDatum};
pub use ids::{FlowId, StageId};
pub use operation::{CombinatorKind, CompletionOperation};
pub use result::CompletionResult;
