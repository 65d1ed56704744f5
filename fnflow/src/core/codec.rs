//! Byte-level encoding of datums and results.
//!
//! Datums travel as JSON. Blob payloads are base64 encoded inside the JSON
//! document so that arbitrary bytes survive the trip unchanged.

use super::{CompletionResult, Datum};
use crate::errors::FlowError;

/// Content type of JSON-encoded values.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content type of uninterpreted bytes.
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Encodes a datum to its wire form.
pub fn encode(datum: &Datum) -> Result<Vec<u8>, FlowError> {
    serde_json::to_vec(datum).map_err(|e| FlowError::codec(format!("failed to encode datum: {e}")))
}

/// Decodes a datum from its wire form.
pub fn decode(bytes: &[u8]) -> Result<Datum, FlowError> {
    serde_json::from_slice(bytes).map_err(|e| FlowError::codec(format!("failed to decode datum: {e}")))
}

/// Encodes a completion result to its wire form.
pub fn encode_result(result: &CompletionResult) -> Result<Vec<u8>, FlowError> {
    serde_json::to_vec(result)
        .map_err(|e| FlowError::codec(format!("failed to encode completion result: {e}")))
}

/// Decodes a completion result from its wire form.
pub fn decode_result(bytes: &[u8]) -> Result<CompletionResult, FlowError> {
    serde_json::from_slice(bytes)
        .map_err(|e| FlowError::codec(format!("failed to decode completion result: {e}")))
}

/// Serde adapter storing bytes as a standard base64 string.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
