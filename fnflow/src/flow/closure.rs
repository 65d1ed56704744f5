//! Serializable stage bodies.

use crate::errors::FlowError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stage body described as data: a named entry point plus captured values.
///
/// The entry name is resolved against a
/// [`ContinuationRegistry`](crate::runtime::ContinuationRegistry) wherever the
/// stage ends up running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    /// Name of the registered handler.
    pub entry: String,
    /// Captured data handed to the handler.
    #[serde(default)]
    pub captured: serde_json::Value,
}

impl Closure {
    /// Creates a closure with nothing captured.
    #[must_use]
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            captured: serde_json::Value::Null,
        }
    }

    /// Creates a closure capturing a serializable value.
    pub fn with_captured<C: Serialize>(entry: impl Into<String>, captured: &C) -> Result<Self, FlowError> {
        let captured = serde_json::to_value(captured)
            .map_err(|e| FlowError::codec(format!("failed to capture closure data: {e}")))?;
        Ok(Self {
            entry: entry.into(),
            captured,
        })
    }

    /// Decodes the captured value.
    pub fn captured<C: DeserializeOwned>(&self) -> Result<C, FlowError> {
        serde_json::from_value(self.captured.clone()).map_err(|e| {
            FlowError::codec(format!(
                "captured data of '{}' does not match the handler: {e}",
                self.entry
            ))
        })
    }
}

impl fmt::Display for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entry)
    }
}
