//! Tagged values exchanged with the completer service.

use super::codec::{base64_bytes, CONTENT_TYPE_JSON};
use super::StageId;
use crate::errors::FlowError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of an error record.
///
/// Unrecognised tags decode as [`ErrorType::UnknownError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// A stage did not complete in time.
    StageTimeout,
    /// The platform failed to run a stage.
    StageFailed,
    /// A function invocation timed out.
    FunctionTimeout,
    /// A function invocation failed.
    FunctionInvokeFailed,
    /// The completer lost track of a stage.
    StageLost,
    /// A stage produced a response the completer could not use.
    InvalidStageResponse,
    /// A stage body returned an error.
    UserError,
    /// An error of unknown origin.
    #[serde(other)]
    UnknownError,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownError => write!(f, "unknown_error"),
            Self::StageTimeout => write!(f, "stage_timeout"),
            Self::StageFailed => write!(f, "stage_failed"),
            Self::FunctionTimeout => write!(f, "function_timeout"),
            Self::FunctionInvokeFailed => write!(f, "function_invoke_failed"),
            Self::StageLost => write!(f, "stage_lost"),
            Self::InvalidStageResponse => write!(f, "invalid_stage_response"),
            Self::UserError => write!(f, "user_error"),
        }
    }
}

/// Terminal state of a whole flow, as seen by termination hooks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// State not reported.
    #[default]
    Unknown,
    /// The flow finished and its invocation succeeded.
    Succeeded,
    /// The flow finished after its invocation failed.
    Failed,
    /// The flow was cancelled.
    Cancelled,
    /// The flow was killed by the platform.
    Killed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Killed => write!(f, "killed"),
        }
    }
}

/// An opaque payload with an explicit content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDatum {
    /// MIME type of `data`.
    pub content_type: String,
    /// Raw payload bytes; base64 on the JSON wire.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// A structured error record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDatum {
    /// Error category.
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    /// Human readable message.
    pub message: String,
    /// Optional diagnostic trace captured where the error was raised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl fmt::Display for ErrorDatum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

/// A reference to the result of another stage in the same flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRefDatum {
    /// The referenced stage.
    pub stage_id: StageId,
}

/// A tagged value crossing the local/remote boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datum {
    /// No value. Decodes as JSON `null`.
    Empty,
    /// An opaque value.
    Blob(BlobDatum),
    /// An error record.
    Error(ErrorDatum),
    /// A deferred reference to another stage's result.
    StageRef(StageRefDatum),
    /// A flow state, delivered to termination hooks.
    State(FlowState),
}

impl Datum {
    /// Encodes a serializable value as a JSON blob.
    ///
    /// Values that serialize to `null` become [`Datum::Empty`].
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, FlowError> {
        let json = serde_json::to_value(value)
            .map_err(|e| FlowError::codec(format!("failed to encode value: {e}")))?;
        if json.is_null() {
            return Ok(Self::Empty);
        }
        let data = serde_json::to_vec(&json)
            .map_err(|e| FlowError::codec(format!("failed to encode value: {e}")))?;
        Ok(Self::Blob(BlobDatum {
            content_type: CONTENT_TYPE_JSON.to_string(),
            data,
        }))
    }

    /// Creates a blob datum from raw bytes.
    #[must_use]
    pub fn bytes(content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::Blob(BlobDatum {
            content_type: content_type.into(),
            data: data.into(),
        })
    }

    /// Creates an error datum.
    #[must_use]
    pub fn error(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self::Error(ErrorDatum {
            error_type,
            message: message.into(),
            trace: None,
        })
    }

    /// Creates an error datum carrying a diagnostic trace.
    #[must_use]
    pub fn error_with_trace(
        error_type: ErrorType,
        message: impl Into<String>,
        trace: impl Into<String>,
    ) -> Self {
        Self::Error(ErrorDatum {
            error_type,
            message: message.into(),
            trace: Some(trace.into()),
        })
    }

    /// Creates a stage reference datum.
    #[must_use]
    pub fn stage_ref(stage_id: StageId) -> Self {
        Self::StageRef(StageRefDatum { stage_id })
    }

    /// Returns the datum's wire tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Blob(_) => "blob",
            Self::Error(_) => "error",
            Self::StageRef(_) => "stage_ref",
            Self::State(_) => "state",
        }
    }

    /// Returns the error record, if this is an error datum.
    #[must_use]
    pub fn as_error(&self) -> Option<&ErrorDatum> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Decodes the datum as a typed value.
    ///
    /// Only JSON blobs and `Empty` carry values; every other datum is a codec error.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, FlowError> {
        match self {
            Self::Empty => serde_json::from_value(serde_json::Value::Null)
                .map_err(|e| FlowError::codec(format!("empty datum does not decode as requested type: {e}"))),
            Self::Blob(blob) if blob.content_type == CONTENT_TYPE_JSON => {
                serde_json::from_slice(&blob.data)
                    .map_err(|e| FlowError::codec(format!("failed to decode JSON blob: {e}")))
            }
            Self::Blob(blob) => Err(FlowError::codec(format!(
                "cannot decode blob with content type '{}' as a value",
                blob.content_type
            ))),
            other => Err(FlowError::codec(format!(
                "cannot decode {} datum as a value",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_value_round_trip() {
        let datum = Datum::json(&42).unwrap();
        assert_eq!(datum.kind(), "blob");
        assert_eq!(datum.decode::<i32>().unwrap(), 42);
    }

    #[test]
    fn test_null_becomes_empty() {
        assert_eq!(Datum::json(&()).unwrap(), Datum::Empty);
        assert_eq!(Datum::json(&None::<i32>).unwrap(), Datum::Empty);
        assert_eq!(Datum::Empty.decode::<Option<String>>().unwrap(), None);
        Datum::Empty.decode::<()>().unwrap();
    }

    #[test]
    fn test_empty_does_not_decode_as_number() {
        assert!(Datum::Empty.decode::<i32>().is_err());
    }

    #[test]
    fn test_non_json_blob_is_not_a_value() {
        let datum = Datum::bytes("application/octet-stream", vec![1, 2, 3]);
        let err = datum.decode::<Vec<u8>>().unwrap_err();
        assert!(err.to_string().contains("application/octet-stream"));
    }

    #[test]
    fn test_error_datum_is_not_a_value() {
        let datum = Datum::error(ErrorType::StageLost, "gone");
        assert!(datum.decode::<String>().is_err());
        assert_eq!(datum.as_error().unwrap().message, "gone");
    }

    #[test]
    fn test_error_type_unknown_tag_falls_back() {
        let parsed: ErrorType = serde_json::from_str(r#""something_new""#).unwrap();
        assert_eq!(parsed, ErrorType::UnknownError);
        assert_eq!(ErrorType::UserError.to_string(), "user_error");
    }

    #[test]
    fn test_flow_state_serialize() {
        let json = serde_json::to_string(&FlowState::Succeeded).unwrap();
        assert_eq!(json, r#""succeeded""#);
    }
}
