//! Error types for fnflow.
//!
//! Failures of stages travel through the graph as data (a failure [`Datum`]).
//! They only become a [`FlowError`] at retrieval points, wrapped in a
//! [`StageFailure`] that keeps the original datum untouched.

use crate::core::{Datum, ErrorDatum, ErrorType, FlowId, StageId};
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;

/// The main error type for fnflow operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Flow operations were used outside an active invocation.
    #[error("No active flow: flow operations are only available while a flow invocation is running")]
    NoActiveFlow,

    /// A stage resolved to a failure.
    #[error(transparent)]
    StageFailure(#[from] StageFailure),

    /// An argument was rejected before reaching the completer.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A value or datum could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// The completer does not know the flow.
    #[error("Unknown flow: {0}")]
    UnknownFlow(FlowId),

    /// The completer does not know the stage.
    #[error("Unknown stage {stage_id} in flow {flow_id}")]
    UnknownStage {
        /// The flow that was searched.
        flow_id: FlowId,
        /// The missing stage.
        stage_id: StageId,
    },

    /// The flow has already terminated and accepts no new stages.
    #[error("Flow {0} has already terminated")]
    FlowTerminated(FlowId),

    /// A stage did not become terminal within the requested time.
    #[error("Timed out waiting for stage {0}")]
    Timeout(StageId),

    /// The completer service rejected a request or could not be reached.
    #[error("Completer error: {0}")]
    Completer(String),

    /// An unexpected platform condition.
    #[error("Platform error: {0}")]
    Platform(String),
}

impl FlowError {
    /// Creates a codec error.
    #[must_use]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates a completer error.
    #[must_use]
    pub fn completer(message: impl Into<String>) -> Self {
        Self::Completer(message.into())
    }

    /// Creates a platform error.
    #[must_use]
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform(message.into())
    }

    /// Returns the stage failure, if this error is one.
    #[must_use]
    pub fn as_stage_failure(&self) -> Option<&StageFailure> {
        match self {
            Self::StageFailure(failure) => Some(failure),
            _ => None,
        }
    }

    /// The error category used when this error is recorded as a stage result.
    #[must_use]
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::StageFailure(failure) => failure
                .error()
                .map_or(ErrorType::UserError, |err| err.error_type),
            Self::Timeout(_) => ErrorType::StageTimeout,
            Self::Codec(_) => ErrorType::InvalidStageResponse,
            Self::UnknownStage { .. } => ErrorType::StageLost,
            Self::InvalidArgument(_) => ErrorType::UserError,
            Self::NoActiveFlow
            | Self::UnknownFlow(_)
            | Self::FlowTerminated(_)
            | Self::Completer(_)
            | Self::Platform(_) => ErrorType::UnknownError,
        }
    }
}

/// A failed stage outcome surfaced as an error.
///
/// Holds the failure datum exactly as the completer reported it, so that
/// re-raising it from a stage body records the same datum again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    datum: Datum,
}

impl StageFailure {
    /// Wraps a failure datum.
    #[must_use]
    pub fn new(datum: Datum) -> Self {
        Self { datum }
    }

    /// Returns the original failure datum.
    #[must_use]
    pub fn datum(&self) -> &Datum {
        &self.datum
    }

    /// Consumes the failure, returning the original datum.
    #[must_use]
    pub fn into_datum(self) -> Datum {
        self.datum
    }

    /// Returns the error record, if the failure carries one.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorDatum> {
        self.datum.as_error()
    }

    /// Returns the error category, if the failure carries an error record.
    #[must_use]
    pub fn error_type(&self) -> Option<ErrorType> {
        self.error().map(|err| err.error_type)
    }

    /// Returns the error message, if the failure carries an error record.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.error().map(|err| err.message.as_str())
    }

    /// Decodes a value-carrying failure (for example from `failed_future`).
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E, FlowError> {
        self.datum.decode()
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.datum {
            Datum::Error(err) => write!(f, "Stage failed: {err}"),
            Datum::Blob(blob) => write!(f, "Stage failed with a {} payload", blob.content_type),
            other => write!(f, "Stage failed with a {} datum", other.kind()),
        }
    }
}

impl std::error::Error for StageFailure {}

/// A termination hook that returned an error, panicked or timed out.
///
/// Hook failures are isolated: they are logged and never change the flow's
/// own outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Termination hook #{index} failed: {message}")]
pub struct HookFailure {
    /// Registration position of the hook.
    pub index: usize,
    /// What went wrong.
    pub message: String,
}

impl HookFailure {
    /// Creates a new hook failure.
    #[must_use]
    pub fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            message: message.into(),
        }
    }
}
