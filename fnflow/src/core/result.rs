//! Terminal outcome of a stage.

use super::Datum;
use serde::{Deserialize, Serialize};

/// Exactly one of `success(datum)` or `failure(datum)`.
///
/// On the wire this is `{"successful": bool, "datum": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireResult", into = "WireResult")]
pub enum CompletionResult {
    /// The stage completed normally.
    Success(Datum),
    /// The stage failed.
    Failure(Datum),
}

#[derive(Serialize, Deserialize)]
struct WireResult {
    successful: bool,
    datum: Datum,
}

impl From<WireResult> for CompletionResult {
    fn from(wire: WireResult) -> Self {
        if wire.successful {
            Self::Success(wire.datum)
        } else {
            Self::Failure(wire.datum)
        }
    }
}

impl From<CompletionResult> for WireResult {
    fn from(result: CompletionResult) -> Self {
        match result {
            CompletionResult::Success(datum) => Self {
                successful: true,
                datum,
            },
            CompletionResult::Failure(datum) => Self {
                successful: false,
                datum,
            },
        }
    }
}

impl CompletionResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(datum: Datum) -> Self {
        Self::Success(datum)
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(datum: Datum) -> Self {
        Self::Failure(datum)
    }

    /// A successful result with no value.
    #[must_use]
    pub fn empty() -> Self {
        Self::Success(Datum::Empty)
    }

    /// Returns true for `success(_)`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for `failure(_)`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the wrapped datum regardless of outcome.
    #[must_use]
    pub fn datum(&self) -> &Datum {
        match self {
            Self::Success(datum) | Self::Failure(datum) => datum,
        }
    }

    /// Consumes the result, returning the wrapped datum.
    #[must_use]
    pub fn into_datum(self) -> Datum {
        match self {
            Self::Success(datum) | Self::Failure(datum) => datum,
        }
    }
}
