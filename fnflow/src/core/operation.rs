//! Stage operations and the combinator kinds they belong to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad class of a stage in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinatorKind {
    /// A stage with no dependencies.
    Source,
    /// A stage derived from exactly one parent.
    Transform,
    /// A stage waiting on several inputs.
    Barrier,
}

impl fmt::Display for CombinatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Transform => write!(f, "transform"),
            Self::Barrier => write!(f, "barrier"),
        }
    }
}

/// The operation a stage was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletionOperation {
    /// Run a body with no inputs.
    Supply,
    /// Run a body on the parent's value.
    ThenApply,
    /// Run a body on the parent's value and adopt the stage it returns.
    ThenCompose,
    /// Run a body on the parent's failure.
    Exceptionally,
    /// Run a body on the parent's failure and adopt the stage it returns.
    ExceptionallyCompose,
    /// Run a body on the parent's outcome, success or failure.
    Handle,
    /// Run a body on the parent's outcome, then forward that outcome.
    WhenComplete,
    /// Run a body on the values of two parents.
    ThenCombine,
    /// Run a body on the value of whichever of two parents completes first.
    ApplyToEither,
    /// Wait for every input.
    AllOf,
    /// Wait for the first input.
    AnyOf,
    /// Resolve after a delay.
    Delay,
    /// Resolve immediately with a known result.
    CompletedValue,
    /// A termination hook registration.
    TerminationHook,
}

impl CompletionOperation {
    /// Returns the combinator kind of this operation.
    #[must_use]
    pub fn kind(self) -> CombinatorKind {
        match self {
            Self::Supply | Self::Delay | Self::CompletedValue | Self::TerminationHook => {
                CombinatorKind::Source
            }
            Self::ThenApply
            | Self::ThenCompose
            | Self::Exceptionally
            | Self::ExceptionallyCompose
            | Self::Handle
            | Self::WhenComplete => CombinatorKind::Transform,
            Self::AllOf | Self::AnyOf | Self::ThenCombine | Self::ApplyToEither => {
                CombinatorKind::Barrier
            }
        }
    }

    /// Returns true when stages of this operation execute a body.
    #[must_use]
    pub fn has_body(self) -> bool {
        !matches!(
            self,
            Self::AllOf | Self::AnyOf | Self::Delay | Self::CompletedValue
        )
    }

    /// Returns true when the body's result is a stage to adopt.
    #[must_use]
    pub fn adopts_stage(self) -> bool {
        matches!(self, Self::ThenCompose | Self::ExceptionallyCompose)
    }
}

impl fmt::Display for CompletionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Supply => "supply",
            Self::ThenApply => "thenApply",
            Self::ThenCompose => "thenCompose",
            Self::Exceptionally => "exceptionally",
            Self::ExceptionallyCompose => "exceptionallyCompose",
            Self::Handle => "handle",
            Self::WhenComplete => "whenComplete",
            Self::ThenCombine => "thenCombine",
            Self::ApplyToEither => "applyToEither",
            Self::AllOf => "allOf",
            Self::AnyOf => "anyOf",
            Self::Delay => "delay",
            Self::CompletedValue => "completedValue",
            Self::TerminationHook => "terminationHook",
        };
        f.write_str(name)
    }
}
