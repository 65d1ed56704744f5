//! Resolution policy of the combinators.
//!
//! Given a stage's operation and the results of its inputs, decides whether
//! the stage resolves directly or runs its body, and with which arguments.
//! The policy is independent of any completer, so every completer applies
//! the same rules:
//!
//! - transforms skip their body on a failed parent and forward the failure
//! - `exceptionally` forwards a successful parent and runs on failure
//! - `handle` and `whenComplete` run on either outcome; `whenComplete` then
//!   forwards the parent's result whatever its body did
//! - `thenCombine` runs once both parents succeed; the first failed parent
//!   in dependency order wins otherwise
//! - `allOf` always resolves to `success(empty)`, whatever its inputs did
//! - `anyOf` takes the first terminal input as is

use crate::core::{CombinatorKind, CompletionOperation, CompletionResult, Datum, ErrorType, StageId};
use crate::errors::FlowError;

/// How many inputs a stage must wait for before it can be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Ready immediately.
    Immediate,
    /// Ready once every input is terminal.
    AllInputs,
    /// Ready once any input is terminal.
    FirstInput,
}

/// What to do with a stage whose inputs are ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The stage resolves to this result without running a body.
    Complete(CompletionResult),
    /// Run the stage body with these arguments.
    Invoke(Vec<CompletionResult>),
    /// Run the stage body for its effects, then resolve to `forward`.
    Observe {
        /// Arguments for the body.
        args: Vec<CompletionResult>,
        /// The stage's result once the body has finished.
        forward: CompletionResult,
    },
}

/// What to do with the result of a `thenCompose` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Composition {
    /// Adopt the outcome of this stage.
    Adopt(StageId),
    /// Resolve to this result.
    Complete(CompletionResult),
}

/// Returns when a stage of `operation` becomes ready.
#[must_use]
pub fn readiness(operation: CompletionOperation) -> Readiness {
    match operation {
        CompletionOperation::AnyOf | CompletionOperation::ApplyToEither => Readiness::FirstInput,
        CompletionOperation::Supply
        | CompletionOperation::Delay
        | CompletionOperation::CompletedValue
        | CompletionOperation::TerminationHook => Readiness::Immediate,
        CompletionOperation::ThenApply
        | CompletionOperation::ThenCompose
        | CompletionOperation::Exceptionally
        | CompletionOperation::ExceptionallyCompose
        | CompletionOperation::Handle
        | CompletionOperation::WhenComplete
        | CompletionOperation::ThenCombine
        | CompletionOperation::AllOf => Readiness::AllInputs,
    }
}

/// Checks the number of inputs given to a new stage.
pub fn check_inputs(operation: CompletionOperation, count: usize) -> Result<(), FlowError> {
    if matches!(
        operation,
        CompletionOperation::ThenCombine | CompletionOperation::ApplyToEither
    ) {
        return if count == 2 {
            Ok(())
        } else {
            Err(FlowError::invalid_argument(format!(
                "{operation} takes exactly two inputs, got {count}"
            )))
        };
    }
    match operation.kind() {
        CombinatorKind::Barrier if count == 0 => Err(FlowError::invalid_argument(
            "at least one future must be specified",
        )),
        CombinatorKind::Transform if count != 1 => Err(FlowError::invalid_argument(format!(
            "{operation} takes exactly one input, got {count}"
        ))),
        CombinatorKind::Source if count != 0 => Err(FlowError::invalid_argument(format!(
            "{operation} takes no inputs, got {count}"
        ))),
        _ => Ok(()),
    }
}

/// Decides how a ready stage resolves.
///
/// `inputs` holds the terminal results of the stage's dependencies in
/// dependency order; for `anyOf` and `applyToEither` it holds only the first
/// one to complete.
pub fn resolve(
    operation: CompletionOperation,
    mut inputs: Vec<CompletionResult>,
) -> Result<Resolution, FlowError> {
    match operation {
        CompletionOperation::Supply => Ok(Resolution::Invoke(Vec::new())),
        CompletionOperation::ThenApply | CompletionOperation::ThenCompose => {
            let parent = single(operation, &mut inputs)?;
            if parent.is_failure() {
                Ok(Resolution::Complete(parent))
            } else {
                Ok(Resolution::Invoke(vec![parent]))
            }
        }
        CompletionOperation::Exceptionally | CompletionOperation::ExceptionallyCompose => {
            let parent = single(operation, &mut inputs)?;
            if parent.is_success() {
                Ok(Resolution::Complete(parent))
            } else {
                Ok(Resolution::Invoke(vec![parent]))
            }
        }
        CompletionOperation::Handle => {
            let parent = single(operation, &mut inputs)?;
            Ok(Resolution::Invoke(outcome_args(parent)))
        }
        CompletionOperation::WhenComplete => {
            let parent = single(operation, &mut inputs)?;
            Ok(Resolution::Observe {
                args: outcome_args(parent.clone()),
                forward: parent,
            })
        }
        CompletionOperation::ThenCombine => {
            check_inputs(operation, inputs.len())?;
            match inputs.iter().find(|input| input.is_failure()) {
                Some(failed) => Ok(Resolution::Complete(failed.clone())),
                None => Ok(Resolution::Invoke(inputs)),
            }
        }
        CompletionOperation::ApplyToEither => {
            let first = inputs
                .into_iter()
                .next()
                .ok_or_else(|| FlowError::invalid_argument(format!("{operation} needs a completed input")))?;
            if first.is_failure() {
                Ok(Resolution::Complete(first))
            } else {
                Ok(Resolution::Invoke(vec![first]))
            }
        }
        CompletionOperation::AllOf => Ok(Resolution::Complete(CompletionResult::empty())),
        CompletionOperation::AnyOf => {
            let first = inputs
                .into_iter()
                .next()
                .ok_or_else(|| FlowError::invalid_argument("at least one future must be specified"))?;
            Ok(Resolution::Complete(first))
        }
        CompletionOperation::Delay
        | CompletionOperation::CompletedValue
        | CompletionOperation::TerminationHook => Err(FlowError::platform(format!(
            "{operation} stages are not resolved from inputs"
        ))),
    }
}

/// Decides what a stage that adopts a stage (`thenCompose`,
/// `exceptionallyCompose`) does with its body's result.
#[must_use]
pub fn compose(result: CompletionResult) -> Composition {
    match result {
        CompletionResult::Success(Datum::StageRef(reference)) => Composition::Adopt(reference.stage_id),
        CompletionResult::Success(other) => Composition::Complete(CompletionResult::failure(Datum::error(
            ErrorType::InvalidStageResponse,
            format!("compose body returned a {} datum instead of a stage reference", other.kind()),
        ))),
        failure @ CompletionResult::Failure(_) => Composition::Complete(failure),
    }
}

/// Arguments of an outcome body: `[value, empty]` on success, `[empty, failure]` on failure.
fn outcome_args(parent: CompletionResult) -> Vec<CompletionResult> {
    if parent.is_success() {
        vec![parent, CompletionResult::empty()]
    } else {
        vec![CompletionResult::empty(), parent]
    }
}

fn single(
    operation: CompletionOperation,
    inputs: &mut Vec<CompletionResult>,
) -> Result<CompletionResult, FlowError> {
    check_inputs(operation, inputs.len())?;
    inputs
        .pop()
        .ok_or_else(|| FlowError::invalid_argument(format!("{operation} takes exactly one input")))
}
