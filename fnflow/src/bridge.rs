//! Conversion between failure datums and Rust errors.
//!
//! A stage body that returns an error is recorded as a failure datum. When
//! that failure is later retrieved it comes back as a [`StageFailure`]. If a
//! body simply re-raises a retrieved failure, the original datum is recorded
//! again unchanged.

use crate::core::{CompletionResult, Datum, ErrorType};
use crate::errors::{FlowError, StageFailure};
use std::any::Any;

/// Turns a failure datum into the error surfaced at a retrieval point.
#[must_use]
pub fn bridge(datum: Datum) -> FlowError {
    FlowError::StageFailure(StageFailure::new(datum))
}

/// Turns an error returned by a stage body into the failure result to record.
///
/// The error chain is searched for a [`StageFailure`]; when one is found its
/// datum is reused as is. Other [`FlowError`]s keep their category. Anything
/// else is recorded as a [`ErrorType::UserError`] with the rendered chain as
/// message and the debug rendering as trace.
pub fn to_result(err: impl Into<anyhow::Error>) -> CompletionResult {
    CompletionResult::failure(to_datum(&err.into()))
}

/// Builds the failure datum for an error without consuming it.
#[must_use]
pub fn to_datum(err: &anyhow::Error) -> Datum {
    for cause in err.chain() {
        if let Some(failure) = cause.downcast_ref::<StageFailure>() {
            return failure.datum().clone();
        }
        if let Some(FlowError::StageFailure(failure)) = cause.downcast_ref::<FlowError>() {
            return failure.datum().clone();
        }
    }

    let error_type = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<FlowError>())
        .map_or(ErrorType::UserError, FlowError::error_type);
    Datum::error_with_trace(error_type, format!("{err:#}"), format!("{err:?}"))
}

/// Builds the failure result for a stage body that panicked.
#[must_use]
pub fn panic_to_result(payload: &(dyn Any + Send)) -> CompletionResult {
    CompletionResult::failure(Datum::error(
        ErrorType::StageFailed,
        format!("stage body panicked: {}", panic_message(payload)),
    ))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use pretty_assertions::assert_eq;

    #[derive(Debug, thiserror::Error)]
    #[error("not a number: {0}")]
    struct ParseFailure(String);

    #[test]
    fn test_user_error_becomes_user_error_datum() {
        let result = to_result(ParseFailure("abc".into()));
        assert!(result.is_failure());
        let err = result.datum().as_error().unwrap();
        assert_eq!(err.error_type, ErrorType::UserError);
        assert_eq!(err.message, "not a number: abc");
        assert!(err.trace.is_some());
    }

    #[test]
    fn test_context_is_kept_in_message() {
        let err = Err::<(), _>(ParseFailure("x".into()))
            .context("parsing order")
            .unwrap_err();
        let datum = to_datum(&err);
        assert_eq!(datum.as_error().unwrap().message, "parsing order: not a number: x");
    }

    #[test]
    fn test_rethrown_failure_keeps_original_datum() {
        let original = Datum::error(ErrorType::FunctionTimeout, "slow");
        let surfaced = bridge(original.clone());
        assert_eq!(to_result(surfaced), CompletionResult::failure(original.clone()));

        // Still found when wrapped in context.
        let wrapped = anyhow::Error::from(bridge(original.clone())).context("while combining");
        assert_eq!(to_datum(&wrapped), original);
    }

    #[test]
    fn test_value_failure_round_trips() {
        let original = Datum::json(&"custom payload").unwrap();
        let surfaced = bridge(original.clone());
        let failure = surfaced.as_stage_failure().unwrap();
        assert_eq!(failure.decode::<String>().unwrap(), "custom payload");
        assert_eq!(to_result(surfaced).into_datum(), original);
    }

    #[test]
    fn test_flow_errors_keep_category() {
        let datum = to_datum(&FlowError::codec("bad bytes").into());
        assert_eq!(datum.as_error().unwrap().error_type, ErrorType::InvalidStageResponse);
    }

    #[test]
    fn test_flow_error_category_found_under_context() {
        let err = anyhow::Error::from(FlowError::Timeout(crate::core::StageId::new("3"))).context("waiting for quote");
        let datum = to_datum(&err);
        let err = datum.as_error().unwrap();
        assert_eq!(err.error_type, ErrorType::StageTimeout);
        assert!(err.message.starts_with("waiting for quote: "));
    }

    #[test]
    fn test_panic_payloads() {
        let result = panic_to_result(&"boom");
        let err = result.datum().as_error().unwrap();
        assert_eq!(err.error_type, ErrorType::StageFailed);
        assert!(err.message.contains("boom"));

        let result = panic_to_result(&String::from("owned"));
        assert!(result.datum().as_error().unwrap().message.contains("owned"));
    }
}
