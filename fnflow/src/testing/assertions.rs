//! Test assertions for stage results and flow errors.

use crate::core::{CompletionResult, Datum, ErrorType};
use crate::errors::FlowError;

/// Asserts that the result is a success.
pub fn assert_success(result: &CompletionResult) {
    assert!(
        result.is_success(),
        "Expected success, got failure: {:?}",
        result.datum()
    );
}

/// Asserts that the result is a failure.
pub fn assert_failure(result: &CompletionResult) {
    assert!(
        result.is_failure(),
        "Expected failure, got success: {:?}",
        result.datum()
    );
}

/// Asserts that the result is a failure carrying an error of the given type.
pub fn assert_failure_type(result: &CompletionResult, expected: ErrorType) {
    assert_failure(result);
    let actual = result.datum().as_error().map(|err| err.error_type);
    assert_eq!(
        actual,
        Some(expected),
        "Expected error type {expected}, got {actual:?}"
    );
}

/// Asserts that the error is a bridged stage failure carrying `expected`.
pub fn assert_stage_failure(err: &FlowError, expected: &Datum) {
    match err.as_stage_failure() {
        Some(failure) => assert_eq!(
            failure.datum(),
            expected,
            "Stage failure carries a different datum"
        ),
        None => panic!("Expected a stage failure, got: {err}"),
    }
}

/// Asserts that the error is a bridged stage failure whose message contains `needle`.
pub fn assert_stage_failure_message(err: &FlowError, needle: &str) {
    let message = err
        .as_stage_failure()
        .and_then(|failure| failure.message())
        .unwrap_or_default();
    assert!(
        message.contains(needle),
        "Expected stage failure message containing '{needle}', got: {err}"
    );
}
