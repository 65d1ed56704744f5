//! Testing utilities for flows.
//!
//! This module provides:
//! - An in-process completer that runs whole flows without a service
//! - Test assertions for stage results and bridged failures

mod assertions;
mod in_memory;

pub use assertions::{
    assert_failure, assert_failure_type, assert_stage_failure, assert_stage_failure_message,
    assert_success,
};
pub use in_memory::InMemCompleter;
