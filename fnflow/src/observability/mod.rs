//! Observability utilities.
//!
//! fnflow logs through `tracing`. Applications install a subscriber once at
//! start-up, for example with [`init_tracing`].

use crate::core::{FlowId, StageId};
use crate::errors::FlowError;
use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber.
///
/// The filter comes from `RUST_LOG` when set, else from `default_filter`.
/// With `json` set, events are written as JSON lines. Fails if a global
/// subscriber is already installed or the filter does not parse.
pub fn init_tracing(default_filter: &str, json: bool) -> Result<(), FlowError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| FlowError::platform(format!("invalid log filter '{default_filter}': {e}")))?,
    };

    let installed = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };
    installed.map_err(|e| FlowError::platform(format!("failed to install tracing subscriber: {e}")))
}

/// Span covering the execution of one stage body.
#[must_use]
pub fn stage_span(flow_id: &FlowId, stage_id: &StageId) -> Span {
    tracing::info_span!("stage", flow_id = %flow_id, stage_id = %stage_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let err = init_tracing("fnflow=[", false).unwrap_err();
        assert!(matches!(err, FlowError::Platform(_)));
    }

    #[test]
    fn test_stage_span_builds() {
        let span = stage_span(&FlowId::new("f"), &StageId::new("1"));
        let _entered = span.enter();
    }
}
