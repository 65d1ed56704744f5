//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the completer service URL.
pub const COMPLETER_BASE_URL_ENV: &str = "COMPLETER_BASE_URL";

/// Environment variable holding the function ID.
pub const FUNCTION_ID_ENV: &str = "FN_FUNCTION_ID";

/// Configuration for flow invocations and completer clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Base URL of the completer service.
    #[serde(default = "default_completer_base_url")]
    pub completer_base_url: String,
    /// Per-request timeout in seconds for completer calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: f64,
    /// Time allowed to each termination hook, in seconds.
    #[serde(default = "default_hook_timeout")]
    pub hook_timeout_seconds: f64,
    /// ID of the function owning new flows.
    #[serde(default = "default_function_id")]
    pub function_id: String,
}

fn default_completer_base_url() -> String {
    "http://completer-svc:8081".to_string()
}

fn default_request_timeout() -> f64 {
    30.0
}

fn default_hook_timeout() -> f64 {
    10.0
}

fn default_function_id() -> String {
    "fnflow".to_string()
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            completer_base_url: default_completer_base_url(),
            request_timeout_seconds: default_request_timeout(),
            hook_timeout_seconds: default_hook_timeout(),
            function_id: default_function_id(),
        }
    }
}

impl FlowConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from defaults overlaid with the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(COMPLETER_BASE_URL_ENV).filter(|v| !v.is_empty()) {
            config.completer_base_url = url;
        }
        if let Some(function_id) = lookup(FUNCTION_ID_ENV).filter(|v| !v.is_empty()) {
            config.function_id = function_id;
        }
        config
    }

    /// Sets the completer base URL.
    #[must_use]
    pub fn with_completer_base_url(mut self, url: impl Into<String>) -> Self {
        self.completer_base_url = url.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Sets the per-hook timeout.
    #[must_use]
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Sets the function ID.
    #[must_use]
    pub fn with_function_id(mut self, function_id: impl Into<String>) -> Self {
        self.function_id = function_id.into();
        self
    }

    /// Gets the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout_seconds).unwrap_or(Duration::from_secs(30))
    }

    /// Gets the hook timeout as a Duration.
    #[must_use]
    pub fn hook_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.hook_timeout_seconds).unwrap_or(Duration::from_secs(10))
    }
}
