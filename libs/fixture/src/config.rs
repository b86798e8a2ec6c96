//! Integration config consumed by the fixture.
//!
//! The config is a JSON document whose path is given by the `CONFIG`
//! environment variable, the same file the suites themselves read. Only the
//! fields the fixture needs are modelled here; unknown fields are ignored.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable holding the config file path.
pub const CONFIG_ENV: &str = "CONFIG";

/// Platform endpoint and admin identity for one suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Control-plane API endpoint, e.g. `api.example.com` or a full URL.
    #[serde(rename = "api")]
    pub api_endpoint: String,

    pub admin_user: String,

    pub admin_password: String,

    /// Skip TLS certificate verification for both the CLI and REST calls.
    #[serde(default)]
    pub skip_ssl_validation: bool,

    /// Multiplier applied to every operation timeout.
    #[serde(default = "default_timeout_scale")]
    pub timeout_scale: f64,

    /// CLI binary to invoke.
    #[serde(default = "default_cf_binary")]
    pub cf_binary: String,
}

fn default_timeout_scale() -> f64 {
    1.0
}

fn default_cf_binary() -> String {
    "cf".to_string()
}

impl IntegrationConfig {
    /// Build a config with default scale and binary.
    pub fn new(
        api_endpoint: impl Into<String>,
        admin_user: impl Into<String>,
        admin_password: impl Into<String>,
    ) -> Self {
        Self {
            api_endpoint: api_endpoint.into(),
            admin_user: admin_user.into(),
            admin_password: admin_password.into(),
            skip_ssl_validation: false,
            timeout_scale: default_timeout_scale(),
            cf_binary: default_cf_binary(),
        }
    }

    /// Load the config from the file named by `CONFIG`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).map_err(|_| ConfigError::MissingEnv(CONFIG_ENV))?;
        Self::load(path)
    }

    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the fields the fixture relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("api", &self.api_endpoint),
            ("admin_user", &self.admin_user),
            ("admin_password", &self.admin_password),
            ("cf_binary", &self.cf_binary),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }

        if !self.timeout_scale.is_finite() || self.timeout_scale <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "timeout_scale",
                reason: format!("must be a positive number, got {}", self.timeout_scale),
            });
        }

        Ok(())
    }

    /// Stretch `timeout` by `timeout_scale`.
    ///
    /// A scale of exactly 1.0 returns `timeout` untouched. A scale that fails
    /// validation (zero, negative or non-finite) also leaves it unscaled.
    /// The result is rounded to the nearest nanosecond, so scaling is linear
    /// only to within 1ns.
    pub fn scaled(&self, timeout: Duration) -> Duration {
        let scale = self.timeout_scale;
        if scale == 1.0 || !(scale.is_finite() && scale > 0.0) {
            return timeout;
        }

        let nanos = timeout.as_nanos() as f64 * scale;
        if !nanos.is_finite() {
            return timeout;
        }

        // `as` saturates at u64::MAX nanoseconds (~584 years).
        Duration::from_nanos(nanos.round() as u64)
    }

    /// The endpoint as a URL, defaulting to `https://` when no scheme is given.
    pub fn api_url(&self) -> String {
        let endpoint = self.api_endpoint.trim_end_matches('/');
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        }
    }
}
