//! Logging configuration
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and either a
//! compact or JSON formatter on stderr. `RUST_LOG` always wins over the
//! configured default level.

use crate::error::{Result, UpidError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const REDACTED: &str = "***";

/// Logging configuration, the `[logging]` section of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,

    /// Emit newline-delimited JSON instead of the compact format
    pub json: bool,

    pub thread_ids: bool,

    /// Include event targets (`upid_auth::audit` etc.)
    pub targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            thread_ids: false,
            targets: true,
        }
    }
}

impl LogConfig {
    /// Defaults overlaid with `UPID_LOG_LEVEL` and `UPID_LOG_JSON`
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("UPID_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.level = level.trim().to_lowercase();
            }
        }
        if let Ok(json) = std::env::var("UPID_LOG_JSON") {
            self.json = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        self
    }

    pub fn level(&self) -> Result<Level> {
        Level::from_str(&self.level)
            .map_err(|_| UpidError::configuration(format!("Invalid log level '{}'", self.level)))
    }
}

/// Install the global subscriber
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level()?.into())
        .from_env_lossy();

    let result = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(config.targets)
                    .with_thread_ids(config.thread_ids),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_target(config.targets)
                    .with_thread_ids(config.thread_ids),
            )
            .try_init()
    };

    result.map_err(|e| UpidError::internal(format!("Failed to initialize logging: {e}")))
}

/// Check if a field name indicates sensitive data
pub fn is_sensitive_field(field: &str) -> bool {
    let field_lower = field.to_lowercase();
    field_lower.contains("password")
        || field_lower.contains("secret")
        || field_lower.contains("token")
        || field_lower.contains("private_key")
        || field_lower.contains("saml_response")
        || field_lower.contains("credential")
}

/// Credential map safe to log: sensitive values are masked
pub fn redact_credentials<'a, I>(credentials: I) -> BTreeMap<&'a str, &'a str>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    credentials
        .into_iter()
        .map(|(k, v)| {
            let shown = if is_sensitive_field(k) { REDACTED } else { v.as_str() };
            (k.as_str(), shown)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Credentials;
    use serial_test::serial;

    #[test]
    fn test_redaction() {
        let creds = Credentials::from([
            ("username".to_string(), "alice".to_string()),
            ("password".to_string(), "hunter2".to_string()),
            ("id_token".to_string(), "eyJ...".to_string()),
        ]);
        let redacted = redact_credentials(&creds);
        assert_eq!(redacted["username"], "alice");
        assert_eq!(redacted["password"], REDACTED);
        assert_eq!(redacted["id_token"], REDACTED);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        temp_env::with_vars(
            [("UPID_LOG_LEVEL", Some("DEBUG")), ("UPID_LOG_JSON", Some("true"))],
            || {
                let config = LogConfig::from_env();
                assert_eq!(config.level, "debug");
                assert!(config.json);
                assert_eq!(config.level().unwrap(), Level::DEBUG);
            },
        );
    }

    #[test]
    fn test_invalid_level() {
        let config = LogConfig {
            level: "loud".into(),
            ..Default::default()
        };
        assert!(config.level().is_err());
    }
}
