//! Layered configuration
//!
//! Sources, lowest priority first:
//! 1. defaults embedded from `config/default.toml`
//! 2. a TOML file (`--config`, or `~/.upid/config.toml` when present)
//! 3. `UPID__`-prefixed environment variables, `__` separating sections

pub mod token_store;

pub use token_store::{AuthToken, TokenStore};

use crate::auth::provider::{ProviderConfig, ProviderType};
use crate::auth::registry::AuthRegistry;
use crate::auth::AuthConfig;
use crate::error::{Result, UpidError};
use crate::logging::LogConfig;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_CONFIG_TOML: &str = include_str!("../../config/default.toml");

pub const ENV_PREFIX: &str = "UPID";

/// One `[[providers]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(default = "crate::auth::providers::default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub settings: ProviderConfig,
}

impl ProviderEntry {
    pub fn new(name: impl Into<String>, provider_type: ProviderType) -> Self {
        Self {
            name: name.into(),
            provider_type,
            enabled: true,
            settings: ProviderConfig::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpidConfig {
    /// Token store location, `~/.upid/auth.json` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_store_path: Option<PathBuf>,
    pub auth: AuthConfig,
    pub logging: LogConfig,
    pub providers: Vec<ProviderEntry>,
}

impl UpidConfig {
    /// `~/.upid/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".upid")
            .join("config.toml")
    }

    /// Load from all sources. An explicit `path` must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder()
            .add_source(File::from_str(DEFAULT_CONFIG_TOML, FileFormat::Toml));

        match path {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            }
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    debug!("Loading configuration from {}", default_path.display());
                    builder = builder.add_source(
                        File::from(default_path)
                            .format(FileFormat::Toml)
                            .required(false),
                    );
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: UpidConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document layered over the embedded defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: UpidConfig = ConfigBuilder::builder()
            .add_source(File::from_str(DEFAULT_CONFIG_TOML, FileFormat::Toml))
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.auth.validate()?;
        self.logging.level()?;

        let mut seen = HashSet::new();
        for entry in &self.providers {
            if !AuthRegistry::is_valid_name(&entry.name) {
                return Err(UpidError::configuration(format!(
                    "Invalid provider name '{}': use lowercase letters, digits, '-' or '_'",
                    entry.name
                )));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(UpidError::configuration(format!(
                    "Provider '{}' is declared more than once",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    pub fn token_store_path(&self) -> PathBuf {
        self.token_store_path
            .clone()
            .unwrap_or_else(TokenStore::default_path)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| UpidError::configuration(format!("Failed to serialize config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_embedded_defaults() {
        let config = UpidConfig::from_toml_str("").unwrap();
        assert_eq!(config.auth, AuthConfig::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_providers_section() {
        let config = UpidConfig::from_toml_str(
            r#"
[auth]
max_sessions_per_user = 2

[[providers]]
name = "corp-ldap"
type = "ldap"
settings = { server_url = "ldaps://dc1.corp", base_dn = "dc=corp" }

[[providers]]
name = "ci"
type = "bearer_token"
enabled = false
"#,
        )
        .unwrap();

        assert_eq!(config.auth.max_sessions_per_user, 2);
        assert_eq!(config.auth.session_timeout_minutes, 480);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].provider_type, ProviderType::Ldap);
        assert_eq!(config.providers[0].settings["base_dn"], json!("dc=corp"));
        assert!(!config.providers[1].enabled);
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let err = UpidConfig::from_toml_str(
            r#"
[[providers]]
name = "a"
type = "oidc"

[[providers]]
name = "a"
type = "saml"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, UpidError::Configuration(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = UpidConfig::default();
        config.providers.push(
            ProviderEntry::new("token", ProviderType::BearerToken).with_setting("tokens", json!([])),
        );
        let rendered = config.to_toml_string().unwrap();
        let parsed = UpidConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.providers[0].name, "token");
    }
}
