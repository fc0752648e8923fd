//! Authentication provider contract
//!
//! Every identity backend (local config, bearer tokens, OIDC, LDAP, SAML and
//! the cloud IAM flavors) implements the same closed six-method trait. The
//! registry only ever sees `Arc<dyn AuthProvider>`.
//!
//! Provider calls are the only suspension points in the core. There is no
//! timeout or cancellation contract beyond what each provider enforces
//! itself; callers needing one must wrap the call.

use crate::auth::models::{AuthLevel, Credentials, UserPrincipal};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Raw provider configuration as declared in config files
pub type ProviderConfig = HashMap<String, serde_json::Value>;

/// Role names that escalate a principal to `STEP_UP`
pub const ADMIN_ROLES: &[&str] = &[
    "admin",
    "administrator",
    "cluster-admin",
    "super-admin",
    "superuser",
    "root",
    "owner",
];

/// Role names that escalate a principal to `MULTI_FACTOR`
pub const ELEVATED_ROLES: &[&str] = &["developer", "operator"];

/// Identity backend families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    LocalConfig,
    BearerToken,
    Oidc,
    Ldap,
    Saml,
    AwsIam,
    GcpIam,
    AzureAd,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::LocalConfig => "local_config",
            ProviderType::BearerToken => "bearer_token",
            ProviderType::Oidc => "oidc",
            ProviderType::Ldap => "ldap",
            ProviderType::Saml => "saml",
            ProviderType::AwsIam => "aws_iam",
            ProviderType::GcpIam => "gcp_iam",
            ProviderType::AzureAd => "azure_ad",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities a provider may advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFeature {
    PasswordAuth,
    TokenValidation,
    TokenRefresh,
    MultiFactor,
    GroupMapping,
    Federation,
    AccessKeys,
}

/// Static capability and config-schema declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub provider_type: ProviderType,
    pub display_name: String,
    pub description: String,
    /// Keys that must be present in the provider's configuration
    pub required_config: Vec<String>,
    pub optional_config: Vec<String>,
    pub supported_features: Vec<ProviderFeature>,
    pub security_features: Vec<String>,
}

impl ProviderMetadata {
    pub fn new(provider_type: ProviderType, display_name: impl Into<String>) -> Self {
        Self {
            provider_type,
            display_name: display_name.into(),
            description: String::new(),
            required_config: Vec::new(),
            optional_config: Vec::new(),
            supported_features: Vec::new(),
            security_features: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_required_config(mut self, keys: &[&str]) -> Self {
        self.required_config = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_optional_config(mut self, keys: &[&str]) -> Self {
        self.optional_config = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_features(mut self, features: &[ProviderFeature]) -> Self {
        self.supported_features = features.to_vec();
        self
    }

    pub fn with_security_features(mut self, features: &[&str]) -> Self {
        self.security_features = features.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn supports(&self, feature: ProviderFeature) -> bool {
        self.supported_features.contains(&feature)
    }

    /// Required keys absent from `config` (null values count as absent)
    pub fn missing_config(&self, config: &ProviderConfig) -> Vec<String> {
        self.required_config
            .iter()
            .filter(|key| config.get(key.as_str()).map_or(true, |v| v.is_null()))
            .cloned()
            .collect()
    }
}

/// Provider health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Result of an active connectivity probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ProviderHealth {
    pub fn healthy(response_time: Duration) -> Self {
        Self {
            status: HealthStatus::Healthy,
            response_time_ms: response_time.as_millis() as u64,
            error: None,
            checked_at: Utc::now(),
        }
    }

    pub fn degraded(response_time: Duration, reason: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            response_time_ms: response_time.as_millis() as u64,
            error: Some(reason.into()),
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time_ms: 0,
            error: Some(error.into()),
            checked_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// The closed provider interface.
///
/// `authenticate` returns `Ok(None)` for rejected credentials and never a
/// partially populated principal. Providers without a token concept return
/// `Ok(None)` from `validate_token` and `refresh_token`.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Turn a credential bundle into a principal
    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<UserPrincipal>>;

    /// Stateless check of a previously issued token or assertion
    async fn validate_token(&self, token: &str) -> Result<Option<UserPrincipal>>;

    /// Issue a renewed token where supported
    async fn refresh_token(&self, token: &str) -> Result<Option<String>>;

    /// Capability and config-schema declaration
    fn get_metadata(&self) -> ProviderMetadata;

    /// Active connectivity probe
    async fn health_check(&self) -> Result<ProviderHealth>;

    /// Cheap connectivity gate used at registration time
    async fn test_connection(&self) -> bool;
}

/// Auth level implied by role names alone
pub fn auth_level_for_roles<S: AsRef<str>>(roles: &[S]) -> AuthLevel {
    let matches = |set: &[&str]| {
        roles
            .iter()
            .any(|r| set.iter().any(|s| s.eq_ignore_ascii_case(r.as_ref())))
    };

    if matches(ADMIN_ROLES) {
        AuthLevel::StepUp
    } else if matches(ELEVATED_ROLES) {
        AuthLevel::MultiFactor
    } else {
        AuthLevel::SingleFactor
    }
}

/// Role-derived level, raised to `MULTI_FACTOR` when a second factor was verified
pub fn resolve_auth_level<S: AsRef<str>>(roles: &[S], mfa_authenticated: bool) -> AuthLevel {
    let level = auth_level_for_roles(roles);
    if mfa_authenticated && level < AuthLevel::MultiFactor {
        AuthLevel::MultiFactor
    } else {
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_escalation_rule() {
        assert_eq!(auth_level_for_roles(&["Admin"]), AuthLevel::StepUp);
        assert_eq!(
            auth_level_for_roles(&["viewer", "cluster-admin"]),
            AuthLevel::StepUp
        );
        assert_eq!(auth_level_for_roles(&["developer"]), AuthLevel::MultiFactor);
        assert_eq!(auth_level_for_roles(&["operator"]), AuthLevel::MultiFactor);
        assert_eq!(auth_level_for_roles(&["viewer"]), AuthLevel::SingleFactor);
        assert_eq!(
            auth_level_for_roles::<&str>(&[]),
            AuthLevel::SingleFactor
        );
    }

    #[test]
    fn test_mfa_never_lowers_level() {
        assert_eq!(resolve_auth_level(&["viewer"], true), AuthLevel::MultiFactor);
        assert_eq!(resolve_auth_level(&["admin"], true), AuthLevel::StepUp);
        assert_eq!(resolve_auth_level(&["viewer"], false), AuthLevel::SingleFactor);
    }

    #[test]
    fn test_missing_config_detection() {
        let metadata = ProviderMetadata::new(ProviderType::Oidc, "OIDC")
            .with_required_config(&["issuer_url", "client_id"]);

        let mut config = ProviderConfig::new();
        config.insert("issuer_url".into(), json!("https://id.example.com"));
        config.insert("client_id".into(), serde_json::Value::Null);

        assert_eq!(metadata.missing_config(&config), vec!["client_id".to_string()]);
    }
}
