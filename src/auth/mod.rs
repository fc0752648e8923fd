//! Enterprise authentication core
//!
//! ```text
//!   caller ──► EnterpriseAuthManager ──► AuthRegistry ──► dyn AuthProvider
//!                 │        │                               (local, token, oidc,
//!                 │        └─► risk scoring                 ldap, saml, cloud iam)
//!                 ├─► session map (per manager)
//!                 └─► AuditLog ──► tracing target `upid_auth::audit`
//! ```
//!
//! Providers turn credentials into a [`UserPrincipal`]; the manager owns
//! everything after that: risk score, session cap, expiry, refresh and the
//! audit trail. [`AuthMiddleware`] is the request-facing adapter.

pub mod audit;
pub mod manager;
pub mod middleware;
pub mod models;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod risk;
pub mod security;

pub use audit::{AuditEntry, AuditEventType, AuditFilter, AuditLog};
pub use manager::{AuthStats, EnterpriseAuthManager};
pub use middleware::{AuthMiddleware, AuthRejection};
pub use models::{AuthContext, AuthLevel, AuthSession, Credentials, UserPrincipal};
pub use provider::{
    AuthProvider, HealthStatus, ProviderConfig, ProviderFeature, ProviderHealth,
    ProviderMetadata, ProviderType,
};
pub use registry::AuthRegistry;

use crate::error::{Result, UpidError};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Upper bound on any configured duration, one year
const MAX_MINUTES: u64 = 525_600;

/// Session and risk policy for a manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of a new session and the extension granted by a refresh
    pub session_timeout_minutes: u64,
    /// Live sessions allowed per user before the oldest is evicted
    pub max_sessions_per_user: usize,
    /// Session age after which validation recomputes the risk score
    pub risk_recompute_after_minutes: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_timeout_minutes: 480,
            max_sessions_per_user: 5,
            risk_recompute_after_minutes: 60,
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.session_timeout_minutes == 0 {
            return Err(UpidError::configuration(
                "auth.session_timeout_minutes must be greater than zero",
            ));
        }
        if self.session_timeout_minutes > MAX_MINUTES {
            return Err(UpidError::configuration(format!(
                "auth.session_timeout_minutes must not exceed {MAX_MINUTES}"
            )));
        }
        if self.max_sessions_per_user == 0 {
            return Err(UpidError::configuration(
                "auth.max_sessions_per_user must be greater than zero",
            ));
        }
        if self.risk_recompute_after_minutes > MAX_MINUTES {
            return Err(UpidError::configuration(format!(
                "auth.risk_recompute_after_minutes must not exceed {MAX_MINUTES}"
            )));
        }
        Ok(())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::minutes(self.session_timeout_minutes.min(MAX_MINUTES) as i64)
    }

    pub fn risk_recompute_after(&self) -> Duration {
        Duration::minutes(self.risk_recompute_after_minutes.min(MAX_MINUTES) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session_timeout(), Duration::hours(8));
        assert_eq!(config.risk_recompute_after(), Duration::hours(1));
    }

    #[test]
    fn test_validation_rejects_zero() {
        let config = AuthConfig {
            session_timeout_minutes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AuthConfig {
            max_sessions_per_user: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
