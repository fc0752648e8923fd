//! UPID enterprise authentication core
//!
//! Pluggable identity providers behind one async trait, a registry of named
//! provider instances, and a manager that turns successful logins into
//! sessions with risk scores, per-user limits and an append-only audit trail.
//!
//! # Features
//!
//! - Local config, bearer token, OIDC, LDAP, SAML and cloud IAM providers
//! - Gated registration (name, required config, connectivity)
//! - Session create / validate / refresh / logout / expiry sweep
//! - Contextual risk scoring and audit filtering
//! - Layered TOML + environment configuration and a persisted CLI token store
//!
//! ```no_run
//! use std::sync::Arc;
//! use upid_auth::{bootstrap, AuthRegistry, EnterpriseAuthManager, UpidConfig};
//!
//! # async fn run() -> upid_auth::Result<()> {
//! let config = UpidConfig::load(None)?;
//! let registry = Arc::new(AuthRegistry::new());
//! bootstrap::initialize(&registry, &config).await;
//! let manager = EnterpriseAuthManager::new(registry, config.auth.clone());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use auth::{
    AuthConfig, AuthContext, AuthLevel, AuthMiddleware, AuthProvider, AuthRegistry, AuthSession,
    Credentials, EnterpriseAuthManager, UserPrincipal,
};
pub use config::UpidConfig;
pub use error::{Result, UpidError};
