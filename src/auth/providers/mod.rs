//! Built-in provider implementations
//!
//! Each provider reduces its identity protocol to the authentication
//! contract: credentials in, principal out. None of them talk to a real
//! identity backend; the directory, token table or trust settings come from
//! configuration. Connectivity is modelled by [`BackendProbe`] so that
//! registration gates and health reports behave like they would against a
//! live endpoint.

pub mod cloud_iam;
pub mod ldap;
pub mod local;
pub mod oidc;
pub mod saml;
pub mod token;

pub use cloud_iam::{CloudIamProvider, CloudPlatform};
pub use ldap::LdapProvider;
pub use local::LocalConfigProvider;
pub use oidc::OidcProvider;
pub use saml::SamlProvider;
pub use token::BearerTokenProvider;

use crate::auth::provider::{ProviderConfig, ProviderHealth};
use crate::error::{Result, UpidError};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Response time above which a reachable backend is reported as degraded
const DEFAULT_DEGRADED_AFTER: Duration = Duration::from_millis(1000);

/// Verified against when the account is unknown, so a miss costs as much as a hit
static DECOY_HASH: Lazy<Option<String>> = Lazy::new(|| hash_secret("upid-decoy-secret").ok());

/// Hash a secret with Argon2id, returning the PHC string stored in configuration
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UpidError::Generic(anyhow::anyhow!("Secret hashing failed: {e}")))
}

/// Check a presented secret against a stored PHC hash
///
/// A malformed stored hash never matches.
pub fn verify_secret(secret: &str, stored: &str) -> bool {
    let parsed = match PasswordHash::new(stored.trim()) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Stored secret is not a valid PHC hash");
            return false;
        }
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

/// Spend one verification on an account that does not exist
pub(crate) fn verify_decoy(secret: &str) {
    if let Some(decoy) = DECOY_HASH.as_deref() {
        let _ = verify_secret(secret, decoy);
    }
}

/// Deserialize a provider settings struct from raw configuration
pub(crate) fn parse_settings<T: DeserializeOwned>(
    provider: &str,
    config: &ProviderConfig,
) -> Result<T> {
    let object: serde_json::Map<String, serde_json::Value> =
        config.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| UpidError::configuration(format!("Invalid {provider} settings: {e}")))
}

pub(crate) fn default_true() -> bool {
    true
}

/// Connectivity knobs shared by every provider's settings
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ConnectivitySettings {
    #[serde(default = "default_true")]
    pub reachable: bool,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub degraded_after_ms: Option<u64>,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            reachable: true,
            latency_ms: 0,
            degraded_after_ms: None,
        }
    }
}

impl ConnectivitySettings {
    pub fn probe(&self, endpoint: impl Into<String>) -> BackendProbe {
        let mut probe = BackendProbe::new(endpoint, self.reachable)
            .with_latency(Duration::from_millis(self.latency_ms));
        if let Some(threshold) = self.degraded_after_ms {
            probe = probe.with_degraded_after(Duration::from_millis(threshold));
        }
        probe
    }
}

/// Simulated connectivity to a provider's identity backend
#[derive(Debug, Clone)]
pub struct BackendProbe {
    endpoint: String,
    reachable: Arc<AtomicBool>,
    latency: Duration,
    degraded_after: Duration,
}

impl BackendProbe {
    pub fn new(endpoint: impl Into<String>, reachable: bool) -> Self {
        Self {
            endpoint: endpoint.into(),
            reachable: Arc::new(AtomicBool::new(reachable)),
            latency: Duration::ZERO,
            degraded_after: DEFAULT_DEGRADED_AFTER,
        }
    }

    /// Add artificial latency to every probe
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_degraded_after(mut self, threshold: Duration) -> Self {
        self.degraded_after = threshold;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Round-trip to the backend, failing with a connection error when unreachable
    pub async fn probe(&self) -> Result<Duration> {
        let start = Instant::now();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if !self.is_reachable() {
            return Err(UpidError::connection(format!(
                "Identity backend {} is unreachable",
                self.endpoint
            )));
        }
        let elapsed = start.elapsed();
        debug!(endpoint = %self.endpoint, elapsed_ms = elapsed.as_millis() as u64, "Backend probe ok");
        Ok(elapsed)
    }

    /// Health classification derived from a single probe
    pub async fn health(&self) -> ProviderHealth {
        match self.probe().await {
            Ok(elapsed) if elapsed > self.degraded_after => ProviderHealth::degraded(
                elapsed,
                format!(
                    "Response time {}ms exceeds {}ms",
                    elapsed.as_millis(),
                    self.degraded_after.as_millis()
                ),
            ),
            Ok(elapsed) => ProviderHealth::healthy(elapsed),
            Err(e) => ProviderHealth::unhealthy(e.to_string()),
        }
    }
}
