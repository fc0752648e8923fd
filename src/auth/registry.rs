//! Named provider registry
//!
//! Registration is gated: the name must be well formed, any supplied
//! configuration must carry every key the provider declares as required,
//! and the provider must pass its connectivity test. Probe and insert run
//! under one registry-wide mutex so concurrent registrations of the same
//! name serialize and the last writer wins.

use crate::auth::provider::{AuthProvider, ProviderConfig, ProviderHealth, ProviderMetadata};
use crate::error::{Result, UpidError};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

static PROVIDER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("provider name pattern is valid")
});

struct RegisteredProvider {
    provider: Arc<dyn AuthProvider>,
    config: Option<ProviderConfig>,
    registered_at: DateTime<Utc>,
}

/// Summary of a registered provider
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub metadata: ProviderMetadata,
    pub registered_at: DateTime<Utc>,
}

/// Registry of named provider instances
pub struct AuthRegistry {
    providers: RwLock<HashMap<String, RegisteredProvider>>,
    registration_lock: Mutex<()>,
}

impl AuthRegistry {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            registration_lock: Mutex::new(()),
        }
    }

    pub fn is_valid_name(name: &str) -> bool {
        PROVIDER_NAME.is_match(name)
    }

    /// Register `provider` under `name`, reporting why a registration was refused
    pub async fn try_register(
        &self,
        name: &str,
        provider: Arc<dyn AuthProvider>,
        config: Option<ProviderConfig>,
    ) -> Result<()> {
        if !Self::is_valid_name(name) {
            return Err(UpidError::invalid_input(format!(
                "Invalid provider name '{name}'"
            )));
        }

        let _guard = self.registration_lock.lock().await;

        if let Some(config) = &config {
            let metadata = provider.get_metadata();
            let missing = metadata.missing_config(config);
            if !missing.is_empty() {
                return Err(UpidError::configuration(format!(
                    "Provider '{name}' ({}) is missing required config: {}",
                    metadata.provider_type,
                    missing.join(", ")
                )));
            }
        }

        let reachable = AssertUnwindSafe(provider.test_connection())
            .catch_unwind()
            .await
            .unwrap_or(false);
        if !reachable {
            return Err(UpidError::connection(format!(
                "Provider '{name}' failed its connection test"
            )));
        }

        let replaced = self
            .providers
            .write()
            .await
            .insert(
                name.to_string(),
                RegisteredProvider {
                    provider,
                    config,
                    registered_at: Utc::now(),
                },
            )
            .is_some();

        if replaced {
            info!("Replaced auth provider '{}'", name);
        } else {
            info!("Registered auth provider '{}'", name);
        }
        Ok(())
    }

    /// Register `provider` under `name`; `false` when any gate rejects it
    pub async fn register(
        &self,
        name: &str,
        provider: Arc<dyn AuthProvider>,
        config: Option<ProviderConfig>,
    ) -> bool {
        match self.try_register(name, provider, config).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Provider registration rejected: {}", e);
                false
            }
        }
    }

    pub async fn unregister(&self, name: &str) -> bool {
        let _guard = self.registration_lock.lock().await;
        let removed = self.providers.write().await.remove(name).is_some();
        if removed {
            info!("Unregistered auth provider '{}'", name);
        } else {
            debug!("Unregister of unknown provider '{}'", name);
        }
        removed
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn AuthProvider>> {
        self.providers
            .read()
            .await
            .get(name)
            .map(|entry| Arc::clone(&entry.provider))
    }

    /// Registered provider names in sorted order
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Configuration the provider was registered with
    pub async fn config(&self, name: &str) -> Option<ProviderConfig> {
        self.providers
            .read()
            .await
            .get(name)
            .and_then(|entry| entry.config.clone())
    }

    pub async fn describe(&self) -> Vec<ProviderInfo> {
        let providers = self.providers.read().await;
        let mut infos: Vec<ProviderInfo> = providers
            .iter()
            .map(|(name, entry)| ProviderInfo {
                name: name.clone(),
                metadata: entry.provider.get_metadata(),
                registered_at: entry.registered_at,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub async fn len(&self) -> usize {
        self.providers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.providers.read().await.is_empty()
    }

    /// Probe every provider concurrently.
    ///
    /// A failing or panicking health check is reported as unhealthy for that
    /// provider and never aborts the report.
    pub async fn health_report(&self) -> BTreeMap<String, ProviderHealth> {
        let snapshot: Vec<(String, Arc<dyn AuthProvider>)> = self
            .providers
            .read()
            .await
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.provider)))
            .collect();

        let checks = snapshot.into_iter().map(|(name, provider)| async move {
            let health = match AssertUnwindSafe(provider.health_check())
                .catch_unwind()
                .await
            {
                Ok(Ok(health)) => health,
                Ok(Err(e)) => ProviderHealth::unhealthy(e.to_string()),
                Err(_) => ProviderHealth::unhealthy("health check panicked"),
            };
            (name, health)
        });

        join_all(checks).await.into_iter().collect()
    }
}

impl Default for AuthRegistry {
    fn default() -> Self {
        Self::new()
    }
}
