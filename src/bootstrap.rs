//! Provider construction from configuration
//!
//! Nothing registers itself: callers build a registry and await
//! [`initialize`] explicitly. When the configuration declares no providers,
//! [`default_providers`] supplies an empty local directory and an empty
//! bearer-token table so that tokens can be issued at runtime.

use crate::auth::provider::{AuthProvider, ProviderType};
use crate::auth::providers::{
    BearerTokenProvider, CloudIamProvider, CloudPlatform, LdapProvider, LocalConfigProvider,
    OidcProvider, SamlProvider,
};
use crate::auth::registry::AuthRegistry;
use crate::config::{ProviderEntry, UpidConfig};
use crate::error::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of registering the configured providers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitReport {
    pub registered: Vec<String>,
    pub skipped: Vec<String>,
    /// Provider name and the reason it was refused
    pub failed: Vec<(String, String)>,
}

impl InitReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Providers used when the configuration declares none
pub fn default_providers() -> Vec<ProviderEntry> {
    vec![
        ProviderEntry::new("local", ProviderType::LocalConfig).with_setting("users", json!([])),
        ProviderEntry::new("token", ProviderType::BearerToken).with_setting("tokens", json!([])),
    ]
}

/// Instantiate the provider an entry describes
pub fn build_provider(entry: &ProviderEntry) -> Result<Arc<dyn AuthProvider>> {
    let settings = &entry.settings;
    let provider: Arc<dyn AuthProvider> = match entry.provider_type {
        ProviderType::LocalConfig => Arc::new(LocalConfigProvider::from_config(settings)?),
        ProviderType::BearerToken => Arc::new(BearerTokenProvider::from_config(settings)?),
        ProviderType::Oidc => Arc::new(OidcProvider::from_config(settings)?),
        ProviderType::Ldap => Arc::new(LdapProvider::from_config(settings)?),
        ProviderType::Saml => Arc::new(SamlProvider::from_config(settings)?),
        ProviderType::AwsIam => Arc::new(CloudIamProvider::from_config(CloudPlatform::Aws, settings)?),
        ProviderType::GcpIam => Arc::new(CloudIamProvider::from_config(CloudPlatform::Gcp, settings)?),
        ProviderType::AzureAd => {
            Arc::new(CloudIamProvider::from_config(CloudPlatform::Azure, settings)?)
        }
    };
    Ok(provider)
}

/// Register every enabled provider from `config`.
///
/// A provider that fails to build or register is recorded in the report and
/// does not stop the others.
pub async fn initialize(registry: &AuthRegistry, config: &UpidConfig) -> InitReport {
    let entries = if config.providers.is_empty() {
        default_providers()
    } else {
        config.providers.clone()
    };

    let mut report = InitReport::default();
    for entry in entries {
        if !entry.enabled {
            info!("Skipping disabled provider '{}'", entry.name);
            report.skipped.push(entry.name);
            continue;
        }

        let outcome = match build_provider(&entry) {
            Ok(provider) => {
                registry
                    .try_register(&entry.name, provider, Some(entry.settings.clone()))
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => report.registered.push(entry.name),
            Err(e) => {
                warn!("Provider '{}' not registered: {}", entry.name, e);
                report.failed.push((entry.name, e.to_string()));
            }
        }
    }

    info!(
        registered = report.registered.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Provider initialization complete"
    );
    report
}
