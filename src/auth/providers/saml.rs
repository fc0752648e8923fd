//! SAML 2.0 provider
//!
//! Consumes an already-parsed assertion forwarded by the service provider
//! endpoint as base64-encoded JSON. Trust is established by the issuer and
//! audience restriction plus the assertion's validity window.

use super::{parse_settings, BackendProbe, ConnectivitySettings};
use crate::auth::models::{Credentials, UserPrincipal};
use crate::auth::provider::{
    resolve_auth_level, AuthProvider, ProviderConfig, ProviderFeature, ProviderHealth,
    ProviderMetadata, ProviderType,
};
use crate::error::{Result, UpidError};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 120;
const MAX_CLOCK_SKEW_SECONDS: i64 = 3600;

/// AuthnContext class references that imply more than a password
const STRONG_AUTHN_CONTEXTS: &[&str] = &[
    "urn:oasis:names:tc:SAML:2.0:ac:classes:MobileTwoFactorContract",
    "urn:oasis:names:tc:SAML:2.0:ac:classes:TimeSyncToken",
    "http://schemas.microsoft.com/claims/multipleauthn",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamlAssertion {
    pub issuer: String,
    pub audience: String,
    pub name_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: DateTime<Utc>,
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authn_context_class_ref: Option<String>,
}

impl SamlAssertion {
    /// Base64 form accepted as the `saml_response` credential
    pub fn encode(&self) -> Result<String> {
        Ok(general_purpose::STANDARD.encode(serde_json::to_vec(self)?))
    }

    fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct AttributeNames {
    #[serde(default = "default_email_attribute")]
    email: String,
    #[serde(default = "default_name_attribute")]
    display_name: String,
    #[serde(default = "default_groups_attribute")]
    groups: String,
    #[serde(default = "default_roles_attribute")]
    roles: String,
}

fn default_email_attribute() -> String {
    "email".to_string()
}
fn default_name_attribute() -> String {
    "displayName".to_string()
}
fn default_groups_attribute() -> String {
    "groups".to_string()
}
fn default_roles_attribute() -> String {
    "roles".to_string()
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            email: default_email_attribute(),
            display_name: default_name_attribute(),
            groups: default_groups_attribute(),
            roles: default_roles_attribute(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SamlSettings {
    idp_entity_id: String,
    sp_entity_id: String,
    #[serde(default)]
    clock_skew_seconds: Option<i64>,
    #[serde(default)]
    attributes: Option<AttributeNames>,
    #[serde(flatten)]
    connectivity: ConnectivitySettings,
}

pub struct SamlProvider {
    idp_entity_id: String,
    sp_entity_id: String,
    clock_skew: Duration,
    attributes: AttributeNames,
    probe: BackendProbe,
}

impl SamlProvider {
    pub fn new(idp_entity_id: impl Into<String>, sp_entity_id: impl Into<String>) -> Self {
        let idp_entity_id = idp_entity_id.into();
        Self {
            probe: BackendProbe::new(idp_entity_id.clone(), true),
            idp_entity_id,
            sp_entity_id: sp_entity_id.into(),
            clock_skew: Duration::seconds(DEFAULT_CLOCK_SKEW_SECONDS),
            attributes: AttributeNames::default(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let settings: SamlSettings = parse_settings("saml", config)?;
        if settings.idp_entity_id.trim().is_empty() || settings.sp_entity_id.trim().is_empty() {
            return Err(UpidError::configuration("SAML entity ids must not be empty"));
        }
        let mut provider = Self::new(settings.idp_entity_id, settings.sp_entity_id);
        provider.clock_skew = Duration::seconds(
            settings
                .clock_skew_seconds
                .unwrap_or(DEFAULT_CLOCK_SKEW_SECONDS)
                .clamp(0, MAX_CLOCK_SKEW_SECONDS),
        );
        if let Some(attributes) = settings.attributes {
            provider.attributes = attributes;
        }
        provider.probe = settings.connectivity.probe(provider.idp_entity_id.clone());
        Ok(provider)
    }

    pub fn probe(&self) -> &BackendProbe {
        &self.probe
    }

    /// Decode and check an encoded assertion
    pub fn decode_assertion(&self, encoded: &str) -> Result<SamlAssertion> {
        let raw = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| UpidError::token_validation(format!("Invalid SAML encoding: {e}")))?;
        let assertion: SamlAssertion = serde_json::from_slice(&raw)
            .map_err(|e| UpidError::token_validation(format!("Malformed SAML assertion: {e}")))?;

        if assertion.issuer != self.idp_entity_id {
            return Err(UpidError::token_validation(format!(
                "Untrusted issuer {}",
                assertion.issuer
            )));
        }
        if assertion.audience != self.sp_entity_id {
            return Err(UpidError::token_validation("Audience restriction not met"));
        }

        let now = Utc::now();
        // Skew is applied to our clock; assertion times can sit at the edge of chrono's range
        if now - self.clock_skew >= assertion.not_on_or_after {
            return Err(UpidError::token_validation("Assertion expired"));
        }
        if let Some(not_before) = assertion.not_before {
            if now + self.clock_skew < not_before {
                return Err(UpidError::token_validation("Assertion not yet valid"));
            }
        }
        if assertion.name_id.is_empty() {
            return Err(UpidError::token_validation("Assertion has no NameID"));
        }

        Ok(assertion)
    }

    fn principal_for(&self, assertion: &SamlAssertion) -> UserPrincipal {
        let roles = assertion
            .attributes
            .get(&self.attributes.roles)
            .cloned()
            .unwrap_or_default();
        let groups = assertion
            .attributes
            .get(&self.attributes.groups)
            .cloned()
            .unwrap_or_default();
        let mfa = assertion
            .authn_context_class_ref
            .as_deref()
            .map_or(false, |ctx| STRONG_AUTHN_CONTEXTS.contains(&ctx));

        let level = resolve_auth_level(&roles, mfa);
        let mut principal = UserPrincipal::new(&assertion.name_id, ProviderType::Saml.as_str())
            .with_email(assertion.first(&self.attributes.email).unwrap_or_default())
            .with_display_name(
                assertion
                    .first(&self.attributes.display_name)
                    .unwrap_or(assertion.name_id.as_str()),
            )
            .with_roles(roles)
            .with_groups(groups)
            .with_mfa(mfa)
            .with_auth_level(level)
            .with_claim("issuer", &assertion.issuer)
            .with_claim("not_on_or_after", assertion.not_on_or_after.to_rfc3339());
        if let Some(ctx) = &assertion.authn_context_class_ref {
            principal = principal.with_claim("authn_context", ctx);
        }
        principal
    }
}

#[async_trait]
impl AuthProvider for SamlProvider {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<UserPrincipal>> {
        match credentials.get("saml_response") {
            Some(response) => self.validate_token(response).await,
            None => Ok(None),
        }
    }

    async fn validate_token(&self, token: &str) -> Result<Option<UserPrincipal>> {
        match self.decode_assertion(token) {
            Ok(assertion) => Ok(Some(self.principal_for(&assertion))),
            Err(UpidError::TokenValidation(reason)) => {
                debug!(idp = %self.idp_entity_id, reason = %reason, "SAML assertion rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_token(&self, _token: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn get_metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new(ProviderType::Saml, "SAML 2.0")
            .with_description("Assertions from a SAML 2.0 identity provider")
            .with_required_config(&["idp_entity_id", "sp_entity_id"])
            .with_optional_config(&["clock_skew_seconds", "attributes", "reachable", "latency_ms"])
            .with_features(&[
                ProviderFeature::Federation,
                ProviderFeature::GroupMapping,
                ProviderFeature::MultiFactor,
                ProviderFeature::TokenValidation,
            ])
            .with_security_features(&["audience_restriction", "validity_window"])
    }

    async fn health_check(&self) -> Result<ProviderHealth> {
        Ok(self.probe.health().await)
    }

    async fn test_connection(&self) -> bool {
        self.probe.probe().await.is_ok()
    }
}
