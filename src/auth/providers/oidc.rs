//! OpenID Connect provider
//!
//! Accepts ID tokens obtained by the caller from the issuer. The payload is
//! decoded and its issuer, audience and validity window are checked against
//! configuration. Signature verification belongs to the issuer's SDK and is
//! not performed here.

use super::{parse_settings, BackendProbe, ConnectivitySettings};
use crate::auth::models::{AuthLevel, Credentials, UserPrincipal};
use crate::auth::provider::{
    resolve_auth_level, AuthProvider, ProviderConfig, ProviderFeature, ProviderHealth,
    ProviderMetadata, ProviderType,
};
use crate::error::{Result, UpidError};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 60;

/// Authentication method references that count as a second factor
const MFA_METHODS: &[&str] = &["mfa", "otp", "sms", "hwk", "swk"];

/// `aud` may be a single string or an array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == client_id,
            Audience::Multiple(auds) => auds.iter().any(|a| a == client_id),
        }
    }
}

/// ID token claims consumed by the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub iss: String,
    pub aud: Audience,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Authentication methods used at the issuer
    #[serde(default)]
    pub amr: Vec<String>,
}

/// Encode claims as an unsigned (`alg: none`) token.
///
/// Intended for development issuers and tests.
pub fn unsigned_id_token(claims: &IdTokenClaims) -> Result<String> {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    Ok(format!("{header}.{payload}."))
}

#[derive(Debug, Deserialize)]
struct OidcSettings {
    issuer_url: String,
    client_id: String,
    #[serde(default)]
    clock_skew_seconds: Option<i64>,
    #[serde(flatten)]
    connectivity: ConnectivitySettings,
}

/// OIDC ID token provider
pub struct OidcProvider {
    issuer: String,
    client_id: String,
    clock_skew_seconds: i64,
    probe: BackendProbe,
}

impl OidcProvider {
    pub fn new(issuer_url: &str, client_id: impl Into<String>) -> Result<Self> {
        let issuer = normalize_issuer(issuer_url)?;
        let probe = BackendProbe::new(format!("{issuer}/.well-known/openid-configuration"), true);
        Ok(Self {
            issuer,
            client_id: client_id.into(),
            clock_skew_seconds: DEFAULT_CLOCK_SKEW_SECONDS,
            probe,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let settings: OidcSettings = parse_settings("oidc", config)?;
        let mut provider = Self::new(&settings.issuer_url, settings.client_id)?;
        provider.clock_skew_seconds = settings
            .clock_skew_seconds
            .unwrap_or(DEFAULT_CLOCK_SKEW_SECONDS);
        provider.probe = settings
            .connectivity
            .probe(provider.probe.endpoint().to_string());
        Ok(provider)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn probe(&self) -> &BackendProbe {
        &self.probe
    }

    /// Decode and check an ID token
    pub fn decode_claims(&self, token: &str) -> Result<IdTokenClaims> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(UpidError::token_validation("Invalid JWT format"));
        }

        let payload = general_purpose::URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|e| UpidError::token_validation(format!("Failed to decode payload: {e}")))?;
        let claims: IdTokenClaims = serde_json::from_slice(&payload)
            .map_err(|e| UpidError::token_validation(format!("Failed to parse claims: {e}")))?;

        if claims.iss.trim_end_matches('/') != self.issuer {
            return Err(UpidError::token_validation(format!(
                "Unexpected issuer {}",
                claims.iss
            )));
        }
        if !claims.aud.contains(&self.client_id) {
            return Err(UpidError::token_validation("Audience mismatch"));
        }

        let now = Utc::now().timestamp();
        if claims.exp.saturating_add(self.clock_skew_seconds) <= now {
            return Err(UpidError::token_validation("Token expired"));
        }
        if let Some(nbf) = claims.nbf {
            if nbf > now.saturating_add(self.clock_skew_seconds) {
                return Err(UpidError::token_validation("Token not yet valid"));
            }
        }
        if claims.sub.is_empty() {
            return Err(UpidError::token_validation("Token has no subject"));
        }

        Ok(claims)
    }

    fn principal_for(&self, claims: IdTokenClaims) -> UserPrincipal {
        let mfa = claims
            .amr
            .iter()
            .any(|m| MFA_METHODS.contains(&m.to_ascii_lowercase().as_str()));
        let hardware_key = claims.amr.iter().any(|m| m.eq_ignore_ascii_case("hwk"));

        let mut level = resolve_auth_level(&claims.roles, mfa);
        if hardware_key {
            level = AuthLevel::HardwareToken;
        }

        let display_name = claims
            .name
            .clone()
            .or_else(|| claims.preferred_username.clone())
            .unwrap_or_else(|| claims.sub.clone());

        let mut principal = UserPrincipal::new(&claims.sub, ProviderType::Oidc.as_str())
            .with_email(claims.email.clone().unwrap_or_default())
            .with_display_name(display_name)
            .with_roles(claims.roles.iter().cloned())
            .with_groups(claims.groups.iter().cloned())
            .with_mfa(mfa)
            .with_auth_level(level)
            .with_claim("iss", &claims.iss)
            .with_claim("exp", claims.exp.to_string());
        if let Some(username) = &claims.preferred_username {
            principal = principal.with_claim("preferred_username", username);
        }
        principal.last_login = chrono::DateTime::from_timestamp(claims.iat, 0);
        principal
    }
}

fn normalize_issuer(issuer_url: &str) -> Result<String> {
    let url = Url::parse(issuer_url)
        .map_err(|e| UpidError::configuration(format!("Invalid issuer_url {issuer_url}: {e}")))?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(UpidError::configuration(format!(
            "Unsupported issuer scheme {}",
            url.scheme()
        )));
    }
    Ok(issuer_url.trim_end_matches('/').to_string())
}

#[async_trait]
impl AuthProvider for OidcProvider {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<UserPrincipal>> {
        match credentials.get("id_token") {
            Some(token) => self.validate_token(token).await,
            None => Ok(None),
        }
    }

    async fn validate_token(&self, token: &str) -> Result<Option<UserPrincipal>> {
        match self.decode_claims(token) {
            Ok(claims) => Ok(Some(self.principal_for(claims))),
            Err(UpidError::TokenValidation(reason)) => {
                debug!(issuer = %self.issuer, reason = %reason, "ID token rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_token(&self, _token: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn get_metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new(ProviderType::Oidc, "OpenID Connect")
            .with_description("ID tokens issued by an OpenID Connect provider")
            .with_required_config(&["issuer_url", "client_id"])
            .with_optional_config(&["clock_skew_seconds", "reachable", "latency_ms"])
            .with_features(&[
                ProviderFeature::TokenValidation,
                ProviderFeature::MultiFactor,
                ProviderFeature::GroupMapping,
                ProviderFeature::Federation,
            ])
            .with_security_features(&["issuer_check", "audience_check", "expiry_check"])
    }

    async fn health_check(&self) -> Result<ProviderHealth> {
        Ok(self.probe.health().await)
    }

    async fn test_connection(&self) -> bool {
        self.probe.probe().await.is_ok()
    }
}
