//! Bearer token provider
//!
//! Opaque tokens mapped to identities. Tokens can be pre-issued through
//! configuration or minted at runtime with [`BearerTokenProvider::issue_token`];
//! refreshing rotates the token and retires the old one.

use super::{parse_settings, BackendProbe, ConnectivitySettings};
use crate::auth::models::{Credentials, UserPrincipal};
use crate::auth::provider::{
    resolve_auth_level, AuthProvider, ProviderConfig, ProviderFeature, ProviderHealth,
    ProviderMetadata, ProviderType,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;

/// Identity bound to a bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub mfa: bool,
    /// `None` means the token never expires
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenGrant {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: String::new(),
            display_name: String::new(),
            roles: Vec::new(),
            groups: Vec::new(),
            mfa: false,
            expires_at: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |exp| now > exp)
    }
}

#[derive(Debug, Deserialize)]
struct PreIssuedToken {
    token: String,
    #[serde(flatten)]
    grant: TokenGrant,
}

#[derive(Debug, Deserialize)]
struct TokenSettings {
    tokens: Vec<PreIssuedToken>,
    #[serde(default)]
    token_ttl_minutes: Option<i64>,
    #[serde(flatten)]
    connectivity: ConnectivitySettings,
}

/// Provider for opaque bearer tokens
pub struct BearerTokenProvider {
    tokens: RwLock<HashMap<String, TokenGrant>>,
    token_ttl: Duration,
    probe: BackendProbe,
}

impl BearerTokenProvider {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            token_ttl: Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES),
            probe: BackendProbe::new("token-store", true),
        }
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Add a token with a caller-chosen value
    pub fn with_token(mut self, token: impl Into<String>, grant: TokenGrant) -> Self {
        self.tokens.get_mut().insert(token.into(), grant);
        self
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let settings: TokenSettings = parse_settings("bearer_token", config)?;
        let tokens = settings
            .tokens
            .into_iter()
            .map(|t| (t.token, t.grant))
            .collect();
        Ok(Self {
            tokens: RwLock::new(tokens),
            token_ttl: Duration::minutes(
                settings.token_ttl_minutes.unwrap_or(DEFAULT_TOKEN_TTL_MINUTES),
            ),
            probe: settings.connectivity.probe("token-store"),
        })
    }

    pub fn probe(&self) -> &BackendProbe {
        &self.probe
    }

    /// Mint a new random token for `grant`
    pub async fn issue_token(&self, grant: TokenGrant) -> String {
        let token = generate_token();
        self.tokens.write().await.insert(token.clone(), grant);
        debug!("Issued bearer token");
        token
    }

    /// Revoke a token, returning whether it existed
    pub async fn revoke_token(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }

    fn principal_for(grant: &TokenGrant) -> UserPrincipal {
        let level = resolve_auth_level(&grant.roles, grant.mfa);
        UserPrincipal::new(&grant.user_id, ProviderType::BearerToken.as_str())
            .with_email(&grant.email)
            .with_display_name(&grant.display_name)
            .with_roles(grant.roles.iter().cloned())
            .with_groups(grant.groups.iter().cloned())
            .with_mfa(grant.mfa)
            .with_auth_level(level)
    }
}

impl Default for BearerTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("upid_{}", hex::encode(bytes))
}

#[async_trait]
impl AuthProvider for BearerTokenProvider {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<UserPrincipal>> {
        match credentials.get("token") {
            Some(token) => self.validate_token(token).await,
            None => Ok(None),
        }
    }

    async fn validate_token(&self, token: &str) -> Result<Option<UserPrincipal>> {
        let tokens = self.tokens.read().await;
        match tokens.get(token) {
            Some(grant) if !grant.is_expired_at(Utc::now()) => {
                Ok(Some(Self::principal_for(grant)))
            }
            Some(_) => {
                debug!("Bearer token expired");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Rotate a live token. Expired or unknown tokens are left untouched.
    async fn refresh_token(&self, token: &str) -> Result<Option<String>> {
        let now = Utc::now();
        let mut tokens = self.tokens.write().await;
        match tokens.get(token) {
            Some(grant) if !grant.is_expired_at(now) => {}
            Some(_) => {
                debug!("Refusing to rotate an expired bearer token");
                return Ok(None);
            }
            None => return Ok(None),
        }
        let Some(mut grant) = tokens.remove(token) else {
            return Ok(None);
        };
        if grant.expires_at.is_some() {
            grant.expires_at = Some(now + self.token_ttl);
        }

        let renewed = generate_token();
        info!(user_id = %grant.user_id, "Rotated bearer token");
        tokens.insert(renewed.clone(), grant);
        Ok(Some(renewed))
    }

    fn get_metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new(ProviderType::BearerToken, "Bearer token")
            .with_description("Opaque bearer tokens mapped to identities")
            .with_required_config(&["tokens"])
            .with_optional_config(&["token_ttl_minutes", "reachable", "latency_ms"])
            .with_features(&[ProviderFeature::TokenValidation, ProviderFeature::TokenRefresh])
            .with_security_features(&["token_rotation", "token_expiry"])
    }

    async fn health_check(&self) -> Result<ProviderHealth> {
        Ok(self.probe.health().await)
    }

    async fn test_connection(&self) -> bool {
        self.probe.probe().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::AuthLevel;
    use serde_json::json;

    #[tokio::test]
    async fn test_issue_validate_and_revoke() {
        let provider = BearerTokenProvider::new();
        let token = provider
            .issue_token(TokenGrant::new("dev-1").with_roles(["developer"]))
            .await;

        let principal = provider.validate_token(&token).await.unwrap().unwrap();
        assert_eq!(principal.user_id, "dev-1");
        assert_eq!(principal.auth_level, AuthLevel::MultiFactor);

        let creds = Credentials::from([("token".to_string(), token.clone())]);
        assert!(provider.authenticate(&creds).await.unwrap().is_some());

        assert!(provider.revoke_token(&token).await);
        assert!(provider.validate_token(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let provider = BearerTokenProvider::new().with_token(
            "stale",
            TokenGrant::new("old").expiring_at(Utc::now() - Duration::minutes(1)),
        );
        assert!(provider.validate_token("stale").await.unwrap().is_none());
        assert!(provider.refresh_token("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let provider = BearerTokenProvider::new().with_token(
            "t-1",
            TokenGrant::new("ops").expiring_at(Utc::now() + Duration::minutes(5)),
        );

        let renewed = provider.refresh_token("t-1").await.unwrap().unwrap();
        assert_ne!(renewed, "t-1");
        assert!(renewed.starts_with("upid_"));
        assert!(provider.validate_token("t-1").await.unwrap().is_none());
        assert_eq!(
            provider.validate_token(&renewed).await.unwrap().unwrap().user_id,
            "ops"
        );
        assert!(provider.refresh_token("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_leaves_expired_token_in_place() {
        let provider = BearerTokenProvider::new().with_token(
            "stale",
            TokenGrant::new("ops").expiring_at(Utc::now() - Duration::minutes(1)),
        );

        assert!(provider.refresh_token("stale").await.unwrap().is_none());
        // Still stored, so an explicit revoke finds it
        assert!(provider.revoke_token("stale").await);
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = ProviderConfig::from([(
            "tokens".to_string(),
            json!([{ "token": "ci-token", "user_id": "ci-bot", "roles": ["operator"] }]),
        )]);
        let provider = BearerTokenProvider::from_config(&config).unwrap();
        let principal = provider.validate_token("ci-token").await.unwrap().unwrap();
        assert_eq!(principal.user_id, "ci-bot");
        assert!(provider.test_connection().await);
    }
}
