//! Local configuration provider
//!
//! Users are declared in configuration with Argon2id password hashes in
//! PHC string form, as printed by `upid-auth hash-password`.

use super::{
    hash_secret, parse_settings, verify_decoy, verify_secret, BackendProbe,
    ConnectivitySettings,
};
use crate::auth::models::{Credentials, UserPrincipal};
use crate::auth::provider::{
    resolve_auth_level, AuthProvider, ProviderConfig, ProviderFeature, ProviderHealth,
    ProviderMetadata, ProviderType,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A user entry in the local configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUser {
    pub username: String,
    /// Argon2id PHC string
    pub password_hash: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl LocalUser {
    /// Build an entry from a plaintext password, storing only its hash
    pub fn with_password(username: impl Into<String>, password: &str) -> Result<Self> {
        Ok(Self {
            username: username.into(),
            password_hash: hash_secret(password)?,
            email: String::new(),
            display_name: String::new(),
            roles: Vec::new(),
            groups: Vec::new(),
        })
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
}

#[derive(Debug, Deserialize)]
struct LocalSettings {
    users: Vec<LocalUser>,
    #[serde(flatten)]
    connectivity: ConnectivitySettings,
}

/// Username/password provider backed by configuration
pub struct LocalConfigProvider {
    users: HashMap<String, LocalUser>,
    probe: BackendProbe,
}

impl LocalConfigProvider {
    pub fn new(users: Vec<LocalUser>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.username.clone(), u))
                .collect(),
            probe: BackendProbe::new("local-config", true),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let settings: LocalSettings = parse_settings("local_config", config)?;
        let mut provider = Self::new(settings.users);
        provider.probe = settings.connectivity.probe("local-config");
        Ok(provider)
    }

    pub fn probe(&self) -> &BackendProbe {
        &self.probe
    }

    fn principal_for(&self, user: &LocalUser) -> UserPrincipal {
        let now = Utc::now();
        let level = resolve_auth_level(&user.roles, false);
        let mut principal = UserPrincipal::new(&user.username, ProviderType::LocalConfig.as_str())
            .with_email(&user.email)
            .with_display_name(if user.display_name.is_empty() {
                &user.username
            } else {
                &user.display_name
            })
            .with_roles(user.roles.iter().cloned())
            .with_groups(user.groups.iter().cloned())
            .with_auth_level(level);
        principal.updated_at = Some(now);
        principal
    }
}

#[async_trait]
impl AuthProvider for LocalConfigProvider {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<UserPrincipal>> {
        let (Some(username), Some(password)) =
            (credentials.get("username"), credentials.get("password"))
        else {
            debug!("Local authentication missing username or password");
            return Ok(None);
        };

        let verified = match self.users.get(username) {
            Some(user) => verify_secret(password, &user.password_hash).then_some(user),
            None => {
                verify_decoy(password);
                None
            }
        };
        match verified {
            Some(user) => Ok(Some(self.principal_for(user))),
            None => {
                debug!(username = %username, "Local authentication rejected");
                Ok(None)
            }
        }
    }

    async fn validate_token(&self, _token: &str) -> Result<Option<UserPrincipal>> {
        Ok(None)
    }

    async fn refresh_token(&self, _token: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn get_metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new(ProviderType::LocalConfig, "Local configuration")
            .with_description("Users and password hashes declared in configuration")
            .with_required_config(&["users"])
            .with_optional_config(&["reachable", "latency_ms", "degraded_after_ms"])
            .with_features(&[ProviderFeature::PasswordAuth])
            .with_security_features(&["argon2id_password_hashes"])
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

    fn creds(username: &str, password: &str) -> Credentials {
        Credentials::from([
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ])
    }

    #[tokio::test]
    async fn test_local_authentication() {
        let provider = LocalConfigProvider::new(vec![
            LocalUser::with_password("alice", "s3cret").unwrap().with_roles(["admin"]),
            LocalUser::with_password("bob", "pa55").unwrap().with_roles(["viewer"]),
        ]);

        let alice = provider
            .authenticate(&creds("alice", "s3cret"))
            .await
            .unwrap()
            .expect("valid credentials");
        assert_eq!(alice.user_id, "alice");
        assert_eq!(alice.provider, "local_config");
        assert_eq!(alice.auth_level, AuthLevel::StepUp);
        assert_eq!(alice.display_name, "alice");

        let bob = provider.authenticate(&creds("bob", "pa55")).await.unwrap().unwrap();
        assert_eq!(bob.auth_level, AuthLevel::SingleFactor);

        assert!(provider.authenticate(&creds("alice", "wrong")).await.unwrap().is_none());
        assert!(provider.authenticate(&creds("nobody", "x")).await.unwrap().is_none());
        assert!(provider.authenticate(&Credentials::new()).await.unwrap().is_none());
        assert!(provider.validate_token("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = ProviderConfig::from([
            (
                "users".to_string(),
                json!([{ "username": "carol", "password_hash": hash_secret("pw").unwrap(), "roles": ["developer"] }]),
            ),
            ("reachable".to_string(), json!(false)),
        ]);
        let provider = LocalConfigProvider::from_config(&config).unwrap();

        assert!(!provider.test_connection().await);
        let carol = provider.authenticate(&creds("carol", "pw")).await.unwrap().unwrap();
        assert_eq!(carol.auth_level, AuthLevel::MultiFactor);
    }

    #[test]
    fn test_from_config_requires_users() {
        assert!(LocalConfigProvider::from_config(&ProviderConfig::new()).is_err());
    }
}
