//! Mock implementations for testing
//!
//! `MockProvider` is a mockall double for the provider trait and only exists
//! in unit tests. `StaticProvider` is a hand-rolled provider that accepts one
//! fixed password and can be told to fail or panic; the `test-utils` feature
//! exposes it to downstream tests.

use crate::auth::models::{Credentials, UserPrincipal};
use crate::auth::provider::{AuthProvider, ProviderHealth, ProviderMetadata, ProviderType};
use crate::error::{Result, UpidError};
use async_trait::async_trait;
use std::time::Duration;

#[cfg(test)]
mockall::mock! {
    pub Provider {}

    #[async_trait]
    impl AuthProvider for Provider {
        async fn authenticate(&self, credentials: &Credentials) -> Result<Option<UserPrincipal>>;
        async fn validate_token(&self, token: &str) -> Result<Option<UserPrincipal>>;
        async fn refresh_token(&self, token: &str) -> Result<Option<String>>;
        fn get_metadata(&self) -> ProviderMetadata;
        async fn health_check(&self) -> Result<ProviderHealth>;
        async fn test_connection(&self) -> bool;
    }
}

/// How a [`StaticProvider`] reacts to `authenticate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticBehavior {
    Normal,
    Error,
    Panic,
}

/// Accepts `password == "correct"` for any username
pub struct StaticProvider {
    roles: Vec<String>,
    mfa: bool,
    behavior: StaticBehavior,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self {
            roles: vec!["viewer".to_string()],
            mfa: false,
            behavior: StaticBehavior::Normal,
        }
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_mfa(mut self) -> Self {
        self.mfa = true;
        self
    }

    pub fn with_behavior(mut self, behavior: StaticBehavior) -> Self {
        self.behavior = behavior;
        self
    }
}

impl Default for StaticProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for StaticProvider {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<UserPrincipal>> {
        match self.behavior {
            StaticBehavior::Error => return Err(UpidError::connection("backend down")),
            StaticBehavior::Panic => panic!("provider exploded"),
            StaticBehavior::Normal => {}
        }

        let username = credentials.get("username").cloned().unwrap_or_default();
        if credentials.get("password").map(String::as_str) != Some("correct") {
            return Ok(None);
        }
        Ok(Some(
            UserPrincipal::new(username.clone(), "static")
                .with_email(format!("{username}@example.com"))
                .with_roles(self.roles.iter().cloned())
                .with_mfa(self.mfa)
                .with_auth_level(crate::auth::provider::resolve_auth_level(
                    &self.roles,
                    self.mfa,
                )),
        ))
    }

    async fn validate_token(&self, _token: &str) -> Result<Option<UserPrincipal>> {
        Ok(None)
    }

    async fn refresh_token(&self, _token: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn get_metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new(ProviderType::LocalConfig, "Static test provider")
    }

    async fn health_check(&self) -> Result<ProviderHealth> {
        Ok(ProviderHealth::healthy(Duration::ZERO))
    }

    async fn test_connection(&self) -> bool {
        true
    }
}
