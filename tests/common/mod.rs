//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use upid_auth::auth::providers::local::LocalUser;
use upid_auth::auth::providers::LocalConfigProvider;
use upid_auth::{AuthConfig, AuthRegistry, Credentials, EnterpriseAuthManager};

pub const PASSWORD: &str = "s3cret-pass";

pub fn directory() -> LocalConfigProvider {
    LocalConfigProvider::new(vec![
        LocalUser::with_password("alice", PASSWORD)
            .unwrap()
            .with_email("alice@example.com")
            .with_roles(["admin"]),
        LocalUser::with_password("bob", PASSWORD)
            .unwrap()
            .with_email("bob@example.com")
            .with_roles(["viewer"]),
    ])
}

pub fn password(username: &str, password: &str) -> Credentials {
    Credentials::from([
        ("username".to_string(), username.to_string()),
        ("password".to_string(), password.to_string()),
    ])
}

/// Registry with the `local` provider already registered
pub async fn registry() -> Arc<AuthRegistry> {
    let registry = Arc::new(AuthRegistry::new());
    assert!(registry.register("local", Arc::new(directory()), None).await);
    registry
}

pub async fn manager_with(config: AuthConfig) -> EnterpriseAuthManager {
    EnterpriseAuthManager::new(registry().await, config)
}

pub async fn manager() -> EnterpriseAuthManager {
    manager_with(AuthConfig::default()).await
}
