//! Configuration layering, token store persistence and provider bootstrap

use serial_test::serial;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use upid_auth::auth::providers::hash_secret;
use upid_auth::bootstrap;
use upid_auth::config::{AuthToken, TokenStore};
use upid_auth::{AuthRegistry, EnterpriseAuthManager, UpidConfig, UpidError};

const CONFIG_TEMPLATE: &str = r#"
[auth]
session_timeout_minutes = 90

[logging]
level = "debug"

[[providers]]
name = "local"
type = "local_config"

[[providers.settings.users]]
username = "carol"
password_hash = "CAROL_HASH"
roles = ["developer"]

[[providers]]
name = "ci"
type = "bearer_token"
settings = { tokens = [{ token = "ci-token", user_id = "ci-bot" }] }
"#;

/// Carol's password is "hunter2"
fn config_toml() -> String {
    CONFIG_TEMPLATE.replace("CAROL_HASH", &hash_secret("hunter2").unwrap())
}

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, config_toml()).unwrap();
    path
}

#[test]
#[serial]
fn test_file_then_env_layering() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir);

    temp_env::with_vars(
        [
            ("UPID__AUTH__SESSION_TIMEOUT_MINUTES", Some("15")),
            ("UPID__AUTH__MAX_SESSIONS_PER_USER", None::<&str>),
        ],
        || {
            let config = UpidConfig::load(Some(&path)).unwrap();
            assert_eq!(config.auth.session_timeout_minutes, 15);
            assert_eq!(config.auth.max_sessions_per_user, 5);
            assert_eq!(config.logging.level, "debug");
            assert_eq!(config.providers.len(), 2);
        },
    );
}

#[test]
#[serial]
fn test_invalid_env_value_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir);

    temp_env::with_var("UPID__AUTH__MAX_SESSIONS_PER_USER", Some("0"), || {
        let err = UpidConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, UpidError::Configuration(_)));
    });
}

#[test]
#[serial]
fn test_explicit_path_must_exist() {
    let dir = TempDir::new().unwrap();
    assert!(UpidConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
}

#[tokio::test]
async fn test_bootstrap_from_file_and_login() {
    let config = UpidConfig::from_toml_str(&config_toml()).unwrap();
    let registry = Arc::new(AuthRegistry::new());
    let report = bootstrap::initialize(&registry, &config).await;
    assert!(report.is_clean(), "{:?}", report.failed);
    assert_eq!(registry.list().await, vec!["ci", "local"]);

    let manager = EnterpriseAuthManager::new(registry, config.auth.clone());
    let credentials = upid_auth::Credentials::from([
        ("username".to_string(), "carol".to_string()),
        ("password".to_string(), "hunter2".to_string()),
    ]);
    let session = manager
        .authenticate("local", &credentials, None)
        .await
        .unwrap();
    assert_eq!(
        session.expires_at - session.created_at,
        chrono::Duration::minutes(90)
    );

    let principal = manager.validate_token("ci", "ci-token").await.unwrap();
    assert_eq!(principal.user_id, "ci-bot");
}

#[tokio::test]
async fn test_token_store_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("nested").join("auth.json"));
    assert!(store.load().unwrap().is_none());

    let token = AuthToken {
        user_id: Some("carol".into()),
        provider: Some("local".into()),
        expires_at: Some(chrono::Utc::now() - chrono::Duration::minutes(1)),
        ..AuthToken::new("session-id")
    };
    store.save(&token).await.unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded, token);
    assert!(loaded.is_expired());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    assert!(store.clear().unwrap());
    assert!(store.load().unwrap().is_none());
}
