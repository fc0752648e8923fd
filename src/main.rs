//! UPID authentication CLI
//!
//! Logs in through a configured provider and keeps the resulting session in
//! the local token store.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use upid_auth::auth::audit::AuditEventType;
use upid_auth::auth::provider::HealthStatus;
use upid_auth::auth::providers::hash_secret;
use upid_auth::bootstrap;
use upid_auth::config::{AuthToken, TokenStore};
use upid_auth::logging::{init_logging, LogConfig};
use upid_auth::{
    AuthContext, AuthRegistry, Credentials, EnterpriseAuthManager, Result, UpidConfig, UpidError,
};

#[derive(Parser, Debug)]
#[command(name = "upid-auth")]
#[command(about = "Authenticate against UPID identity providers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (defaults to ~/.upid/config.toml)
    #[arg(short, long, global = true, env = "UPID_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered providers and their capabilities
    Providers,

    /// Probe every provider
    Health,

    /// Log in and store the session
    Login {
        /// Registry name of the provider
        #[arg(short, long, default_value = "local")]
        provider: String,

        #[arg(short, long)]
        username: Option<String>,

        /// Password (prompted when a username is given without one)
        #[arg(long, env = "UPID_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Bearer token, ID token or SAML response
        #[arg(short, long, env = "UPID_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Extra credential fields as key=value
        #[arg(long = "credential", value_parser = parse_key_value)]
        credentials: Vec<(String, String)>,

        /// Device identifier for risk scoring
        #[arg(long)]
        device_id: Option<String>,

        /// Print this run's audit trail as JSON
        #[arg(long)]
        show_audit: bool,
    },

    /// Show the stored session
    Status,

    /// Forget the stored session
    Logout,

    /// List audit event types
    Audit {
        /// Only failure events
        #[arg(long)]
        failures: bool,
    },

    /// Print the Argon2id hash to store as a password_hash or secret_hash
    HashPassword {
        /// Secret to hash (prompted when omitted)
        #[arg(long, env = "UPID_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Write a starter configuration file
    InitConfig {
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = UpidConfig::load(cli.config.as_deref())?;
    let mut log_config = config.logging.clone();
    if cli.debug {
        log_config = LogConfig {
            level: "debug".to_string(),
            ..log_config
        };
    }
    init_logging(&log_config.with_env_overrides())?;

    match cli.command {
        Commands::Providers => {
            let registry = registry_for(&config).await;
            for info in registry.describe().await {
                let m = &info.metadata;
                println!(
                    "{:<16} {:<14} {}",
                    info.name,
                    m.provider_type.as_str(),
                    m.display_name
                );
                if !m.required_config.is_empty() {
                    println!("{:<16} required: {}", "", m.required_config.join(", "));
                }
                let features: Vec<String> = m
                    .supported_features
                    .iter()
                    .map(|f| format!("{f:?}"))
                    .collect();
                println!("{:<16} features: {}", "", features.join(", "));
            }
        }

        Commands::Health => {
            let registry = registry_for(&config).await;
            let report = registry.health_report().await;
            for (name, health) in &report {
                let marker = match health.status {
                    HealthStatus::Healthy => "ok",
                    HealthStatus::Degraded => "slow",
                    HealthStatus::Unhealthy => "down",
                };
                println!(
                    "{name:<16} {marker:<5} {:>5}ms {}",
                    health.response_time_ms,
                    health.error.as_deref().unwrap_or("")
                );
            }
            if report.values().any(|h| h.status == HealthStatus::Unhealthy) {
                std::process::exit(2);
            }
        }

        Commands::Login {
            provider,
            username,
            password,
            token,
            credentials,
            device_id,
            show_audit,
        } => {
            let registry = registry_for(&config).await;
            let manager = EnterpriseAuthManager::new(Arc::clone(&registry), config.auth.clone());

            let creds =
                build_credentials(&provider, &registry, username, password, token, credentials)
                    .await?;
            let mut context = AuthContext::new().with_user_agent(format!(
                "upid-auth/{}",
                env!("CARGO_PKG_VERSION")
            ));
            if let Some(device_id) = device_id {
                context = context.with_device(device_id);
            }

            let session = manager.authenticate(&provider, &creds, Some(&context)).await;

            if show_audit {
                let trail = manager.get_audit_trail(None, None, None).await;
                println!("{}", serde_json::to_string_pretty(&trail)?);
            }

            let Some(session) = session else {
                return Err(UpidError::authentication(format!(
                    "login through '{provider}' failed"
                )));
            };

            let principal = &session.user_principal;
            let token = AuthToken {
                expires_at: Some(session.expires_at),
                scope: Some(principal.roles.join(" ")).filter(|s| !s.is_empty()),
                user_id: Some(principal.user_id.clone()),
                email: Some(principal.email.clone()).filter(|s| !s.is_empty()),
                provider: Some(provider.clone()),
                ..AuthToken::new(session.session_id.clone())
            };
            let store = TokenStore::new(config.token_store_path());
            store.save(&token).await?;

            info!(user_id = %principal.user_id, provider = %provider, "Logged in");
            println!(
                "Logged in as {} ({}) via {}; session expires {}",
                if principal.display_name.is_empty() {
                    &principal.user_id
                } else {
                    &principal.display_name
                },
                principal.auth_level,
                provider,
                session.expires_at.to_rfc3339()
            );
        }

        Commands::Status => {
            let store = TokenStore::new(config.token_store_path());
            match store.load()? {
                Some(token) => {
                    let state = if token.is_expired() { "expired" } else { "active" };
                    println!("user:     {}", token.user_id.as_deref().unwrap_or("-"));
                    println!("email:    {}", token.email.as_deref().unwrap_or("-"));
                    println!("provider: {}", token.provider.as_deref().unwrap_or("-"));
                    println!(
                        "expires:  {}",
                        token
                            .expires_at
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "never".to_string())
                    );
                    println!("state:    {state}");
                }
                None => println!("Not logged in"),
            }
        }

        Commands::Logout => {
            let store = TokenStore::new(config.token_store_path());
            if store.clear()? {
                println!("Logged out");
            } else {
                println!("Not logged in");
            }
        }

        Commands::Audit { failures } => {
            for event in AuditEventType::all() {
                if failures && !event.is_failure() {
                    continue;
                }
                println!("{:<28} {:?}", event.as_str(), event.severity());
            }
        }

        Commands::HashPassword { password } => {
            let secret = match password {
                Some(secret) => secret,
                None => rpassword::prompt_password("Secret to hash: ")?,
            };
            if secret.is_empty() {
                return Err(UpidError::invalid_input("refusing to hash an empty secret"));
            }
            println!("{}", hash_secret(&secret)?);
        }

        Commands::InitConfig { output, force } => {
            let path = output.unwrap_or_else(UpidConfig::default_path);
            if path.exists() && !force {
                return Err(UpidError::invalid_input(format!(
                    "{} already exists, pass --force to overwrite",
                    path.display()
                )));
            }
            let starter = UpidConfig {
                providers: bootstrap::default_providers(),
                ..UpidConfig::default()
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, starter.to_toml_string()?)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

async fn registry_for(config: &UpidConfig) -> Arc<AuthRegistry> {
    let registry = Arc::new(AuthRegistry::new());
    let report = bootstrap::initialize(&registry, config).await;
    for (name, reason) in &report.failed {
        eprintln!("warning: provider '{name}' unavailable: {reason}");
    }
    registry
}

/// Map CLI flags onto the credential keys the provider type expects
async fn build_credentials(
    provider: &str,
    registry: &AuthRegistry,
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    extra: Vec<(String, String)>,
) -> Result<Credentials> {
    use upid_auth::auth::ProviderType;

    let mut creds = Credentials::new();

    if let Some(username) = username {
        let password = match password {
            Some(p) => p,
            None => rpassword::prompt_password(format!("Password for {username}: "))?,
        };
        creds.insert("username".to_string(), username);
        creds.insert("password".to_string(), password);
    }

    if let Some(token) = token {
        let key = match registry.get(provider).await.map(|p| p.get_metadata().provider_type) {
            Some(ProviderType::Oidc) => "id_token",
            Some(ProviderType::Saml) => "saml_response",
            _ => "token",
        };
        creds.insert(key.to_string(), token);
    }

    creds.extend(extra);
    debug!(keys = ?creds.keys().collect::<Vec<_>>(), "Built credentials");
    Ok(creds)
}
