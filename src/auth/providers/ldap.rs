//! LDAP directory provider
//!
//! Binds a user against a configured directory and maps directory groups
//! onto roles.

use super::{parse_settings, verify_decoy, verify_secret, BackendProbe, ConnectivitySettings};
use crate::auth::models::{Credentials, UserPrincipal};
use crate::auth::provider::{
    resolve_auth_level, AuthProvider, ProviderConfig, ProviderFeature, ProviderHealth,
    ProviderMetadata, ProviderType,
};
use crate::error::{Result, UpidError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};
use url::Url;

/// A directory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub uid: String,
    /// Argon2id PHC string of the bind password
    pub password_hash: String,
    #[serde(default)]
    pub mail: String,
    #[serde(default)]
    pub cn: String,
    /// Group common names the entry belongs to
    #[serde(default)]
    pub member_of: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LdapSettings {
    server_url: String,
    base_dn: String,
    #[serde(default)]
    bind_dn: Option<String>,
    #[serde(default)]
    directory: Vec<DirectoryEntry>,
    #[serde(default)]
    group_role_mapping: HashMap<String, Vec<String>>,
    #[serde(flatten)]
    connectivity: ConnectivitySettings,
}

/// Directory-backed username/password provider
pub struct LdapProvider {
    server_url: String,
    base_dn: String,
    bind_dn: Option<String>,
    entries: HashMap<String, DirectoryEntry>,
    group_role_mapping: HashMap<String, Vec<String>>,
    probe: BackendProbe,
}

impl LdapProvider {
    pub fn new(server_url: &str, base_dn: impl Into<String>) -> Result<Self> {
        let url = Url::parse(server_url)
            .map_err(|e| UpidError::configuration(format!("Invalid server_url {server_url}: {e}")))?;
        if !matches!(url.scheme(), "ldap" | "ldaps") {
            return Err(UpidError::configuration(format!(
                "LDAP server_url must use ldap:// or ldaps://, got {}",
                url.scheme()
            )));
        }
        if url.scheme() == "ldap" {
            warn!(server = %server_url, "LDAP connection is not using TLS");
        }

        Ok(Self {
            server_url: server_url.to_string(),
            base_dn: base_dn.into(),
            bind_dn: None,
            entries: HashMap::new(),
            group_role_mapping: HashMap::new(),
            probe: BackendProbe::new(server_url, true),
        })
    }

    pub fn with_entry(mut self, entry: DirectoryEntry) -> Self {
        self.entries.insert(entry.uid.clone(), entry);
        self
    }

    pub fn with_group_roles<I, S>(mut self, group: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_role_mapping
            .insert(group.into(), roles.into_iter().map(Into::into).collect());
        self
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let settings: LdapSettings = parse_settings("ldap", config)?;
        let mut provider = Self::new(&settings.server_url, settings.base_dn)?;
        provider.bind_dn = settings.bind_dn;
        provider.group_role_mapping = settings.group_role_mapping;
        provider.entries = settings
            .directory
            .into_iter()
            .map(|e| (e.uid.clone(), e))
            .collect();
        provider.probe = settings.connectivity.probe(settings.server_url);
        Ok(provider)
    }

    pub fn probe(&self) -> &BackendProbe {
        &self.probe
    }

    pub fn user_dn(&self, uid: &str) -> String {
        format!("uid={uid},{}", self.base_dn)
    }

    /// Roles granted through group membership, plus the group names
    /// themselves when no mapping exists for them
    fn roles_for(&self, groups: &[String]) -> Vec<String> {
        let mut roles = BTreeSet::new();
        for group in groups {
            match self.group_role_mapping.get(group) {
                Some(mapped) => roles.extend(mapped.iter().cloned()),
                None => {
                    roles.insert(group.to_ascii_lowercase());
                }
            }
        }
        roles.into_iter().collect()
    }

    fn principal_for(&self, entry: &DirectoryEntry) -> UserPrincipal {
        let roles = self.roles_for(&entry.member_of);
        let level = resolve_auth_level(&roles, false);
        let mut principal = UserPrincipal::new(&entry.uid, ProviderType::Ldap.as_str())
            .with_email(&entry.mail)
            .with_display_name(if entry.cn.is_empty() { &entry.uid } else { &entry.cn })
            .with_roles(roles)
            .with_groups(entry.member_of.iter().cloned())
            .with_auth_level(level)
            .with_claim("dn", self.user_dn(&entry.uid))
            .with_claim("server", &self.server_url);
        if let Some(bind_dn) = &self.bind_dn {
            principal = principal.with_claim("bind_dn", bind_dn);
        }
        principal
    }
}

#[async_trait]
impl AuthProvider for LdapProvider {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<UserPrincipal>> {
        let (Some(username), Some(password)) =
            (credentials.get("username"), credentials.get("password"))
        else {
            return Ok(None);
        };
        // Anonymous binds succeed on most servers and must not count as login
        if password.is_empty() {
            debug!(username = %username, "Rejecting empty LDAP password");
            return Ok(None);
        }

        self.probe.probe().await?;

        let bound = match self.entries.get(username) {
            Some(entry) => verify_secret(password, &entry.password_hash).then_some(entry),
            None => {
                verify_decoy(password);
                None
            }
        };
        match bound {
            Some(entry) => {
                debug!(dn = %self.user_dn(username), "LDAP bind succeeded");
                Ok(Some(self.principal_for(entry)))
            }
            None => {
                debug!(username = %username, "LDAP bind rejected");
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
        ProviderMetadata::new(ProviderType::Ldap, "LDAP directory")
            .with_description("Simple bind against an LDAP or Active Directory server")
            .with_required_config(&["server_url", "base_dn"])
            .with_optional_config(&[
                "bind_dn",
                "directory",
                "group_role_mapping",
                "reachable",
                "latency_ms",
            ])
            .with_features(&[ProviderFeature::PasswordAuth, ProviderFeature::GroupMapping])
            .with_security_features(&["ldaps", "empty_password_rejection"])
    }

    async fn health_check(&self) -> Result<ProviderHealth> {
        Ok(self.probe.health().await)
    }

    async fn test_connection(&self) -> bool {
        self.probe.probe().await.is_ok()
    }
}
