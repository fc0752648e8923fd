//! Cloud IAM providers
//!
//! One implementation covers AWS IAM, GCP service accounts and Azure AD app
//! registrations. Each platform names its key pair differently; the
//! provider maps the platform-specific credential keys onto a configured
//! identity list.

use super::{parse_settings, verify_decoy, verify_secret, BackendProbe, ConnectivitySettings};
use crate::auth::models::{Credentials, UserPrincipal};
use crate::auth::provider::{
    resolve_auth_level, AuthProvider, ProviderConfig, ProviderFeature, ProviderHealth,
    ProviderMetadata, ProviderType,
};
use crate::error::{Result, UpidError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudPlatform {
    Aws,
    Gcp,
    Azure,
}

impl CloudPlatform {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            CloudPlatform::Aws => ProviderType::AwsIam,
            CloudPlatform::Gcp => ProviderType::GcpIam,
            CloudPlatform::Azure => ProviderType::AzureAd,
        }
    }

    /// Credential keys holding the key identifier and the secret
    pub fn credential_keys(&self) -> (&'static str, &'static str) {
        match self {
            CloudPlatform::Aws => ("access_key_id", "secret_access_key"),
            CloudPlatform::Gcp => ("service_account_email", "private_key_id"),
            CloudPlatform::Azure => ("client_id", "client_secret"),
        }
    }

    /// Config key scoping the identities (region, project or tenant)
    pub fn scope_key(&self) -> &'static str {
        match self {
            CloudPlatform::Aws => "region",
            CloudPlatform::Gcp => "project_id",
            CloudPlatform::Azure => "tenant_id",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            CloudPlatform::Aws => "AWS IAM",
            CloudPlatform::Gcp => "Google Cloud IAM",
            CloudPlatform::Azure => "Azure Active Directory",
        }
    }

    fn endpoint(&self, scope: &str) -> String {
        match self {
            CloudPlatform::Aws => format!("https://sts.{scope}.amazonaws.com"),
            CloudPlatform::Gcp => "https://iamcredentials.googleapis.com".to_string(),
            CloudPlatform::Azure => format!("https://login.microsoftonline.com/{scope}"),
        }
    }
}

impl fmt::Display for CloudPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A cloud identity the provider accepts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudIdentity {
    /// Access key id, service account email or client id
    pub key_id: String,
    /// Argon2id PHC string of the secret
    pub secret_hash: String,
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    /// Whether the key is bound to an MFA device or conditional access
    #[serde(default)]
    pub mfa: bool,
}

#[derive(Debug, Deserialize)]
struct CloudSettings {
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    tenant_id: Option<String>,
    identities: Vec<CloudIdentity>,
    #[serde(flatten)]
    connectivity: ConnectivitySettings,
}

pub struct CloudIamProvider {
    platform: CloudPlatform,
    scope: String,
    identities: Vec<CloudIdentity>,
    probe: BackendProbe,
}

impl CloudIamProvider {
    pub fn new(platform: CloudPlatform, scope: impl Into<String>, identities: Vec<CloudIdentity>) -> Self {
        let scope = scope.into();
        Self {
            probe: BackendProbe::new(platform.endpoint(&scope), true),
            platform,
            scope,
            identities,
        }
    }

    pub fn from_config(platform: CloudPlatform, config: &ProviderConfig) -> Result<Self> {
        let settings: CloudSettings =
            parse_settings(platform.provider_type().as_str(), config)?;
        let scope = match platform {
            CloudPlatform::Aws => settings.region,
            CloudPlatform::Gcp => settings.project_id,
            CloudPlatform::Azure => settings.tenant_id,
        }
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            UpidError::configuration(format!(
                "{platform} provider requires {}",
                platform.scope_key()
            ))
        })?;

        let mut provider = Self::new(platform, scope, settings.identities);
        provider.probe = settings
            .connectivity
            .probe(platform.endpoint(&provider.scope));
        Ok(provider)
    }

    pub fn platform(&self) -> CloudPlatform {
        self.platform
    }

    pub fn probe(&self) -> &BackendProbe {
        &self.probe
    }

    fn principal_for(&self, identity: &CloudIdentity) -> UserPrincipal {
        let level = resolve_auth_level(&identity.roles, identity.mfa);
        UserPrincipal::new(&identity.user_id, self.platform.provider_type().as_str())
            .with_email(&identity.email)
            .with_display_name(if identity.display_name.is_empty() {
                &identity.user_id
            } else {
                &identity.display_name
            })
            .with_roles(identity.roles.iter().cloned())
            .with_groups(identity.groups.iter().cloned())
            .with_mfa(identity.mfa)
            .with_auth_level(level)
            .with_claim("platform", self.platform.provider_type().as_str())
            .with_claim(self.platform.scope_key(), &self.scope)
            .with_claim("key_id", &identity.key_id)
    }
}

#[async_trait]
impl AuthProvider for CloudIamProvider {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<UserPrincipal>> {
        let (id_key, secret_key) = self.platform.credential_keys();
        let (Some(key_id), Some(secret)) = (credentials.get(id_key), credentials.get(secret_key))
        else {
            return Ok(None);
        };

        if self.platform == CloudPlatform::Azure {
            if let Some(tenant) = credentials.get("tenant_id") {
                if tenant != &self.scope {
                    debug!(tenant = %tenant, "Azure tenant mismatch");
                    return Ok(None);
                }
            }
        }

        self.probe.probe().await?;

        let matched = match self.identities.iter().find(|i| &i.key_id == key_id) {
            Some(identity) => verify_secret(secret, &identity.secret_hash).then_some(identity),
            None => {
                verify_decoy(secret);
                None
            }
        };
        match matched {
            Some(identity) => Ok(Some(self.principal_for(identity))),
            None => {
                debug!(platform = %self.platform, key_id = %key_id, "Cloud credentials rejected");
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
        let (id_key, secret_key) = self.platform.credential_keys();
        ProviderMetadata::new(self.platform.provider_type(), self.platform.display_name())
            .with_description(format!(
                "{} credentials ({id_key} / {secret_key})",
                self.platform.display_name()
            ))
            .with_required_config(&[self.platform.scope_key(), "identities"])
            .with_optional_config(&["reachable", "latency_ms", "degraded_after_ms"])
            .with_features(&[ProviderFeature::AccessKeys, ProviderFeature::Federation])
            .with_security_features(&["argon2id_secret_hashes", "scoped_identities"])
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
    use crate::auth::providers::hash_secret;
    use serde_json::json;

    fn identity(key_id: &str, secret: &str, user: &str) -> CloudIdentity {
        CloudIdentity {
            key_id: key_id.into(),
            secret_hash: hash_secret(secret).unwrap(),
            user_id: user.into(),
            email: String::new(),
            display_name: String::new(),
            roles: vec!["viewer".into()],
            groups: vec![],
            mfa: false,
        }
    }

    #[tokio::test]
    async fn test_aws_access_keys() {
        let provider = CloudIamProvider::new(
            CloudPlatform::Aws,
            "us-east-1",
            vec![identity("AKIAEXAMPLE", "wJalr", "arn:aws:iam::123:user/ci")],
        );

        let creds = Credentials::from([
            ("access_key_id".to_string(), "AKIAEXAMPLE".to_string()),
            ("secret_access_key".to_string(), "wJalr".to_string()),
        ]);
        let principal = provider.authenticate(&creds).await.unwrap().unwrap();
        assert_eq!(principal.provider, "aws_iam");
        assert_eq!(principal.claims.get("region").unwrap(), "us-east-1");
        assert_eq!(principal.auth_level, AuthLevel::SingleFactor);

        let bad = Credentials::from([
            ("access_key_id".to_string(), "AKIAEXAMPLE".to_string()),
            ("secret_access_key".to_string(), "nope".to_string()),
        ]);
        assert!(provider.authenticate(&bad).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_azure_tenant_must_match() {
        let mut id = identity("app-1", "s3cr3t", "svc-app");
        id.mfa = true;
        let provider = CloudIamProvider::new(CloudPlatform::Azure, "tenant-a", vec![id]);

        let mut creds = Credentials::from([
            ("client_id".to_string(), "app-1".to_string()),
            ("client_secret".to_string(), "s3cr3t".to_string()),
            ("tenant_id".to_string(), "tenant-b".to_string()),
        ]);
        assert!(provider.authenticate(&creds).await.unwrap().is_none());

        creds.insert("tenant_id".into(), "tenant-a".into());
        let principal = provider.authenticate(&creds).await.unwrap().unwrap();
        assert_eq!(principal.auth_level, AuthLevel::MultiFactor);
    }

    #[test]
    fn test_scope_is_required() {
        let config = ProviderConfig::from([("identities".to_string(), json!([]))]);
        assert!(CloudIamProvider::from_config(CloudPlatform::Gcp, &config).is_err());

        let config = ProviderConfig::from([
            ("identities".to_string(), json!([])),
            ("project_id".to_string(), json!("upid-prod")),
        ]);
        let provider = CloudIamProvider::from_config(CloudPlatform::Gcp, &config).unwrap();
        let metadata = provider.get_metadata();
        assert_eq!(metadata.provider_type, ProviderType::GcpIam);
        assert_eq!(metadata.required_config, vec!["project_id", "identities"]);
    }
}
