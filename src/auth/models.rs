//! Authentication data models
//!
//! `UserPrincipal` is the provider-agnostic identity produced by an
//! [`AuthProvider`](crate::auth::provider::AuthProvider); `AuthSession` is
//! the server-held record binding a principal snapshot to one session
//! lifetime. Sessions are owned by the manager and handed out as clones.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

/// Provider-specific credential bundle (username/password, token, assertion, key pair)
pub type Credentials = HashMap<String, String>;

/// Strength of the authentication backing a principal.
///
/// Variants are declared weakest first so the derived ordering can be used
/// directly in authorization checks.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthLevel {
    #[default]
    None,
    SingleFactor,
    MultiFactor,
    StepUp,
    HardwareToken,
}

impl AuthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthLevel::None => "NONE",
            AuthLevel::SingleFactor => "SINGLE_FACTOR",
            AuthLevel::MultiFactor => "MULTI_FACTOR",
            AuthLevel::StepUp => "STEP_UP",
            AuthLevel::HardwareToken => "HARDWARE_TOKEN",
        }
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical identity for an authenticated actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPrincipal {
    /// Unique within the issuing provider's namespace
    pub user_id: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub display_name: String,

    /// Role names; duplicates carry no extra meaning
    #[serde(default)]
    pub roles: Vec<String>,

    /// Group names; duplicates carry no extra meaning
    #[serde(default)]
    pub groups: Vec<String>,

    /// Provider-specific attributes
    #[serde(default)]
    pub claims: HashMap<String, String>,

    #[serde(default)]
    pub mfa_authenticated: bool,

    #[serde(default)]
    pub auth_level: AuthLevel,

    /// Identifier of the provider type that produced this principal
    pub provider: String,

    /// Assigned by the manager, never by providers
    #[serde(default)]
    pub risk_score: f64,

    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserPrincipal {
    /// Create a principal with no roles, groups or claims
    pub fn new(user_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: String::new(),
            display_name: String::new(),
            roles: Vec::new(),
            groups: Vec::new(),
            claims: HashMap::new(),
            mfa_authenticated: false,
            auth_level: AuthLevel::None,
            provider: provider.into(),
            risk_score: 0.0,
            last_login: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
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

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(key.into(), value.into());
        self
    }

    pub fn with_mfa(mut self, mfa_authenticated: bool) -> Self {
        self.mfa_authenticated = mfa_authenticated;
        self
    }

    pub fn with_auth_level(mut self, level: AuthLevel) -> Self {
        self.auth_level = level;
        self
    }

    /// Case-sensitive role membership check
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// True when the principal holds at least one of `roles`
    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|r| self.has_role(r.as_ref()))
    }

    /// Roles with duplicates collapsed
    pub fn unique_roles(&self) -> BTreeSet<&str> {
        self.roles.iter().map(String::as_str).collect()
    }

    /// Groups with duplicates collapsed
    pub fn unique_groups(&self) -> BTreeSet<&str> {
        self.groups.iter().map(String::as_str).collect()
    }
}

/// Request context captured alongside an authentication attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// One authenticated session.
///
/// `created_at <= last_activity` always holds, and `expires_at` only ever
/// moves forward after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Opaque UUIDv4 identifier
    pub session_id: String,

    /// Snapshot taken at creation; later changes to the user do not apply
    pub user_principal: UserPrincipal,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,

    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_id: Option<String>,

    pub risk_score: f64,

    /// Session-local markers, supplementary to the manager's audit log
    #[serde(default)]
    pub audit_trail: Vec<String>,

    /// Creation order within the owning manager, breaks `created_at` ties
    #[serde(skip)]
    pub(crate) sequence: u64,
}

impl AuthSession {
    pub(crate) fn new(
        principal: UserPrincipal,
        context: &AuthContext,
        now: DateTime<Utc>,
        timeout: Duration,
        sequence: u64,
    ) -> Self {
        let risk_score = principal.risk_score;
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_principal: principal,
            created_at: now,
            expires_at: now + timeout,
            last_activity: now,
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            device_id: context.device_id.clone(),
            risk_score,
            audit_trail: vec![format!("created:{}", now.to_rfc3339())],
            sequence,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_principal.user_id
    }

    /// A session is valid while `now <= expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Time left before expiry, zero once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    /// Context captured when the session was created
    pub fn context(&self) -> AuthContext {
        AuthContext {
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
            device_id: self.device_id.clone(),
        }
    }

    pub(crate) fn record(&mut self, marker: impl Into<String>) {
        self.audit_trail.push(marker.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_level_ordering() {
        assert!(AuthLevel::None < AuthLevel::SingleFactor);
        assert!(AuthLevel::SingleFactor < AuthLevel::MultiFactor);
        assert!(AuthLevel::MultiFactor < AuthLevel::StepUp);
        assert!(AuthLevel::StepUp < AuthLevel::HardwareToken);
        assert_eq!(
            serde_json::to_string(&AuthLevel::StepUp).unwrap(),
            "\"STEP_UP\""
        );
    }

    #[test]
    fn test_principal_roles_ignore_duplicates() {
        let principal = UserPrincipal::new("alice", "local")
            .with_roles(["viewer", "developer", "viewer"])
            .with_groups(["eng", "eng"]);

        assert_eq!(principal.unique_roles().len(), 2);
        assert_eq!(principal.unique_groups().len(), 1);
        assert!(principal.has_any_role(&["admin", "developer"]));
        assert!(!principal.has_any_role::<&str>(&[]));
    }

    #[test]
    fn test_session_snapshot_and_expiry() {
        let now = Utc::now();
        let mut principal = UserPrincipal::new("bob", "local");
        principal.risk_score = 0.4;
        let context = AuthContext::new().with_ip("10.0.0.7").with_device("laptop-1");

        let session = AuthSession::new(principal.clone(), &context, now, Duration::minutes(30), 1);
        principal.display_name = "Changed later".to_string();

        assert_eq!(session.user_principal.display_name, "");
        assert_eq!(session.expires_at, now + Duration::minutes(30));
        assert_eq!(session.created_at, session.last_activity);
        assert_eq!(session.risk_score, 0.4);
        assert_eq!(session.context(), context);
        assert!(!session.is_expired_at(session.expires_at));
        assert!(session.is_expired_at(session.expires_at + Duration::milliseconds(1)));
        assert_eq!(
            session.remaining_at(now + Duration::hours(1)),
            Duration::zero()
        );
    }
}
