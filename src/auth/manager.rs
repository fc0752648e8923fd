//! Enterprise authentication manager
//!
//! Coordinates provider authentication with session bookkeeping, risk
//! scoring and the audit trail. Public operations never return errors for
//! expected failures (bad credentials, unknown provider, expired session);
//! they return `None`/`false` and leave an audit entry behind.
//!
//! Session lifecycle: created by [`EnterpriseAuthManager::authenticate`],
//! touched by validation, extended by refresh, and removed by logout,
//! eviction past the per-user cap, or expiry. A removed session id is never
//! valid again.

use crate::auth::audit::{AuditEntry, AuditEventType, AuditFilter, AuditLog};
use crate::auth::models::{AuthContext, AuthSession, Credentials, UserPrincipal};
use crate::auth::registry::AuthRegistry;
use crate::auth::risk;
use crate::auth::AuthConfig;
use crate::logging::redact_credentials;
use chrono::{DateTime, Local, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Point-in-time counters for the manager
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthStats {
    pub active_sessions: usize,
    pub distinct_users: usize,
    pub audit_entries: usize,
    pub failed_attempts: usize,
    pub registered_providers: usize,
}

enum Lookup<R> {
    Missing,
    Expired(AuthSession),
    Live(R),
}

/// The authentication orchestrator
pub struct EnterpriseAuthManager {
    registry: Arc<AuthRegistry>,
    config: AuthConfig,
    sessions: RwLock<HashMap<String, AuthSession>>,
    audit: AuditLog,
    /// Creation counter, orders sessions created within the same instant
    sequence: AtomicU64,
}

impl EnterpriseAuthManager {
    pub fn new(registry: Arc<AuthRegistry>, config: AuthConfig) -> Self {
        Self {
            registry,
            config,
            sessions: RwLock::new(HashMap::new()),
            audit: AuditLog::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(registry: Arc<AuthRegistry>) -> Self {
        Self::new(registry, AuthConfig::default())
    }

    pub fn registry(&self) -> &Arc<AuthRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Authenticate through the named provider and open a session.
    ///
    /// Returns `None` for an unknown provider, rejected credentials, or a
    /// provider that failed or panicked. Each outcome is audited.
    pub async fn authenticate(
        &self,
        provider_name: &str,
        credentials: &Credentials,
        context: Option<&AuthContext>,
    ) -> Option<AuthSession> {
        let context = context.cloned().unwrap_or_default();

        let Some(provider) = self.registry.get(provider_name).await else {
            warn!(provider = %provider_name, "Authentication against unknown provider");
            self.audit
                .record(
                    AuditEventType::AuthenticationFailed,
                    json!({
                        "provider": provider_name,
                        "reason": "provider_not_found",
                        "ip_address": context.ip_address,
                    }),
                )
                .await;
            return None;
        };

        debug!(
            provider = %provider_name,
            credentials = ?redact_credentials(credentials),
            "Authenticating"
        );
        let outcome = AssertUnwindSafe(provider.authenticate(credentials))
            .catch_unwind()
            .await;

        let mut principal = match outcome {
            Ok(Ok(Some(principal))) => principal,
            Ok(Ok(None)) => {
                debug!(provider = %provider_name, "Credentials rejected");
                self.audit_invalid_credentials(provider_name, &context, None)
                    .await;
                return None;
            }
            Ok(Err(e)) if e.is_auth_error() => {
                debug!(provider = %provider_name, error = %e, "Credentials rejected");
                self.audit_invalid_credentials(provider_name, &context, Some(e.to_string()))
                    .await;
                return None;
            }
            Ok(Err(e)) => {
                error!(provider = %provider_name, error = %e, "Provider failed during authentication");
                self.audit_error(provider_name, e.to_string()).await;
                return None;
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(provider = %provider_name, panic = %message, "Provider panicked during authentication");
                self.audit_error(provider_name, format!("provider panicked: {message}"))
                    .await;
                return None;
            }
        };

        if principal.user_id.trim().is_empty() {
            error!(provider = %provider_name, "Provider returned a principal without user id");
            self.audit_error(provider_name, "principal has no user_id".to_string())
                .await;
            return None;
        }

        let now = Utc::now();
        principal.risk_score =
            risk::assess_risk_at(&principal, Some(&context), now.with_timezone(&Local).time());
        principal.last_login = Some(now);

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let (session, evicted) = {
            let mut sessions = self.sessions.write().await;
            let evicted = evict_oldest(
                &mut sessions,
                &principal.user_id,
                self.config.max_sessions_per_user,
            );
            let session = AuthSession::new(
                principal,
                &context,
                now,
                self.config.session_timeout(),
                sequence,
            );
            sessions.insert(session.session_id.clone(), session.clone());
            (session, evicted)
        };

        for old in &evicted {
            info!(user_id = %old.user_id(), session_id = %old.session_id, "Evicted oldest session");
            self.audit
                .record(
                    AuditEventType::SessionEvicted,
                    json!({
                        "session_id": old.session_id,
                        "user_id": old.user_id(),
                        "reason": "max_sessions_exceeded",
                        "max_sessions_per_user": self.config.max_sessions_per_user,
                    }),
                )
                .await;
        }

        info!(
            user_id = %session.user_id(),
            session_id = %session.session_id,
            provider = %provider_name,
            risk_score = session.risk_score,
            "Authentication successful"
        );
        self.audit
            .record(
                AuditEventType::AuthenticationSuccess,
                json!({
                    "provider": provider_name,
                    "user_id": session.user_id(),
                    "session_id": session.session_id,
                    "auth_level": session.user_principal.auth_level.as_str(),
                    "mfa_authenticated": session.user_principal.mfa_authenticated,
                    "risk_score": session.risk_score,
                    "ip_address": session.ip_address,
                }),
            )
            .await;

        Some(session)
    }

    /// Look up a live session and mark activity on it
    pub async fn validate_session(&self, session_id: &str) -> Option<AuthSession> {
        let now = Utc::now();
        self.with_live_session(session_id, now, |session| session.clone())
            .await
    }

    /// Extend a live session by one timeout.
    ///
    /// The extension starts from the current expiry when it is still ahead of
    /// `now`, so a refresh never shortens a session.
    pub async fn refresh_session(&self, session_id: &str) -> Option<AuthSession> {
        let now = Utc::now();
        let timeout = self.config.session_timeout();

        let session = self
            .with_live_session(session_id, now, |session| {
                let base = if session.expires_at > now {
                    session.expires_at
                } else {
                    now
                };
                session.expires_at = base + timeout;
                session.record(format!("refreshed:{}", now.to_rfc3339()));
                session.clone()
            })
            .await?;

        debug!(session_id = %session_id, expires_at = %session.expires_at, "Session refreshed");
        self.audit
            .record(
                AuditEventType::SessionRefreshed,
                json!({
                    "session_id": session.session_id,
                    "user_id": session.user_id(),
                    "expires_at": session.expires_at.to_rfc3339(),
                }),
            )
            .await;
        Some(session)
    }

    /// Remove a session, returning whether it existed
    pub async fn logout(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(session) => {
                info!(user_id = %session.user_id(), session_id = %session_id, "Session logged out");
                self.audit
                    .record(
                        AuditEventType::Logout,
                        json!({
                            "session_id": session.session_id,
                            "user_id": session.user_id(),
                        }),
                    )
                    .await;
                true
            }
            None => {
                debug!(session_id = %session_id, "Logout of unknown session");
                false
            }
        }
    }

    /// Terminate every session of a user, returning how many were removed
    pub async fn logout_user(&self, user_id: &str) -> usize {
        let removed: Vec<AuthSession> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions
                .values()
                .filter(|s| s.user_id() == user_id)
                .map(|s| s.session_id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &removed {
            self.audit
                .record(
                    AuditEventType::Logout,
                    json!({
                        "session_id": session.session_id,
                        "user_id": user_id,
                        "scope": "all_sessions",
                    }),
                )
                .await;
        }
        if !removed.is_empty() {
            info!(user_id = %user_id, count = removed.len(), "Logged out all sessions");
        }
        removed.len()
    }

    /// Risk score for a principal at the current local time
    pub fn assess_risk(&self, principal: &UserPrincipal, context: Option<&AuthContext>) -> f64 {
        risk::assess_risk(principal, context)
    }

    /// Remove every expired session, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<AuthSession> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions
                .values()
                .filter(|s| s.is_expired_at(now))
                .map(|s| s.session_id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            self.audit_expired(session, "cleanup").await;
        }
        if !expired.is_empty() {
            info!("Cleaned up {} expired sessions", expired.len());
        }
        expired.len()
    }

    /// Audit entries within inclusive bounds and of the given types, in insertion order
    pub async fn get_audit_trail(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        event_types: Option<&[AuditEventType]>,
    ) -> Vec<AuditEntry> {
        let filter = AuditFilter {
            start,
            end,
            event_types: event_types.map(<[AuditEventType]>::to_vec),
        };
        self.audit.query(&filter).await
    }

    /// Stateless token check against a named provider
    pub async fn validate_token(&self, provider_name: &str, token: &str) -> Option<UserPrincipal> {
        let Some(provider) = self.registry.get(provider_name).await else {
            self.audit_token_failure(provider_name, "provider_not_found")
                .await;
            return None;
        };

        match AssertUnwindSafe(provider.validate_token(token))
            .catch_unwind()
            .await
        {
            Ok(Ok(Some(principal))) => Some(principal),
            Ok(Ok(None)) => {
                self.audit_token_failure(provider_name, "invalid_token").await;
                None
            }
            Ok(Err(e)) => {
                warn!(provider = %provider_name, error = %e, "Token validation failed");
                self.audit_token_failure(provider_name, &e.to_string()).await;
                None
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(provider = %provider_name, panic = %message, "Provider panicked during token validation");
                self.audit_token_failure(provider_name, &format!("provider panicked: {message}"))
                    .await;
                None
            }
        }
    }

    /// Live sessions of a user, oldest first
    pub async fn user_sessions(&self, user_id: &str) -> Vec<AuthSession> {
        let now = Utc::now();
        let mut sessions: Vec<AuthSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id() == user_id && !s.is_expired_at(now))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.created_at, s.sequence));
        sessions
    }

    pub async fn active_session_count(&self) -> usize {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| !s.is_expired_at(now))
            .count()
    }

    pub async fn stats(&self) -> AuthStats {
        let now = Utc::now();
        let (active_sessions, distinct_users) = {
            let sessions = self.sessions.read().await;
            let live: Vec<&AuthSession> =
                sessions.values().filter(|s| !s.is_expired_at(now)).collect();
            let users: HashSet<&str> = live.iter().map(|s| s.user_id()).collect();
            (live.len(), users.len())
        };
        let entries = self.audit.query(&AuditFilter::default()).await;

        AuthStats {
            active_sessions,
            distinct_users,
            audit_entries: entries.len(),
            failed_attempts: entries
                .iter()
                .filter(|e| {
                    matches!(
                        e.event_type,
                        AuditEventType::AuthenticationFailed | AuditEventType::AuthenticationError
                    )
                })
                .count(),
            registered_providers: self.registry.len().await,
        }
    }

    /// Run `f` against a live session after touching it.
    ///
    /// Missing and expired sessions are audited; expired ones are removed.
    async fn with_live_session<R>(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut AuthSession) -> R,
    ) -> Option<R> {
        let recompute_after = self.config.risk_recompute_after();

        let lookup = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(session_id).map(|s| s.is_expired_at(now)) {
                None => Lookup::Missing,
                Some(true) => match sessions.remove(session_id) {
                    Some(session) => Lookup::Expired(session),
                    None => Lookup::Missing,
                },
                Some(false) => match sessions.get_mut(session_id) {
                    Some(session) => {
                        session.last_activity = now;
                        if session.age_at(now) > recompute_after {
                            let context = session.context();
                            session.risk_score = risk::assess_risk_at(
                                &session.user_principal,
                                Some(&context),
                                now.with_timezone(&Local).time(),
                            );
                            session.user_principal.risk_score = session.risk_score;
                        }
                        Lookup::Live(f(session))
                    }
                    None => Lookup::Missing,
                },
            }
        };

        match lookup {
            Lookup::Live(result) => Some(result),
            Lookup::Missing => {
                debug!(session_id = %session_id, "Unknown session");
                self.audit
                    .record(
                        AuditEventType::SessionValidationFailed,
                        json!({ "session_id": session_id, "reason": "not_found" }),
                    )
                    .await;
                None
            }
            Lookup::Expired(session) => {
                self.audit_expired(&session, "validation").await;
                None
            }
        }
    }

    async fn audit_invalid_credentials(
        &self,
        provider_name: &str,
        context: &AuthContext,
        error: Option<String>,
    ) {
        self.audit
            .record(
                AuditEventType::AuthenticationFailed,
                json!({
                    "provider": provider_name,
                    "reason": "invalid_credentials",
                    "error": error,
                    "ip_address": context.ip_address,
                }),
            )
            .await;
    }

    async fn audit_error(&self, provider_name: &str, error: String) {
        self.audit
            .record(
                AuditEventType::AuthenticationError,
                json!({ "provider": provider_name, "error": error }),
            )
            .await;
    }

    async fn audit_token_failure(&self, provider_name: &str, reason: &str) {
        self.audit
            .record(
                AuditEventType::TokenValidationFailed,
                json!({ "provider": provider_name, "reason": reason }),
            )
            .await;
    }

    async fn audit_expired(&self, session: &AuthSession, source: &str) {
        debug!(session_id = %session.session_id, source = %source, "Session expired");
        self.audit
            .record(
                AuditEventType::SessionExpired,
                json!({
                    "session_id": session.session_id,
                    "user_id": session.user_id(),
                    "expired_at": session.expires_at.to_rfc3339(),
                    "source": source,
                }),
            )
            .await;
    }
}

/// Remove the user's oldest sessions until one more fits under `cap`
fn evict_oldest(
    sessions: &mut HashMap<String, AuthSession>,
    user_id: &str,
    cap: usize,
) -> Vec<AuthSession> {
    let mut owned: Vec<(DateTime<Utc>, u64, String)> = sessions
        .values()
        .filter(|s| s.user_id() == user_id)
        .map(|s| (s.created_at, s.sequence, s.session_id.clone()))
        .collect();

    let keep = cap.saturating_sub(1);
    if owned.len() <= keep {
        return Vec::new();
    }
    owned.sort();
    let excess = owned.len() - keep;
    owned
        .into_iter()
        .take(excess)
        .filter_map(|(_, _, id)| sessions.remove(&id))
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::AuthLevel;
    use crate::error::UpidError;
    use crate::mock::{MockProvider, StaticBehavior, StaticProvider};
    use chrono::Duration;

    fn creds(user: &str, password: &str) -> Credentials {
        Credentials::from([
            ("username".to_string(), user.to_string()),
            ("password".to_string(), password.to_string()),
        ])
    }

    async fn manager_with(provider: impl crate::auth::AuthProvider + 'static) -> EnterpriseAuthManager {
        let registry = Arc::new(AuthRegistry::new());
        assert!(registry.register("static", Arc::new(provider), None).await);
        EnterpriseAuthManager::with_defaults(registry)
    }

    async fn types(manager: &EnterpriseAuthManager) -> Vec<AuditEventType> {
        manager
            .get_audit_trail(None, None, None)
            .await
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    #[tokio::test]
    async fn test_authenticate_creates_session() {
        let manager = manager_with(StaticProvider::new().with_roles(&["developer"])).await;
        let context = AuthContext::new().with_ip("10.1.2.3");

        let session = manager
            .authenticate("static", &creds("ana", "correct"), Some(&context))
            .await
            .unwrap();

        assert_eq!(session.user_id(), "ana");
        assert_eq!(session.ip_address.as_deref(), Some("10.1.2.3"));
        assert_eq!(session.user_principal.auth_level, AuthLevel::MultiFactor);
        assert_eq!(session.expires_at - session.created_at, Duration::minutes(480));
        assert!(session.risk_score >= 0.1 && session.risk_score <= 0.3 + 1e-9);
        assert!(session.user_principal.last_login.is_some());
        assert_eq!(types(&manager).await, vec![AuditEventType::AuthenticationSuccess]);
    }

    #[tokio::test]
    async fn test_failures_are_audited_and_distinguished() {
        let manager = manager_with(StaticProvider::new()).await;

        assert!(manager.authenticate("nope", &creds("a", "correct"), None).await.is_none());
        assert!(manager.authenticate("static", &creds("a", "wrong"), None).await.is_none());

        let trail = manager.get_audit_trail(None, None, None).await;
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].detail("reason"), Some("provider_not_found"));
        assert_eq!(trail[1].detail("reason"), Some("invalid_credentials"));
    }

    #[tokio::test]
    async fn test_provider_error_and_panic_never_escape() {
        for behavior in [StaticBehavior::Error, StaticBehavior::Panic] {
            let manager = manager_with(StaticProvider::new().with_behavior(behavior)).await;
            assert!(manager
                .authenticate("static", &creds("a", "correct"), None)
                .await
                .is_none());
            assert_eq!(types(&manager).await, vec![AuditEventType::AuthenticationError]);
        }
    }

    #[tokio::test]
    async fn test_auth_error_counts_as_invalid_credentials() {
        let mut provider = MockProvider::new();
        provider.expect_test_connection().returning(|| true);
        provider
            .expect_authenticate()
            .returning(|_| Err(UpidError::authentication("locked account")));
        let manager = manager_with(provider).await;

        assert!(manager.authenticate("static", &creds("a", "b"), None).await.is_none());
        let trail = manager.get_audit_trail(None, None, None).await;
        assert_eq!(trail[0].event_type, AuditEventType::AuthenticationFailed);
        assert_eq!(trail[0].detail("reason"), Some("invalid_credentials"));
    }

    #[tokio::test]
    async fn test_empty_user_id_rejected() {
        let mut provider = MockProvider::new();
        provider.expect_test_connection().returning(|| true);
        provider
            .expect_authenticate()
            .returning(|_| Ok(Some(UserPrincipal::new("", "mock"))));
        let manager = manager_with(provider).await;

        assert!(manager.authenticate("static", &creds("a", "b"), None).await.is_none());
        assert_eq!(manager.active_session_count().await, 0);
        assert_eq!(types(&manager).await, vec![AuditEventType::AuthenticationError]);
    }

    #[tokio::test]
    async fn test_expired_session_is_removed_on_validation() {
        let manager = manager_with(StaticProvider::new()).await;
        let session = manager
            .authenticate("static", &creds("bo", "correct"), None)
            .await
            .unwrap();

        manager
            .sessions
            .write()
            .await
            .get_mut(&session.session_id)
            .unwrap()
            .expires_at = Utc::now() - Duration::seconds(1);

        assert!(manager.validate_session(&session.session_id).await.is_none());
        assert!(manager.validate_session(&session.session_id).await.is_none());
        assert_eq!(
            types(&manager).await,
            vec![
                AuditEventType::AuthenticationSuccess,
                AuditEventType::SessionExpired,
                AuditEventType::SessionValidationFailed,
            ]
        );
        assert!(manager.refresh_session(&session.session_id).await.is_none());
    }

    #[tokio::test]
    async fn test_validation_recomputes_risk_for_old_sessions() {
        let manager = manager_with(StaticProvider::new().with_mfa()).await;
        let context = AuthContext::new().with_ip("10.0.0.1");
        let session = manager
            .authenticate("static", &creds("cy", "correct"), Some(&context))
            .await
            .unwrap();

        {
            let mut sessions = manager.sessions.write().await;
            let stored = sessions.get_mut(&session.session_id).unwrap();
            stored.created_at = Utc::now() - Duration::hours(2);
            stored.risk_score = 0.99;
        }

        let validated = manager.validate_session(&session.session_id).await.unwrap();
        assert!(validated.risk_score < 0.99);
        assert!(validated.last_activity >= validated.created_at);
    }

    #[tokio::test]
    async fn test_refresh_extends_from_current_expiry() {
        let manager = manager_with(StaticProvider::new()).await;
        let session = manager
            .authenticate("static", &creds("di", "correct"), None)
            .await
            .unwrap();

        let refreshed = manager.refresh_session(&session.session_id).await.unwrap();
        assert_eq!(
            refreshed.expires_at,
            session.expires_at + Duration::minutes(480)
        );
        assert_eq!(refreshed.audit_trail.len(), 2);
        assert!(refreshed.audit_trail[1].starts_with("refreshed:"));
    }

    #[tokio::test]
    async fn test_eviction_prefers_oldest() {
        let registry = Arc::new(AuthRegistry::new());
        assert!(registry.register("static", Arc::new(StaticProvider::new()), None).await);
        let manager = EnterpriseAuthManager::new(
            registry,
            AuthConfig {
                max_sessions_per_user: 2,
                ..Default::default()
            },
        );

        let mut ids = Vec::new();
        for _ in 0..3 {
            let s = manager
                .authenticate("static", &creds("ed", "correct"), None)
                .await
                .unwrap();
            ids.push(s.session_id);
        }
        manager.authenticate("static", &creds("fay", "correct"), None).await.unwrap();

        let live: Vec<String> = manager
            .user_sessions("ed")
            .await
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(live, ids[1..].to_vec());
        assert_eq!(manager.user_sessions("fay").await.len(), 1);

        let evictions = manager
            .get_audit_trail(None, None, Some(&[AuditEventType::SessionEvicted][..]))
            .await;
        assert_eq!(evictions.len(), 1);
        assert_eq!(evictions[0].detail("session_id"), Some(ids[0].as_str()));
    }

    #[tokio::test]
    async fn test_logout_user_and_stats() {
        let manager = manager_with(StaticProvider::new()).await;
        for user in ["gus", "gus", "hal"] {
            manager.authenticate("static", &creds(user, "correct"), None).await.unwrap();
        }
        manager.authenticate("static", &creds("gus", "bad"), None).await;

        let stats = manager.stats().await;
        assert_eq!(stats.active_sessions, 3);
        assert_eq!(stats.distinct_users, 2);
        assert_eq!(stats.failed_attempts, 1);
        assert_eq!(stats.registered_providers, 1);

        assert_eq!(manager.logout_user("gus").await, 2);
        assert_eq!(manager.logout_user("gus").await, 0);
        assert_eq!(manager.active_session_count().await, 1);
    }

    #[tokio::test]
    async fn test_cleanup_counts_expired() {
        let manager = manager_with(StaticProvider::new()).await;
        let a = manager.authenticate("static", &creds("ivy", "correct"), None).await.unwrap();
        manager.authenticate("static", &creds("jon", "correct"), None).await.unwrap();

        manager
            .sessions
            .write()
            .await
            .get_mut(&a.session_id)
            .unwrap()
            .expires_at = Utc::now() - Duration::minutes(5);

        assert_eq!(manager.cleanup_expired_sessions().await, 1);
        assert_eq!(manager.cleanup_expired_sessions().await, 0);
        let expired = manager
            .get_audit_trail(None, None, Some(&[AuditEventType::SessionExpired][..]))
            .await;
        assert_eq!(expired[0].detail("source"), Some("cleanup"));
    }

    #[tokio::test]
    async fn test_validate_token_passthrough() {
        let mut provider = MockProvider::new();
        provider.expect_test_connection().returning(|| true);
        provider.expect_validate_token().returning(|token| {
            Ok((token == "good").then(|| UserPrincipal::new("svc", "mock")))
        });
        let manager = manager_with(provider).await;

        assert_eq!(
            manager.validate_token("static", "good").await.unwrap().user_id,
            "svc"
        );
        assert!(manager.validate_token("static", "bad").await.is_none());
        assert!(manager.validate_token("missing", "good").await.is_none());
        assert_eq!(
            types(&manager).await,
            vec![
                AuditEventType::TokenValidationFailed,
                AuditEventType::TokenValidationFailed
            ]
        );
    }
}
