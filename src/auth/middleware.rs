//! Request authentication adapter
//!
//! Framework-neutral: callers hand over the raw `Authorization` header and
//! get a session back, or an [`AuthRejection`] they can map onto their own
//! transport's status codes.

use crate::auth::manager::EnterpriseAuthManager;
use crate::auth::models::{AuthLevel, AuthSession};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a request was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    /// No usable credentials or no live session
    Unauthorized { reason: String },
    /// Authenticated, but below the required level or lacking a role
    Forbidden { reason: String },
}

impl AuthRejection {
    /// HTTP status equivalent
    pub fn status_code(&self) -> u16 {
        match self {
            AuthRejection::Unauthorized { .. } => 401,
            AuthRejection::Forbidden { .. } => 403,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            AuthRejection::Unauthorized { reason } | AuthRejection::Forbidden { reason } => reason,
        }
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthRejection::Unauthorized { reason } => write!(f, "unauthorized: {reason}"),
            AuthRejection::Forbidden { reason } => write!(f, "forbidden: {reason}"),
        }
    }
}

impl std::error::Error for AuthRejection {}

/// Extract the credential from a `Bearer <value>` header.
///
/// The scheme is matched case-insensitively; an empty value yields `None`.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let (scheme, value) = header.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// True when the session meets `required_level` and, if roles are given,
/// holds at least one of them
pub fn require_auth(
    session: &AuthSession,
    required_level: AuthLevel,
    required_roles: &[&str],
) -> bool {
    let principal = &session.user_principal;
    if principal.auth_level < required_level {
        return false;
    }
    required_roles.is_empty() || principal.has_any_role(required_roles)
}

#[derive(Clone)]
pub struct AuthMiddleware {
    manager: Arc<EnterpriseAuthManager>,
}

impl AuthMiddleware {
    pub fn new(manager: Arc<EnterpriseAuthManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<EnterpriseAuthManager> {
        &self.manager
    }

    /// Resolve a session from an `Authorization` header
    pub async fn authenticate_request(&self, authorization: Option<&str>) -> Option<AuthSession> {
        let session_id = authorization.and_then(extract_bearer)?;
        self.manager.validate_session(session_id).await
    }

    /// Authenticate and authorize in one step
    pub async fn authorize(
        &self,
        authorization: Option<&str>,
        required_level: AuthLevel,
        required_roles: &[&str],
    ) -> Result<AuthSession, AuthRejection> {
        let Some(header) = authorization else {
            return Err(AuthRejection::Unauthorized {
                reason: "missing Authorization header".to_string(),
            });
        };
        let Some(session_id) = extract_bearer(header) else {
            return Err(AuthRejection::Unauthorized {
                reason: "expected a Bearer session token".to_string(),
            });
        };
        let Some(session) = self.manager.validate_session(session_id).await else {
            return Err(AuthRejection::Unauthorized {
                reason: "session is invalid or expired".to_string(),
            });
        };

        if !require_auth(&session, required_level, required_roles) {
            warn!(
                user_id = %session.user_id(),
                level = %session.user_principal.auth_level,
                required = %required_level,
                "Request forbidden"
            );
            return Err(AuthRejection::Forbidden {
                reason: format!(
                    "requires {required_level}{}",
                    if required_roles.is_empty() {
                        String::new()
                    } else {
                        format!(" and one of [{}]", required_roles.join(", "))
                    }
                ),
            });
        }

        debug!(user_id = %session.user_id(), "Request authorized");
        Ok(session)
    }
}
