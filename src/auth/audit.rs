//! Append-only authentication audit log
//!
//! Entries are never mutated or removed. Each one is also emitted as a
//! tracing event under the `upid_auth::audit` target so that log shipping
//! picks them up without reading the in-memory trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Audit event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
}

/// Security-relevant events produced by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AuthenticationSuccess,
    AuthenticationFailed,
    AuthenticationError,
    SessionValidationFailed,
    SessionExpired,
    SessionRefreshed,
    SessionEvicted,
    Logout,
    TokenValidationFailed,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::AuthenticationSuccess => "authentication_success",
            AuditEventType::AuthenticationFailed => "authentication_failed",
            AuditEventType::AuthenticationError => "authentication_error",
            AuditEventType::SessionValidationFailed => "session_validation_failed",
            AuditEventType::SessionExpired => "session_expired",
            AuditEventType::SessionRefreshed => "session_refreshed",
            AuditEventType::SessionEvicted => "session_evicted",
            AuditEventType::Logout => "logout",
            AuditEventType::TokenValidationFailed => "token_validation_failed",
        }
    }

    pub fn severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::AuthenticationError => AuditSeverity::Error,
            AuditEventType::AuthenticationFailed
            | AuditEventType::SessionValidationFailed
            | AuditEventType::TokenValidationFailed => AuditSeverity::Warning,
            _ => AuditSeverity::Info,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.severity() > AuditSeverity::Info
    }

    pub fn all() -> &'static [AuditEventType] {
        &[
            AuditEventType::AuthenticationSuccess,
            AuditEventType::AuthenticationFailed,
            AuditEventType::AuthenticationError,
            AuditEventType::SessionValidationFailed,
            AuditEventType::SessionExpired,
            AuditEventType::SessionRefreshed,
            AuditEventType::SessionEvicted,
            AuditEventType::Logout,
            AuditEventType::TokenValidationFailed,
        ]
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditEventType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown audit event type '{s}'"))
    }
}

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub details: Map<String, Value>,
}

impl AuditEntry {
    fn new(event_type: AuditEventType, timestamp: DateTime<Utc>, details: Value) -> Self {
        let details = match details {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp,
            event_type,
            details,
        }
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }
}

/// Filter applied by [`AuditLog::query`]
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Inclusive lower bound
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub end: Option<DateTime<Utc>>,
    /// Allow-list; `None` admits every type
    pub event_types: Option<Vec<AuditEventType>>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if self.start.is_some_and(|start| entry.timestamp < start) {
            return false;
        }
        if self.end.is_some_and(|end| entry.timestamp > end) {
            return false;
        }
        match &self.event_types {
            Some(types) => types.contains(&entry.event_type),
            None => true,
        }
    }
}

#[derive(Debug, Default)]
pub struct AuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry stamped with the current time
    pub async fn record(&self, event_type: AuditEventType, details: Value) -> AuditEntry {
        self.record_at(event_type, Utc::now(), details).await
    }

    /// Append an entry with a caller-supplied timestamp
    pub async fn record_at(
        &self,
        event_type: AuditEventType,
        timestamp: DateTime<Utc>,
        details: Value,
    ) -> AuditEntry {
        let entry = AuditEntry::new(event_type, timestamp, details);
        emit(&entry);
        self.entries.write().await.push(entry.clone());
        entry
    }

    /// Entries matching `filter`, in insertion order
    pub async fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn emit(entry: &AuditEntry) {
    let details = Value::Object(entry.details.clone());
    match entry.event_type.severity() {
        AuditSeverity::Info => info!(
            target: "upid_auth::audit",
            audit_id = %entry.id,
            event = %entry.event_type,
            details = %details,
            "audit"
        ),
        AuditSeverity::Warning | AuditSeverity::Error => warn!(
            target: "upid_auth::audit",
            audit_id = %entry.id,
            event = %entry.event_type,
            details = %details,
            "audit"
        ),
    }
}
