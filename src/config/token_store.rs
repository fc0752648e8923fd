//! Persisted CLI login state in `~/.upid/auth.json`

use crate::auth::security::{file_access, write_private_file};
use crate::error::{Result, UpidError};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Stored access token and the identity it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// `None` means the token never expires
    #[serde(default, deserialize_with = "deserialize_iso8601")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Registry name of the provider that issued the session
    #[serde(default)]
    pub provider: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Accept RFC 3339 as well as offset-less ISO-8601, which is read as UTC
fn deserialize_iso8601<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    parse_iso8601(&raw)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid ISO-8601 timestamp '{raw}'")))
}

pub fn parse_iso8601(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

impl AuthToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at: None,
            scope: None,
            user_id: None,
            email: None,
            organization_id: None,
            provider: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// `Authorization` header value
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".upid")
            .join("auth.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored token, `None` when nothing is stored
    pub fn load(&self) -> Result<Option<AuthToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        if file_access(&self.path)?.is_shared() {
            warn!("Token store {} is readable by other users", self.path.display());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            UpidError::configuration(format!(
                "Failed to read token store {}: {e}",
                self.path.display()
            ))
        })?;
        let token = serde_json::from_str(&content)?;
        Ok(Some(token))
    }

    pub async fn save(&self, token: &AuthToken) -> Result<()> {
        let content = serde_json::to_string_pretty(token)?;
        write_private_file(&self.path, &content).await?;
        debug!("Saved token to {}", self.path.display());
        Ok(())
    }

    /// Remove the stored token, returning whether one existed
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        debug!("Removed {}", self.path.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_iso8601_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_iso8601("2024-03-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_iso8601("2024-03-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_iso8601("2024-03-01T12:30:00"), Some(expected));
        assert_eq!(parse_iso8601("2024-03-01T12:30:00.000000"), Some(expected));
        assert_eq!(parse_iso8601("yesterday"), None);
    }

    #[test]
    fn test_missing_expiry_never_expires() {
        let token: AuthToken = serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(token.expires_at, None);
        assert_eq!(token.token_type, "Bearer");
        assert!(!token.is_expired());

        let token: AuthToken =
            serde_json::from_str(r#"{"access_token": "abc", "expires_at": null}"#).unwrap();
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join(".upid").join("auth.json"));
        assert_eq!(store.load().unwrap(), None);

        let mut token = AuthToken::new("sess-123");
        token.user_id = Some("alice".into());
        token.expires_at = Some(Utc::now() + chrono::Duration::hours(1));
        store.save(&token).await.unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.user_id.as_deref(), Some("alice"));
        assert_eq!(loaded.authorization_header(), "Bearer sess-123");

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
    }
}
