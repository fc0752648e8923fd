//! Error types for the UPID authentication core
//!
//! Expected authentication failures (bad credentials, expired sessions,
//! unknown providers) never surface as errors from the manager; they are
//! reported as `None`/`false` plus an audit entry. `UpidError` covers the
//! remaining cases: provider misconfiguration, unreachable identity
//! backends, malformed tokens and local I/O.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for UPID operations
pub type Result<T> = std::result::Result<T, UpidError>;

/// Error taxonomy for the authentication core
#[derive(Error, Debug)]
pub enum UpidError {
    /// Credentials rejected by a provider
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Malformed, expired or otherwise unacceptable token
    #[error("Token validation failed: {0}")]
    TokenValidation(String),

    /// Provider is missing configuration declared in its metadata
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Provider cannot reach its backing identity system
    #[error("Connection error: {0}")]
    Connection(String),

    /// Named entity (provider, session, token) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration source errors
    #[error("Config source error: {0}")]
    Config(#[from] config::ConfigError),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Authentication errors (1100-1199)
    InvalidCredentials,
    TokenRejected,

    // Configuration errors (1200-1299)
    ConfigurationInvalid,
    ConfigurationMissing,

    // Connection errors (1300-1399)
    BackendUnreachable,

    // Data errors (1400-1499)
    NotFound,
    InvalidInput,
    ParsingFailed,

    // Internal errors (1900-1999)
    InternalError,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::InvalidCredentials => 1101,
            ErrorCode::TokenRejected => 1102,
            ErrorCode::ConfigurationInvalid => 1201,
            ErrorCode::ConfigurationMissing => 1202,
            ErrorCode::BackendUnreachable => 1301,
            ErrorCode::NotFound => 1401,
            ErrorCode::InvalidInput => 1402,
            ErrorCode::ParsingFailed => 1403,
            ErrorCode::InternalError => 1901,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1100..=1199 => "authentication",
            1200..=1299 => "configuration",
            1300..=1399 => "connection",
            1400..=1499 => "data",
            1900..=1999 => "internal",
            _ => "unknown",
        }
    }
}

impl UpidError {
    /// Create an authentication error
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a token validation error
    pub fn token_validation<S: Into<String>>(msg: S) -> Self {
        Self::TokenValidation(msg.into())
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Generic(anyhow::anyhow!(msg.into()))
    }

    /// Map to structured error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            UpidError::Authentication(_) => ErrorCode::InvalidCredentials,
            UpidError::TokenValidation(_) => ErrorCode::TokenRejected,
            UpidError::Configuration(_) => ErrorCode::ConfigurationMissing,
            UpidError::Config(_) => ErrorCode::ConfigurationInvalid,
            UpidError::Connection(_) => ErrorCode::BackendUnreachable,
            UpidError::NotFound(_) => ErrorCode::NotFound,
            UpidError::InvalidInput(_) => ErrorCode::InvalidInput,
            UpidError::Json(_) => ErrorCode::ParsingFailed,
            UpidError::Io(_) | UpidError::Generic(_) => ErrorCode::InternalError,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, UpidError::Connection(_))
    }

    /// Check if error indicates rejected credentials or tokens
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            UpidError::Authentication(_) | UpidError::TokenValidation(_)
        )
    }

    /// Get a production-safe error message that doesn't expose sensitive information
    pub fn sanitized_message(&self) -> String {
        match self {
            UpidError::Authentication(_) => "Authentication failed".to_string(),
            UpidError::TokenValidation(_) => "Token rejected".to_string(),
            UpidError::Configuration(_) | UpidError::Config(_) => {
                "Provider misconfigured".to_string()
            }
            UpidError::Connection(_) => "Identity backend unreachable".to_string(),
            UpidError::NotFound(_) => "Requested resource not found".to_string(),
            UpidError::InvalidInput(_) => "Invalid input provided".to_string(),
            UpidError::Json(_) => "Data parsing error".to_string(),
            UpidError::Io(_) => "I/O operation failed".to_string(),
            UpidError::Generic(_) => "Internal error occurred".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = UpidError::authentication("bad password");
        assert!(err.is_auth_error());
        assert!(!err.is_retryable());
        assert_eq!(err.error_code().category(), "authentication");
        assert_eq!(err.sanitized_message(), "Authentication failed");

        let err = UpidError::connection("ldap://dc1 unreachable");
        assert!(err.is_retryable());
        assert_eq!(err.error_code().as_number(), 1301);
    }

    #[test]
    fn test_configuration_and_token_errors_are_distinct() {
        let config = UpidError::configuration("missing issuer_url");
        let token = UpidError::token_validation("expired");
        assert_ne!(config.error_code(), token.error_code());
        assert!(token.is_auth_error());
        assert!(!config.is_auth_error());
        assert!(config.to_string().contains("issuer_url"));
    }
}
