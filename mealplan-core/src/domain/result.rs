//! Result and error types for the core library

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A record failed structural validation
///
/// Always recoverable: the caller corrects the record and retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    /// Names of required fields that were absent
    pub missing_fields: Vec<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            missing_fields: Vec::new(),
        }
    }

    pub fn missing(record: &str, fields: Vec<String>) -> Self {
        Self {
            message: format!("invalid {}: missing fields {}", record, fields.join(", ")),
            missing_fields: fields,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Kinds of authentication failure surfaced to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    InvalidEmail,
    UserDisabled,
    UserNotFound,
    WrongPassword,
    TooManyRequests,
    EmailAlreadyInUse,
    WeakPassword,
    Other(String),
}

/// Authentication failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub kind: AuthErrorKind,
}

impl AuthError {
    pub fn new(kind: AuthErrorKind) -> Self {
        Self { kind }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Other(message.into()))
    }

    /// Message shown to the user for this failure
    pub fn user_message(&self) -> String {
        match &self.kind {
            AuthErrorKind::InvalidEmail => "Invalid email address".to_string(),
            AuthErrorKind::UserDisabled => "This account has been disabled".to_string(),
            AuthErrorKind::UserNotFound => "User not found".to_string(),
            AuthErrorKind::WrongPassword => "Wrong password".to_string(),
            AuthErrorKind::TooManyRequests => {
                "Too many attempts. Try again later".to_string()
            }
            AuthErrorKind::EmailAlreadyInUse => {
                "An account with this email already exists".to_string()
            }
            AuthErrorKind::WeakPassword => {
                "Password must be at least 6 characters".to_string()
            }
            AuthErrorKind::Other(message) => format!("Login error: {}", message),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

impl std::error::Error for AuthError {}

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Post-migration structural check failed. Fatal for plan-dependent work.
    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(msg))
    }

    /// Create a migration error
    pub fn migration(msg: impl Into<String>) -> Self {
        Self::Migration(msg.into())
    }

    /// Whether the caller must abort dependent initialization
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Migration(_))
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::Store(e.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output at the boundary)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Attach a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(e.to_string()),
        }
    }
}
