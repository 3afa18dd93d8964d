//! Error handling utilities for the crate
use thiserror::Error;

use reqwest::Error as ReqwestError;

/// All errors raised by this crate will be instances of FirekitError
#[derive(Error, Debug)]
pub enum FirekitError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A non-success status from the remote service.  The message carries the
    /// exact status code and raw body; `kind` carries the classified protocol
    /// error so callers never have to sniff the body text.
    #[error("HTTP Error {status}: {body}")]
    Http {
        status: u16,
        kind: ErrorKind,
        body: String,
    },
    /// A 200 response whose body is the literal string `"null"`.  The server
    /// uses this to say "nothing stored here", which is distinct from an
    /// empty-but-present value.
    #[error("HTTP 200: Server returned null (No data at the specified path)")]
    NoData,
    #[error("first value must be scalar")]
    SeedNotScalar,
    #[error("unexpected existing data format")]
    UnexpectedShape,
    #[error("task execution error: {0}")]
    Task(String),
    #[error("task runner is shut down")]
    ShutDown,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FirekitError {
    pub fn required(field_name: &str) -> Self {
        FirekitError::InvalidInput(format!("{} is required", field_name))
    }

    /// The classified protocol error, if this is an HTTP failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            FirekitError::Http { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<ReqwestError> for FirekitError {
    fn from(err: ReqwestError) -> Self {
        FirekitError::Task(err.to_string())
    }
}

/// Classification of the remote service's own error vocabulary.
///
/// The identity service reports errors as `{"error": {"message": "CODE"}}`
/// (sometimes `"CODE : detail"`), the database as `{"error": "text"}`.  The
/// code is parsed once, here, so no caller branches on raw substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmailExists,
    EmailNotFound,
    InvalidCredentials,
    WeakPassword,
    UserDisabled,
    InvalidToken,
    PermissionDenied,
    NotFound,
    Other,
}

impl ErrorKind {
    pub(crate) fn classify(status: u16, body: &str) -> Self {
        if let Some(code) = extract_error_code(body) {
            // Identity codes may carry a trailing " : detail" after the code.
            let code = code.split(':').next().unwrap_or("").trim();
            return match code {
                "EMAIL_EXISTS" => ErrorKind::EmailExists,
                "EMAIL_NOT_FOUND" => ErrorKind::EmailNotFound,
                "INVALID_LOGIN_CREDENTIALS" | "INVALID_PASSWORD" => ErrorKind::InvalidCredentials,
                "WEAK_PASSWORD" => ErrorKind::WeakPassword,
                "USER_DISABLED" => ErrorKind::UserDisabled,
                "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => {
                    ErrorKind::InvalidToken
                }
                "Permission denied" => ErrorKind::PermissionDenied,
                _ => {
                    if status == 404 {
                        ErrorKind::NotFound
                    } else {
                        ErrorKind::Other
                    }
                }
            };
        }
        if status == 404 {
            ErrorKind::NotFound
        } else {
            ErrorKind::Other
        }
    }
}

/// Pulls the error code out of an error body, whichever of the two remote
/// formats it uses.
fn extract_error_code(body: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = parsed.get("error")?;
    match error {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Object(detail) => detail
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    }
}

pub(crate) type Result<T> = std::result::Result<T, FirekitError>;
