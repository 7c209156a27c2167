//! Error types for mail-scan.

use std::time::Duration;

/// Top-level error type for a scan run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Scan error: {0}")]
    Scan(ScanError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised by the mail session (connection, auth, folder access, fetch).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot connect to IMAP server {host}: {reason}")]
    Connection { host: String, reason: String },

    #[error("Authentication failed for {user}: {reason}")]
    Auth { user: String, reason: String },

    #[error("Cannot lock folder \"{folder}\": {reason}")]
    FolderLock { folder: String, reason: String },

    #[error("Cannot get mails from {folder}: {reason}")]
    MailboxUnavailable { folder: String, reason: String },

    #[error("Failed to fetch message {seq}: {reason}")]
    Fetch { seq: u32, reason: String },

    #[error("IMAP {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("IMAP worker task failed: {0}")]
    Worker(String),
}

/// Errors raised while selecting candidate messages.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Message {seq} has no subject")]
    MissingSubject { seq: u32 },

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<ScanError> for Error {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Session(e) => Error::Session(e),
            other => Error::Scan(other),
        }
    }
}

/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;
