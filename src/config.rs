//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// IMAP connection parameters, handed to the session as-is.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Implicit TLS (port 993 style). Plain TCP when false.
    pub use_tls: bool,
    /// Bound on TCP connect + greeting + login.
    pub connect_timeout: Duration,
    /// Bound on every other IMAP command, also used as socket read/write timeout.
    pub io_timeout: Duration,
}

/// Subject filter applied during selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectFilter {
    /// The `*` wildcard: every message matches.
    Any,
    /// Case-insensitive substring match. Stored lowercased.
    Contains(String),
}

impl SubjectFilter {
    /// Parse a filter string. `*` is the wildcard, anything else a substring.
    pub fn parse(raw: &str) -> Self {
        if raw == "*" {
            Self::Any
        } else {
            Self::Contains(raw.to_lowercase())
        }
    }

    pub fn matches(&self, subject: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Contains(needle) => subject.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// What to do when a single envelope cannot be read during selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeErrorPolicy {
    /// Log, stop iterating, keep the candidates gathered so far.
    #[default]
    Abort,
    /// Log, skip the message, keep going.
    Skip,
}

impl std::str::FromStr for EnvelopeErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(format!("expected \"abort\" or \"skip\", got \"{other}\"")),
        }
    }
}

/// Immutable configuration for one scan run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub imap: ImapConfig,
    pub folder: String,
    /// How many of the most recent messages to inspect. Always > 0.
    pub max_scan: u32,
    pub subject_filter: SubjectFilter,
    pub envelope_errors: EnvelopeErrorPolicy,
    /// How many content fetches may run ahead of normalization. Always >= 1.
    pub prefetch: usize,
}

impl ScanConfig {
    pub const DEFAULT_PORT: u16 = 993;
    pub const DEFAULT_FOLDER: &'static str = "INBOX";
    pub const DEFAULT_MAX_SCAN: u32 = 10;
    pub const DEFAULT_PREFETCH: usize = 2;

    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    ///
    /// Blank values count as unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required =
            |key: &str| var(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let host = required("MAIL_HOST")?;
        let username = required("MAIL_USER")?;
        let password = SecretString::from(required("MAIL_PASSWORD")?);

        let port = parse_or(var("MAIL_PORT"), "MAIL_PORT", Self::DEFAULT_PORT)?;
        let use_tls = parse_bool(var("MAIL_USE_TLS"), "MAIL_USE_TLS", true)?;
        let connect_timeout = Duration::from_secs(parse_or(
            var("MAIL_CONNECT_TIMEOUT_SECS"),
            "MAIL_CONNECT_TIMEOUT_SECS",
            30,
        )?);
        let io_timeout = Duration::from_secs(parse_or(
            var("MAIL_IO_TIMEOUT_SECS"),
            "MAIL_IO_TIMEOUT_SECS",
            60,
        )?);

        let folder =
            var("MAIL_SCANNING_FOLDER").unwrap_or_else(|| Self::DEFAULT_FOLDER.to_string());
        let max_scan = parse_or(
            var("MAX_SCAN_LAST_EMAILS"),
            "MAX_SCAN_LAST_EMAILS",
            Self::DEFAULT_MAX_SCAN,
        )?;
        let subject_filter = lookup("MAIL_SUBJECT_FILTER")
            .map(|raw| SubjectFilter::parse(&raw))
            .unwrap_or(SubjectFilter::Any);
        let envelope_errors = parse_or(
            var("MAIL_ENVELOPE_ERRORS"),
            "MAIL_ENVELOPE_ERRORS",
            EnvelopeErrorPolicy::default(),
        )?;
        let prefetch = parse_or(var("MAIL_PREFETCH"), "MAIL_PREFETCH", Self::DEFAULT_PREFETCH)?;

        let config = Self {
            imap: ImapConfig {
                host,
                port,
                username,
                password,
                use_tls,
                connect_timeout,
                io_timeout,
            },
            folder,
            max_scan,
            subject_filter,
            envelope_errors,
            prefetch,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that the type system does not carry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_scan == 0 {
            return Err(invalid("MAX_SCAN_LAST_EMAILS", "must be greater than 0"));
        }
        if self.prefetch == 0 {
            return Err(invalid("MAIL_PREFETCH", "must be at least 1"));
        }
        if self.folder.trim().is_empty() {
            return Err(invalid("MAIL_SCANNING_FOLDER", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, format!("\"{raw}\": {e}"))),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, format!("\"{v}\" is not a boolean"))),
        },
    }
}
