use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;

/// Number of leading token characters kept visible by [`mask_token`]
const MASK_VISIBLE_CHARS: usize = 4;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, TokenError>;

/// Token lifecycle error type
///
/// Covers the failures a consumer of the credential manager can observe.
/// A failed renewal is not one of them: the entry is evicted and the next
/// `get` reports `NotFound`.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Registration input was malformed (missing token or expiry)
    #[error("Invalid registration for owner '{owner}': {reason}")]
    Registration { owner: String, reason: String },

    /// No credential is registered for the requested owner
    #[error("No credential registered for owner '{0}'")]
    NotFound(String),

    /// `get` exhausted its bounded wait on the access gate
    #[error("{}", describe_gate_timeout(.attempts, .worker_error))]
    GateTimeout {
        attempts: u32,
        #[source]
        worker_error: Option<Arc<WorkerError>>,
    },

    /// A sweep triggered through the manager killed the renewal worker
    #[error("Renewal worker failed: {0}")]
    WorkerFailed(#[source] Arc<WorkerError>),

    /// The renewal worker was used incorrectly (started twice, no runtime, ...)
    #[error("Renewal worker lifecycle error: {0}")]
    Lifecycle(String),

    /// A JWT could not be parsed or carries no usable `exp` claim
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TokenError {
    /// The fatal worker error behind a `GateTimeout` or `WorkerFailed`, if any
    pub fn worker_error(&self) -> Option<&WorkerError> {
        match self {
            TokenError::GateTimeout {
                worker_error: Some(err),
                ..
            } => Some(err.as_ref()),
            TokenError::WorkerFailed(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Whether this error reports a dead renewal worker rather than a busy one
    pub fn is_worker_dead(&self) -> bool {
        self.worker_error().is_some()
    }

    /// Whether the owner simply has no credential registered
    pub fn is_not_found(&self) -> bool {
        matches!(self, TokenError::NotFound(_))
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        TokenError::InvalidToken(err.to_string())
    }
}

fn describe_gate_timeout(attempts: &u32, worker_error: &Option<Arc<WorkerError>>) -> String {
    match worker_error {
        Some(err) => format!(
            "Renewal worker is dead, gave up waiting for credential access after {} attempt(s): {}",
            attempts, err
        ),
        None => format!(
            "Timed out waiting for credential access after {} attempt(s)",
            attempts
        ),
    }
}

/// Fatal renewal worker errors
///
/// These are defects in the sweep itself, not per-entry renewal failures.
/// Once recorded the worker exits and leaves the access gate closed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    /// The sweep task panicked
    #[error("Renewal sweep panicked: {0}")]
    Panicked(String),
    /// The sweep task was cancelled before it could finish
    #[error("Renewal sweep was aborted")]
    Aborted,
}

/// Renewal transport errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network error (connection, timeout, TLS, etc.)
    #[error("Network error: {0}")]
    Network(String),
    /// HTTP error with status code
    #[error("HTTP {status} error: {message}")]
    Http { status: u16, message: String },
    /// Failed to parse response
    #[error("Parse error: {0}")]
    Parse(String),
    /// Request building failed
    #[error("Request error: {0}")]
    Request(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timeout".to_string())
        } else if err.is_connect() {
            ApiError::Network(format!("Connection failed: {}", err))
        } else if let Some(status) = err.status() {
            ApiError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_builder() {
            ApiError::Request(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// One owner's current credential
///
/// The token is held as a [`SecretString`] so that `Debug` output never
/// leaks it. Use [`CredentialEntry::token`] to read the raw value when
/// building a request.
#[derive(Debug)]
pub struct CredentialEntry {
    token: SecretString,
    expires_at: i64,
}

impl CredentialEntry {
    /// Create an entry from a token and its expiry (seconds since epoch)
    pub fn new(token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_at,
        }
    }

    /// The raw token value
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    /// The token with all but its first characters hidden, for logging
    pub fn masked_token(&self) -> String {
        mask_token(self.token())
    }

    /// Expiry as seconds since the Unix epoch
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Seconds left before the entry enters its renewal window
    ///
    /// Zero or negative means the entry is due for renewal.
    pub fn seconds_remaining(&self, now: i64, renewal_window: i64) -> i64 {
        self.expires_at - now - renewal_window
    }

    pub(crate) fn with_token(&self, token: impl Into<String>) -> Self {
        Self::new(token, self.expires_at)
    }

    pub(crate) fn with_expiry(&self, expires_at: i64) -> Self {
        Self::new(self.token().to_string(), expires_at)
    }
}

impl Clone for CredentialEntry {
    fn clone(&self) -> Self {
        Self::new(self.token().to_string(), self.expires_at)
    }
}

impl PartialEq for CredentialEntry {
    fn eq(&self, other: &Self) -> bool {
        self.expires_at == other.expires_at && self.token() == other.token()
    }
}

impl Eq for CredentialEntry {}

impl fmt::Display for CredentialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (expires_at={})",
            self.masked_token(),
            self.expires_at
        )
    }
}

/// Render a token for logs: the first few characters followed by `***`
///
/// Short tokens are hidden completely so the visible prefix never
/// amounts to a meaningful share of the secret.
pub fn mask_token(token: &str) -> String {
    if token.chars().count() <= MASK_VISIBLE_CHARS * 2 {
        return "***".to_string();
    }
    let visible: String = token.chars().take(MASK_VISIBLE_CHARS).collect();
    format!("{}***", visible)
}

/// Source of the current time in seconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock time via `chrono::Utc`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

impl<F> Clock for F
where
    F: Fn() -> i64 + Send + Sync,
{
    fn now(&self) -> i64 {
        self()
    }
}
