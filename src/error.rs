//! Engine error taxonomy.
//!
//! Every fallible operation in the engine returns [`Error`]. The variants
//! mirror the failure classes the boundary needs to distinguish:
//!
//! | Variant | Meaning | Retried? |
//! |---------|---------|----------|
//! | [`Error::NotFound`] | referenced corpus/file/conversation missing | no |
//! | [`Error::Validation`] | malformed input or configuration, rejected before any external call | no |
//! | [`Error::Provider`] | embedding/completion call failed | rate-limit and transient kinds only |
//! | [`Error::Store`] | vector store unavailable or rejected an operation | when marked retryable |
//! | [`Error::Busy`] | conversation already has a turn in flight | no (caller may resubmit) |
//!
//! Partial ingestion failure is deliberately NOT an error: the pipeline
//! returns an aggregate report whose rows enumerate per-file outcomes.

use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure class of an embedding or completion provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// HTTP 429 — retried with backoff.
    RateLimited,
    /// Network failure or 5xx — retried with backoff.
    Transient,
    /// Authentication/authorization rejected — fatal for the operation.
    Auth,
    /// The provider rejected the request as malformed — fatal.
    InvalidRequest,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("provider error ({kind:?}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("vector store error: {message}")]
    Store { message: String, retryable: bool },

    #[error("conversation {0} has a turn in flight")]
    Busy(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn provider(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self::Provider {
            kind,
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>, retryable: bool) -> Self {
        Self::Store {
            message: message.into(),
            retryable,
        }
    }

    /// Classify an HTTP status from the embedding/completion provider.
    ///
    /// 429 and 5xx are worth retrying; 401/403 and other 4xx are not.
    pub fn provider_from_status(status: reqwest::StatusCode, body: String) -> Self {
        let kind = if status.as_u16() == 429 {
            ProviderErrorKind::RateLimited
        } else if status.is_server_error() {
            ProviderErrorKind::Transient
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            ProviderErrorKind::Auth
        } else {
            ProviderErrorKind::InvalidRequest
        };
        Self::Provider {
            kind,
            message: format!("HTTP {}: {}", status, body),
        }
    }

    /// Whether the retry loops in the adapters should attempt this again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { kind, .. } => matches!(
                kind,
                ProviderErrorKind::RateLimited | ProviderErrorKind::Transient
            ),
            Self::Store { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
