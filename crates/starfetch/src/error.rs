use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpError;

/// Every failure surfaced by the fetcher is one of these kinds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The user or resource does not exist (HTTP 404).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Credentials are missing or were rejected (HTTP 401).
    #[error("Authentication required")]
    Unauthenticated,

    /// Access was denied for a reason other than quota exhaustion (HTTP 403).
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// The quota is exhausted. Never retried automatically.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// No status code was received (timeout, connection failure, ...).
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A success status with a body that could not be decoded.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// A retryable status (429, 5xx) persisted past the retry ceiling.
    #[error("Retries exhausted after {attempts} attempt(s); last status {status}")]
    RetriesExhausted { status: u16, attempts: u32 },

    /// Any other non-success status.
    #[error("Unexpected HTTP status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },
}

impl FetchError {
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// A single attempt that hit a retryable status.
    ///
    /// The retry driver rewrites the attempt count once the ceiling is hit.
    #[inline]
    pub fn retryable_status(status: u16) -> Self {
        Self::RetriesExhausted {
            status,
            attempts: 1,
        }
    }

    /// Record how many attempts were made before giving up.
    #[must_use]
    pub fn with_attempts(self, attempts: u32) -> Self {
        match self {
            Self::RetriesExhausted { status, .. } => Self::RetriesExhausted { status, attempts },
            other => other,
        }
    }

    /// Whether the retry policy may try again after this error.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RetriesExhausted { .. } | Self::Transport { .. } | Self::MalformedResponse { .. }
        )
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Reset hint carried by a rate-limit error.
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::RateLimited { reset_at } => Some(*reset_at),
            _ => None,
        }
    }

    /// The HTTP status this error was derived from, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Unauthenticated => Some(401),
            Self::Forbidden { .. } => Some(403),
            Self::RetriesExhausted { status, .. } | Self::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            Self::RateLimited { .. } | Self::Transport { .. } | Self::MalformedResponse { .. } => {
                None
            }
        }
    }
}

impl From<HttpError> for FetchError {
    fn from(err: HttpError) -> Self {
        Self::transport(err.to_string())
    }
}

/// Errors raised while turning one raw payload into a [`crate::Repository`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("repository payload is not a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has the wrong type (expected {expected})")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which keeps progress output and
/// log lines to a single line.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;
