//! GitHub API error types.
//!
//! Errors are split into two kinds for retry decisions:
//!
//! - **Transient** errors are retriable (5xx, rate limits, network failures)
//! - **Permanent** errors are not (most 4xx, malformed responses)
//!
//! Only reads are ever retried. A failed comment post surfaces to the webhook
//! caller as a handler failure regardless of kind.

use std::fmt;
use thiserror::Error;

/// The kind of GitHub API error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubErrorKind {
    /// Transient error - safe to retry with backoff.
    ///
    /// Examples:
    /// - HTTP 5xx (server errors)
    /// - HTTP 429 (rate limited)
    /// - HTTP 403 with a rate limit message
    /// - Network timeouts
    Transient,

    /// Permanent error.
    ///
    /// Examples:
    /// - HTTP 4xx (except rate limits)
    /// - Authentication failures (401, 403 non-rate-limit)
    /// - A response body that is not JSON
    Permanent,
}

impl GitHubErrorKind {
    pub fn is_retriable(&self) -> bool {
        matches!(self, GitHubErrorKind::Transient)
    }
}

/// A GitHub API error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct GitHubApiError {
    pub kind: GitHubErrorKind,

    /// The HTTP status code, if available.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// The underlying octocrab error, if available.
    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for GitHubApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "GitHub API error (HTTP {}): {}", code, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl GitHubApiError {
    /// Creates a permanent error without an octocrab source.
    pub fn permanent_without_source(message: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transient error without an octocrab source.
    pub fn transient_without_source(message: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::Transient,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// GitHub answered, but the body could not be understood.
    pub fn invalid_response(url: &str, detail: impl fmt::Display) -> Self {
        Self::permanent_without_source(format!("invalid response from {url}: {detail}"))
    }

    /// Categorizes an error by HTTP status and message alone.
    pub fn from_status(status_code: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify(status_code, &message),
            status_code,
            message,
            source: None,
        }
    }

    /// Categorizes an octocrab error.
    ///
    /// Errors GitHub itself reported carry a status code. Everything else
    /// (transport failures, body decoding) is classified by its message.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let status_code = extract_status_code(&err);
        let message = match &err {
            octocrab::Error::GitHub { source, .. } => source.message.clone(),
            other => other.to_string(),
        };

        Self {
            kind: classify(status_code, &message),
            status_code,
            message,
            source: Some(err),
        }
    }
}

impl From<octocrab::Error> for GitHubApiError {
    fn from(err: octocrab::Error) -> Self {
        Self::from_octocrab(err)
    }
}

fn extract_status_code(err: &octocrab::Error) -> Option<u16> {
    match err {
        octocrab::Error::GitHub { source, .. } => Some(source.status_code.as_u16()),
        _ => None,
    }
}

fn classify(status_code: Option<u16>, message: &str) -> GitHubErrorKind {
    if is_transient_message(message) {
        return GitHubErrorKind::Transient;
    }

    match status_code {
        Some(429) => GitHubErrorKind::Transient,
        Some(403) if is_rate_limit_error(message) => GitHubErrorKind::Transient,
        Some(code) if (500..600).contains(&code) => GitHubErrorKind::Transient,
        Some(_) => GitHubErrorKind::Permanent,
        None if is_network_error(message) => GitHubErrorKind::Transient,
        None => GitHubErrorKind::Permanent,
    }
}

/// Generic "try again" suggestions from GitHub.
fn is_transient_message(message: &str) -> bool {
    message.to_lowercase().contains("try again")
}

/// Checks if an error message indicates a rate limit.
fn is_rate_limit_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("rate limit")
        || message_lower.contains("api rate")
        || message_lower.contains("secondary rate")
        || message_lower.contains("abuse detection")
}

/// Checks if an error message indicates a network-level error.
fn is_network_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("timeout")
        || message_lower.contains("connection")
        || message_lower.contains("network")
        || message_lower.contains("dns")
        || message_lower.contains("timed out")
}
