// src/error.rs
//! Error taxonomy. Only `DiscoverError` ever reaches a `discover` caller;
//! everything else is recorded in `CrawlMeta` or logged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single connector. Never fatal for a crawl.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("connector timed out after {0} ms")]
    Timeout(u64),

    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("could not parse source payload: {0}")]
    ParseError(String),

    #[error("rate limited by source: {0}")]
    RateLimited(String),
}

/// Serializable discriminant of [`ConnectorError`], as stored in `CrawlMeta.errors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorErrorKind {
    Timeout,
    Unreachable,
    ParseError,
    RateLimited,
}

impl ConnectorErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unreachable => "unreachable",
            Self::ParseError => "parse_error",
            Self::RateLimited => "rate_limited",
        }
    }
}

impl ConnectorError {
    pub fn kind(&self) -> ConnectorErrorKind {
        match self {
            Self::Timeout(_) => ConnectorErrorKind::Timeout,
            Self::Unreachable(_) => ConnectorErrorKind::Unreachable,
            Self::ParseError(_) => ConnectorErrorKind::ParseError,
            Self::RateLimited(_) => ConnectorErrorKind::RateLimited,
        }
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ConnectorError::Timeout(0);
        }
        if err.status().map(|s| s.as_u16()) == Some(429) {
            return ConnectorError::RateLimited(err.to_string());
        }
        if err.is_decode() {
            return ConnectorError::ParseError(err.to_string());
        }
        ConnectorError::Unreachable(err.to_string())
    }
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::ParseError(err.to_string())
    }
}

impl From<quick_xml::de::DeError> for ConnectorError {
    fn from(err: quick_xml::de::DeError) -> Self {
        ConnectorError::ParseError(err.to_string())
    }
}

/// Remote scorer failure. Triggers the rule-based fallback, never surfaced.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("scoring service unavailable: {0}")]
    Unavailable(String),

    #[error("scoring call timed out")]
    Timeout,

    #[error("malformed scoring response: {0}")]
    Malformed(String),

    #[error("scoring disabled for {0} more seconds after repeated failures")]
    BudgetExhausted(i64),
}

/// Feedback delivery failure. Logged only, never retried.
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("feedback delivery failed: {0}")]
    Delivery(String),

    #[error("feedback endpoint returned status {0}")]
    Status(u16),
}

/// The only way `discover` can fail.
#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("curated catalog unavailable: {0}")]
    CatalogUnavailable(#[source] anyhow::Error),
}
