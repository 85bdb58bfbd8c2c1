// src/model.rs
//! Records produced and consumed by the engine: `Opportunity`, `CrawlMeta`,
//! the caller-owned `Profile` and the ephemeral `FeedbackEvent`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ConnectorErrorKind;

/// `source_url` value meaning "apply via the curated portal".
pub const CURATED_PORTAL_SENTINEL: &str = "#";

/// Provenance of an opportunity's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchMethod {
    #[serde(rename = "curated")]
    Curated,
    #[serde(rename = "rule")]
    Rule,
    #[serde(rename = "ai-boosted")]
    AiBoosted,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Curated => "curated",
            Self::Rule => "rule",
            Self::AiBoosted => "ai-boosted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub title: String,
    pub company: String,
    /// internship / placement / job ...
    #[serde(rename = "type")]
    pub kind: String,
    pub tags: BTreeSet<String>,
    pub source_url: String,
    pub match_score: f32,
    pub match_method: MatchMethod,
    pub discovered_at: DateTime<Utc>,
    /// Connector that produced a crawled entry; `None` for curated ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Opportunity {
    pub fn is_curated(&self) -> bool {
        self.match_method == MatchMethod::Curated
    }

    /// Crawled during this run rather than taken from the catalog.
    pub fn is_live(&self) -> bool {
        !self.is_curated()
    }

    pub fn has_portal_url(&self) -> bool {
        self.source_url.trim().is_empty() || self.source_url.trim() == CURATED_PORTAL_SENTINEL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlStatus {
    Success,
    PartialSuccess,
    Failure,
}

impl CrawlStatus {
    /// Zero attempted connectors counts as `Success`: nothing failed.
    pub fn from_counts(attempted: usize, failed: usize) -> Self {
        if failed == 0 {
            CrawlStatus::Success
        } else if failed < attempted {
            CrawlStatus::PartialSuccess
        } else {
            CrawlStatus::Failure
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlError {
    pub source: String,
    pub kind: ConnectorErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlMeta {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub sources_attempted: usize,
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    pub errors: Vec<CrawlError>,
    pub status: CrawlStatus,
    /// Results whose score came from the remote scorer.
    #[serde(default)]
    pub ai_boosted: usize,
}

impl CrawlMeta {
    /// Meta for a run that did not touch any connector.
    pub fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            duration_ms: 0,
            sources_attempted: 0,
            sources_succeeded: 0,
            sources_failed: 0,
            errors: Vec::new(),
            status: CrawlStatus::Success,
            ai_boosted: 0,
        }
    }
}

/// Requester profile. Owned by the caller, read-only here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Session key for throttling; also the feedback identity.
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

impl Profile {
    /// Skills and interests, normalized into one tag set.
    pub fn tags(&self) -> BTreeSet<String> {
        self.skills
            .iter()
            .chain(self.interests.iter())
            .map(|t| crate::canon::normalize_tag(t))
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Applied,
    Liked,
    Clicked,
    Viewed,
}

impl FeedbackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Liked => "liked",
            Self::Clicked => "clicked",
            Self::Viewed => "viewed",
        }
    }
}

impl fmt::Display for FeedbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "applied" => Ok(Self::Applied),
            "liked" => Ok(Self::Liked),
            "clicked" => Ok(Self::Clicked),
            "viewed" => Ok(Self::Viewed),
            other => anyhow::bail!("unknown feedback action: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub email: String,
    pub opportunity_id: String,
    pub action: FeedbackAction,
    pub timestamp: DateTime<Utc>,
}

/// How a discovery request was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Dashboard load / login. Subject to the throttle window.
    #[default]
    Auto,
    /// Explicit refresh. Always admitted, supersedes an in-flight crawl.
    Manual,
}

/// Where a `Discovery` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Served {
    /// A crawl started by this request.
    Fresh,
    /// Coalesced onto a crawl already running for the session.
    InFlight,
    /// Throttled; the session's last result (or curated-only feed).
    Cached,
}

/// Ranked feed plus crawl provenance, as handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub opportunities: Vec<Opportunity>,
    pub meta: CrawlMeta,
    pub served: Served,
}
