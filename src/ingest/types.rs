// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConnectorError;
use crate::model::Profile;

/// A posting as a connector saw it, before canonicalization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawListing {
    pub source: String, // connector name
    pub title: String,
    pub company: String,
    pub kind: Option<String>,
    pub tags: Vec<String>,
    pub url: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

/// One external source of postings. Implementations must not share mutable
/// state with each other; the orchestrator runs them concurrently.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Produce zero or more postings within `budget`.
    async fn fetch(
        &self,
        profile: &Profile,
        budget: Duration,
    ) -> Result<Vec<RawListing>, ConnectorError>;

    fn name(&self) -> &str;
}

pub type DynConnector = Arc<dyn Connector>;
