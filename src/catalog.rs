// src/catalog.rs
//! Curated catalog access. The catalog is owned by an external content
//! collaborator; the engine only reads it at call time.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CuratedEntry {
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// `None` or `"#"`: apply via the curated portal.
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

fn default_kind() -> String {
    "internship".to_string()
}

/// Read-only source of curated entries. A failing `load` is the only fatal
/// error of a discovery run.
pub trait CuratedCatalog: Send + Sync {
    fn load(&self) -> Result<Vec<CuratedEntry>>;
}

pub type DynCatalog = Arc<dyn CuratedCatalog>;

/// In-memory catalog handed over by the caller.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: Vec<CuratedEntry>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<CuratedEntry>) -> Self {
        Self { entries }
    }
}

impl CuratedCatalog for StaticCatalog {
    fn load(&self) -> Result<Vec<CuratedEntry>> {
        Ok(self.entries.clone())
    }
}

/// JSON array of entries on disk, re-read on every call so edits by the
/// content collaborator show up without a restart.
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CuratedCatalog for JsonFileCatalog {
    fn load(&self) -> Result<Vec<CuratedEntry>> {
        let s = fs::read_to_string(&self.path)
            .with_context(|| format!("reading curated catalog from {}", self.path.display()))?;
        let entries: Vec<CuratedEntry> = serde_json::from_str(&s)
            .with_context(|| format!("parsing curated catalog {}", self.path.display()))?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_catalog_reads_entries_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("catalog.json");
        fs::write(
            &p,
            r#"[{"id":"c1","title":"Frontend Intern","company":"KEC","tags":["frontend"]}]"#,
        )
        .unwrap();
        let entries = JsonFileCatalog::new(&p).load().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, "internship");
        assert_eq!(entries[0].source_url, None);
    }

    #[test]
    fn missing_catalog_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonFileCatalog::new(dir.path().join("nope.json")).load();
        assert!(err.is_err());
    }
}
