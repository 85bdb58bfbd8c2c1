// src/canon.rs
//! Canonicalization and deduplication.
//!
//! Every record gets a title/company key, plus a URL key (host+path) when it
//! links somewhere other than the curated portal. Two records are duplicates
//! when any of their keys collide. Curated entries are inserted first and keep
//! their identity; crawled duplicates keep the first-seen listing (connector
//! registration order) and union their tags into it.

use chrono::{DateTime, Utc};
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

use crate::catalog::CuratedEntry;
use crate::ingest::types::RawListing;
use crate::model::{MatchMethod, Opportunity, CURATED_PORTAL_SENTINEL};

/// Normalize text: decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // Length cap: 300 chars (titles / company names only)
    if out.chars().count() > 300 {
        out = out.chars().take(300).collect();
    }
    out
}

/// Lowercased, whitespace-collapsed tag. `"  Machine  Learning "` -> `"machine learning"`.
pub fn normalize_tag(s: &str) -> String {
    normalize_text(s).to_lowercase()
}

/// Lowercase, punctuation folded to spaces, whitespace collapsed.
fn key_part(s: &str) -> String {
    let lowered = normalize_text(s).to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut prev_space = true;
    for ch in lowered.chars() {
        if ch.is_alphanumeric() || ch == '+' || ch == '#' {
            out.push(ch);
            prev_space = false;
        } else if !prev_space {
            out.push(' ');
            prev_space = true;
        }
    }
    out.trim_end().to_string()
}

pub fn title_company_key(title: &str, company: &str) -> String {
    format!("tc:{}|{}", key_part(title), key_part(company))
}

/// `url:<host><path>` with `www.`, query, fragment and trailing slash dropped.
/// `None` for the portal sentinel, blanks and unparseable values.
pub fn url_key(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == CURATED_PORTAL_SENTINEL {
        return None;
    }
    let parsed = url::Url::parse(raw)
        .or_else(|_| url::Url::parse(&format!("https://{raw}")))
        .ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let path = parsed.path().trim_end_matches('/').to_lowercase();
    Some(format!("url:{host}{path}"))
}

/// All identity keys of a record. The first one is the canonical key.
pub fn identity_keys(title: &str, company: &str, source_url: &str) -> Vec<String> {
    let tc = title_company_key(title, company);
    match url_key(source_url) {
        Some(u) => vec![u, tc],
        None => vec![tc],
    }
}

/// URL key when present, otherwise the title/company key.
pub fn canonical_key(o: &Opportunity) -> String {
    url_key(&o.source_url).unwrap_or_else(|| title_company_key(&o.title, &o.company))
}

/// Stable id for a crawled record, derived from its canonical key.
pub fn live_id(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut out = String::from("live-");
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub opportunities: Vec<Opportunity>,
    /// Crawled listings folded into an existing record.
    pub merged: usize,
    /// Listings dropped because they had no usable title.
    pub dropped: usize,
}

struct Merger {
    out: Vec<Opportunity>,
    by_key: HashMap<String, usize>,
    ids: HashSet<String>,
    merged: usize,
    dropped: usize,
}

impl Merger {
    fn new() -> Self {
        Self {
            out: Vec::new(),
            by_key: HashMap::new(),
            ids: HashSet::new(),
            merged: 0,
            dropped: 0,
        }
    }

    fn find(&self, keys: &[String]) -> Option<usize> {
        keys.iter().find_map(|k| self.by_key.get(k).copied())
    }

    fn register(&mut self, keys: Vec<String>, idx: usize) {
        for k in keys {
            self.by_key.entry(k).or_insert(idx);
        }
    }

    fn push_curated(&mut self, entry: &CuratedEntry, now: DateTime<Utc>) {
        let title = normalize_text(&entry.title);
        let company = normalize_text(&entry.company);
        let source_url = entry
            .source_url
            .clone()
            .unwrap_or_else(|| CURATED_PORTAL_SENTINEL.to_string());
        let keys = identity_keys(&title, &company, &source_url);

        if let Some(existing) = self.find(&keys) {
            warn!(
                target: "canon",
                id = %entry.id,
                kept = %self.out[existing].id,
                "duplicate curated entry skipped"
            );
            self.register(keys, existing);
            return;
        }
        if !self.ids.insert(entry.id.clone()) {
            warn!(target: "canon", id = %entry.id, "curated id reused; entry skipped");
            return;
        }

        let idx = self.out.len();
        self.out.push(Opportunity {
            id: entry.id.clone(),
            title,
            company,
            kind: entry.kind.clone(),
            tags: entry.tags.iter().map(|t| normalize_tag(t)).filter(|t| !t.is_empty()).collect(),
            source_url,
            match_score: 0.0,
            match_method: MatchMethod::Curated,
            discovered_at: entry.added_at.unwrap_or(now),
            source: None,
        });
        self.register(keys, idx);
    }

    fn push_crawled(&mut self, raw: RawListing, now: DateTime<Utc>) {
        let title = normalize_text(&raw.title);
        if title.is_empty() {
            self.dropped += 1;
            return;
        }
        let company = normalize_text(&raw.company);
        let source_url = raw
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(CURATED_PORTAL_SENTINEL)
            .to_string();
        let tags: BTreeSet<String> = raw
            .tags
            .iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty())
            .collect();
        let keys = identity_keys(&title, &company, &source_url);

        if let Some(existing) = self.find(&keys) {
            self.merged += 1;
            let kept = &mut self.out[existing];
            // Curated records are trusted as-is.
            if !kept.is_curated() {
                kept.tags.extend(tags);
            }
            debug!(target: "canon", kept = %kept.id, source = %raw.source, "duplicate merged");
            self.register(keys, existing);
            return;
        }

        let mut id = live_id(&keys[0]);
        let mut n = 1;
        while self.ids.contains(&id) {
            n += 1;
            id = format!("{}-{n}", live_id(&keys[0]));
        }
        self.ids.insert(id.clone());

        let kind = raw
            .kind
            .as_deref()
            .map(normalize_tag)
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| "job".to_string());

        // Source posting date when known; future dates are clamped to `now`.
        let discovered_at = raw.posted_at.filter(|t| *t <= now).unwrap_or(now);

        let idx = self.out.len();
        self.out.push(Opportunity {
            id,
            title,
            company,
            kind,
            tags,
            source_url,
            match_score: 0.0,
            match_method: MatchMethod::Rule,
            discovered_at,
            source: Some(raw.source),
        });
        self.register(keys, idx);
    }
}

/// Merge the curated catalog with crawled batches.
///
/// `batches` must be in connector registration order; the result does not
/// depend on the order in which connectors finished.
pub fn merge(
    curated: &[CuratedEntry],
    batches: Vec<Vec<RawListing>>,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let mut m = Merger::new();
    for entry in curated {
        m.push_curated(entry, now);
    }
    for batch in batches {
        for raw in batch {
            m.push_crawled(raw, now);
        }
    }

    counter!("dedup_merged_total").increment(m.merged as u64);

    MergeOutcome {
        opportunities: m.out,
        merged: m.merged,
        dropped: m.dropped,
    }
}
