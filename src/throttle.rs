// src/throttle.rs
use chrono::{DateTime, Duration, Utc};

/// Minimum-interval gate for automatically triggered crawls, one per session.
/// - First automatic trigger always admitted.
/// - Inside the window, automatic triggers are refused.
/// - `try_admit_auto` checks and records in one step; callers hold the
///   session lock around it so concurrent triggers cannot both pass.
/// - Manual refreshes skip the check but restart the window (`note_manual`).
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last_auto_trigger_at: Option<DateTime<Utc>>,
}

impl Throttle {
    /// `min_interval_ms` < 0 is treated as 0 (no throttling).
    pub fn new(min_interval_ms: i64) -> Self {
        Self {
            min_interval: Duration::milliseconds(min_interval_ms.max(0)),
            last_auto_trigger_at: None,
        }
    }

    /// Whether an automatic trigger at `now` would be admitted. Does NOT mutate state.
    pub fn would_admit(&self, now: DateTime<Utc>) -> bool {
        match self.last_auto_trigger_at {
            None => true,
            Some(ts) => now.signed_duration_since(ts) >= self.min_interval,
        }
    }

    /// Admit an automatic trigger, recording `now` before any crawl starts.
    pub fn try_admit_auto(&mut self, now: DateTime<Utc>) -> bool {
        if !self.would_admit(now) {
            return false;
        }
        self.last_auto_trigger_at = Some(now);
        true
    }

    /// A manual refresh just fetched fresh data; restart the window from `now`.
    pub fn note_manual(&mut self, now: DateTime<Utc>) {
        self.last_auto_trigger_at = Some(now);
    }

    /// Session end.
    pub fn clear(&mut self) {
        self.last_auto_trigger_at = None;
    }

    pub fn last_auto_trigger_at(&self) -> Option<DateTime<Utc>> {
        self.last_auto_trigger_at
    }
}
