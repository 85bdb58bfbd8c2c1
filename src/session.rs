// src/session.rs
//! Per-session discovery state: the throttle window, the crawl currently in
//! flight and the last completed result. Created at session start, cleared at
//! session end. Nothing here is process-global; the registry is owned by the
//! caller (the HTTP layer keeps one in its state).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::model::Discovery;
use crate::throttle::Throttle;

pub(crate) type ResultRx = watch::Receiver<Option<Arc<Discovery>>>;

/// Short, non-reversible id for log lines. Never log raw emails.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.trim().to_lowercase().as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub(crate) fn session_key(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) struct InFlight {
    pub generation: u64,
    pub handle: AbortHandle,
    pub rx: ResultRx,
}

pub(crate) struct SessionState {
    pub throttle: Throttle,
    pub generation: u64,
    pub inflight: Option<InFlight>,
    pub last: Option<Arc<Discovery>>,
    /// Last time a request named this session.
    pub last_seen: DateTime<Utc>,
}

/// Discovery context of one authenticated session.
pub struct Session {
    key: String,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(email: &str, auto_min_interval_ms: i64) -> Self {
        Self {
            key: session_key(email),
            state: Mutex::new(SessionState {
                throttle: Throttle::new(auto_min_interval_ms),
                generation: 0,
                inflight: None,
                last: None,
                last_seen: Utc::now(),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    pub fn is_crawling(&self) -> bool {
        self.lock().inflight.is_some()
    }

    pub(crate) fn touch(&self, now: DateTime<Utc>) {
        self.lock().last_seen = now;
    }

    /// Idle for at least `max_idle` at `now`, with no crawl running.
    fn is_idle(&self, max_idle: chrono::Duration, now: DateTime<Utc>) -> bool {
        let st = self.lock();
        st.inflight.is_none() && now - st.last_seen >= max_idle
    }

    /// Last completed result, if any.
    pub fn last_result(&self) -> Option<Arc<Discovery>> {
        self.lock().last.clone()
    }

    /// Store a finished crawl unless it was superseded or the session ended.
    pub(crate) fn complete(&self, generation: u64, result: Arc<Discovery>) -> bool {
        let mut st = self.lock();
        let current = st
            .inflight
            .as_ref()
            .is_some_and(|f| f.generation == generation);
        if !current {
            debug!(target: "session", generation, "stale crawl result discarded");
            return false;
        }
        st.inflight = None;
        st.last = Some(result);
        true
    }

    /// Generation and receiver of whatever crawl is in flight now.
    pub(crate) fn current(&self) -> Option<(u64, ResultRx)> {
        self.lock()
            .inflight
            .as_ref()
            .map(|f| (f.generation, f.rx.clone()))
    }

    /// Clear the in-flight slot of a crawl that ended without a result.
    pub(crate) fn abandon(&self, generation: u64) -> bool {
        let mut st = self.lock();
        if st.inflight.as_ref().is_some_and(|f| f.generation == generation) {
            st.inflight = None;
            warn!(target: "session", generation, "crawl ended without a result");
            return true;
        }
        false
    }

    /// Session end: cancel the in-flight crawl and forget everything.
    pub fn end(&self) {
        let mut st = self.lock();
        if let Some(f) = st.inflight.take() {
            f.handle.abort();
        }
        st.generation += 1;
        st.throttle.clear();
        st.last = None;
        info!(target: "session", session = %anon_hash(&self.key), "session ended");
    }
}

/// Live sessions by email.
pub struct SessionRegistry {
    auto_min_interval_ms: i64,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(auto_min_interval_ms: i64) -> Self {
        Self {
            auto_min_interval_ms,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        match self.sessions.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Existing session for `email`, or a fresh one.
    pub fn start(&self, email: &str) -> Arc<Session> {
        let key = session_key(email);
        let mut map = self.lock();
        let session = map
            .entry(key)
            .or_insert_with(|| {
                info!(target: "session", session = %anon_hash(email), "session started");
                Arc::new(Session::new(email, self.auto_min_interval_ms))
            })
            .clone();
        session.touch(Utc::now());
        session
    }

    pub fn get(&self, email: &str) -> Option<Arc<Session>> {
        self.lock().get(&session_key(email)).cloned()
    }

    /// Returns `false` when no such session existed.
    pub fn end(&self, email: &str) -> bool {
        let removed = self.lock().remove(&session_key(email));
        match removed {
            Some(s) => {
                s.end();
                true
            }
            None => false,
        }
    }

    /// End and drop every session idle for `max_idle` at `now`. Sessions with
    /// a crawl in flight are kept. Returns how many were removed.
    pub fn sweep_idle(&self, max_idle: chrono::Duration, now: DateTime<Utc>) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, s| {
            if s.is_idle(max_idle, now) {
                s.end();
                false
            } else {
                true
            }
        });
        let removed = before - map.len();
        if removed > 0 {
            info!(target: "session", removed, remaining = map.len(), "idle sessions expired");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodically expire idle sessions. A zero `ttl` disables the sweep and
/// returns `None`. Must run inside a Tokio runtime.
pub fn spawn_idle_sweeper(
    registry: Arc<SessionRegistry>,
    ttl: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    if ttl.is_zero() {
        return None;
    }
    let max_idle = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    // Check a few times per TTL, but never busier than once a second.
    let every = (ttl / 4).max(Duration::from_secs(1));
    Some(tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            registry.sweep_idle(max_idle, Utc::now());
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_keys_are_case_insensitive() {
        let reg = SessionRegistry::new(60_000);
        let a = reg.start("Student@KEC.edu ");
        let b = reg.start("student@kec.edu");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
        assert!(reg.end("STUDENT@kec.edu"));
        assert!(reg.is_empty());
        assert!(!reg.end("student@kec.edu"));
    }

    #[test]
    fn end_clears_throttle_and_cache() {
        let s = Session::new("a@b.c", 60_000);
        {
            let mut st = s.lock();
            assert!(st.throttle.try_admit_auto(chrono::Utc::now()));
        }
        s.end();
        let st = s.lock();
        assert!(st.throttle.last_auto_trigger_at().is_none());
        assert!(st.last.is_none());
        assert_eq!(st.generation, 1);
    }

    #[test]
    fn anon_hash_is_stable_and_short() {
        assert_eq!(anon_hash("A@b.c"), anon_hash(" a@b.c"));
        assert_eq!(anon_hash("a@b.c").len(), 12);
    }

    #[test]
    fn sweep_drops_only_idle_sessions() {
        let reg = SessionRegistry::new(60_000);
        let t0 = Utc::now();
        let stale = reg.start("stale@kec.edu");
        stale.touch(t0 - chrono::Duration::minutes(45));
        reg.start("fresh@kec.edu").touch(t0 - chrono::Duration::minutes(5));

        let removed = reg.sweep_idle(chrono::Duration::minutes(30), t0);

        assert_eq!(removed, 1);
        assert_eq!(reg.len(), 1);
        assert!(reg.get("stale@kec.edu").is_none());
        assert!(reg.get("fresh@kec.edu").is_some());
        assert_eq!(stale.lock().generation, 1, "expired session was ended");
    }

    #[tokio::test]
    async fn sweep_keeps_sessions_with_a_running_crawl() {
        let reg = SessionRegistry::new(60_000);
        let t0 = Utc::now();
        let busy = reg.start("busy@kec.edu");
        let task = tokio::spawn(std::future::pending::<()>());
        {
            let (_tx, rx) = watch::channel(None);
            let mut st = busy.lock();
            st.last_seen = t0 - chrono::Duration::hours(2);
            st.generation = 1;
            st.inflight = Some(InFlight {
                generation: 1,
                handle: task.abort_handle(),
                rx,
            });
        }

        assert_eq!(reg.sweep_idle(chrono::Duration::minutes(30), t0), 0);
        assert!(reg.get("busy@kec.edu").is_some());
        task.abort();
    }

    #[tokio::test]
    async fn superseded_generation_cannot_complete() {
        let s = Session::new("a@b.c", 60_000);
        let task = tokio::spawn(std::future::pending::<()>());
        let (_tx, rx) = watch::channel(None);
        {
            let mut st = s.lock();
            st.generation = 2;
            st.inflight = Some(InFlight {
                generation: 2,
                handle: task.abort_handle(),
                rx,
            });
        }
        let d = Arc::new(Discovery {
            opportunities: Vec::new(),
            meta: crate::model::CrawlMeta::empty(Utc::now()),
            served: crate::model::Served::Fresh,
        });

        assert!(!s.complete(1, Arc::clone(&d)));
        assert!(s.is_crawling());
        assert!(s.last_result().is_none());

        assert!(s.complete(2, d));
        assert!(!s.is_crawling());
        assert!(s.last_result().is_some());
        task.abort();
    }

    #[tokio::test]
    async fn sweeper_task_expires_stale_sessions() {
        let reg = Arc::new(SessionRegistry::new(60_000));
        reg.start("gone@kec.edu")
            .touch(Utc::now() - chrono::Duration::hours(1));

        assert!(spawn_idle_sweeper(Arc::clone(&reg), Duration::ZERO).is_none());
        let task = spawn_idle_sweeper(Arc::clone(&reg), Duration::from_secs(30 * 60)).unwrap();

        // First tick fires immediately.
        for _ in 0..100 {
            if reg.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(reg.is_empty());
        task.abort();
    }
}
