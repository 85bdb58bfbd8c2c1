//! # Discovery Engine
//! `discover` = throttle admission → crawl → merge/dedup → scoring → ranked feed.
//!
//! Policy per session: one crawl in flight. An automatic trigger joins the
//! running crawl, or is admitted by the throttle, or is served the last
//! result. A manual trigger aborts the running crawl (connectors and scoring
//! pass alike) and starts over; callers waiting on the aborted crawl follow
//! the replacement.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::analyze::ai_adapter::DynAiScorer;
use crate::analyze::ranking::{score_and_rank, ScoringPolicy};
use crate::canon;
use crate::catalog::{CuratedCatalog, CuratedEntry};
use crate::config::engine::EngineConfig;
use crate::error::DiscoverError;
use crate::ingest::types::DynConnector;
use crate::ingest::{run_crawl, CrawlSettings};
use crate::model::{CrawlMeta, Discovery, Profile, Served, Trigger};
use crate::session::{anon_hash, InFlight, ResultRx, Session, SessionRegistry};

struct EngineInner {
    connectors: Vec<DynConnector>,
    scorer: DynAiScorer,
    crawl: CrawlSettings,
    policy: ScoringPolicy,
    auto_min_interval_ms: i64,
}

/// Cheap to clone; all clones share connectors and scorer.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

enum Plan {
    Wait {
        generation: u64,
        rx: ResultRx,
        served: Served,
    },
    Cached(Option<Arc<Discovery>>),
}

impl Engine {
    /// `connectors` are kept in the given order; it is the dedup precedence.
    pub fn new(cfg: &EngineConfig, connectors: Vec<DynConnector>, scorer: DynAiScorer) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                connectors,
                scorer,
                crawl: CrawlSettings::from_config(cfg),
                policy: ScoringPolicy::from_config(cfg),
                auto_min_interval_ms: cfg.auto_trigger_min_interval_ms,
            }),
        }
    }

    pub fn connector_count(&self) -> usize {
        self.inner.connectors.len()
    }

    /// Session factory using this engine's throttle window.
    pub fn new_session(&self, email: &str) -> Arc<Session> {
        Arc::new(Session::new(email, self.inner.auto_min_interval_ms))
    }

    pub fn new_registry(&self) -> SessionRegistry {
        SessionRegistry::new(self.inner.auto_min_interval_ms)
    }

    /// One full crawl + merge + scoring pass, outside any session.
    pub async fn run_once(&self, profile: &Profile, curated: &[CuratedEntry]) -> Discovery {
        let inner = &self.inner;
        let outcome = run_crawl(&inner.connectors, profile, &inner.crawl).await;
        let merged = canon::merge(curated, outcome.batches, Utc::now());
        debug!(
            target: "engine",
            kept = merged.opportunities.len(),
            merged = merged.merged,
            dropped = merged.dropped,
            "merge done"
        );
        let (opportunities, boosted) =
            score_and_rank(merged.opportunities, profile, &inner.policy, inner.scorer.as_ref())
                .await;

        let mut meta = outcome.meta;
        meta.ai_boosted = boosted;
        Discovery {
            opportunities,
            meta,
            served: Served::Fresh,
        }
    }

    /// Curated catalog only, scored and ordered; no connector is touched.
    pub async fn curated_only(&self, profile: &Profile, curated: &[CuratedEntry]) -> Discovery {
        let now = Utc::now();
        let merged = canon::merge(curated, Vec::new(), now);
        let (opportunities, _) = score_and_rank(
            merged.opportunities,
            profile,
            &self.inner.policy,
            self.inner.scorer.as_ref(),
        )
        .await;
        Discovery {
            opportunities,
            meta: CrawlMeta::empty(now),
            served: Served::Cached,
        }
    }

    /// Ranked feed for `profile` within `session`.
    ///
    /// Fails only when the curated catalog cannot be read; connector and
    /// scorer trouble is reported through `meta`.
    pub async fn discover(
        &self,
        session: &Arc<Session>,
        profile: &Profile,
        catalog: &dyn CuratedCatalog,
        trigger: Trigger,
    ) -> Result<Discovery, DiscoverError> {
        let curated = Arc::new(catalog.load().map_err(DiscoverError::CatalogUnavailable)?);
        let sid = anon_hash(session.key());
        if crate::session::session_key(&profile.email) != session.key() {
            warn!(target: "engine", session = %sid, "profile email differs from session key");
        }

        let plan = self.admit(session, profile, &curated, trigger, &sid);

        match plan {
            Plan::Cached(Some(last)) => {
                let mut d = (*last).clone();
                d.served = Served::Cached;
                Ok(d)
            }
            Plan::Cached(None) => Ok(self.curated_only(profile, &curated).await),
            Plan::Wait {
                generation,
                rx,
                served,
            } => match follow(session, generation, rx).await {
                Some((d, switched)) => {
                    let mut d = (*d).clone();
                    d.served = if switched { Served::InFlight } else { served };
                    Ok(d)
                }
                // No result and no replacement crawl (session ended, or the task died).
                None => Ok(self.curated_only(profile, &curated).await),
            },
        }
    }

    /// Admission decision and crawl start, in one critical section per session.
    fn admit(
        &self,
        session: &Arc<Session>,
        profile: &Profile,
        curated: &Arc<Vec<CuratedEntry>>,
        trigger: Trigger,
        sid: &str,
    ) -> Plan {
        let now = Utc::now();
        let mut st = session.lock();

        match trigger {
            Trigger::Auto => {
                // Sender gone without a stored result: the crawl task died.
                if st.inflight.as_ref().is_some_and(|f| f.rx.has_changed().is_err()) {
                    if let Some(dead) = st.inflight.take() {
                        warn!(
                            target: "session",
                            session = %sid,
                            generation = dead.generation,
                            "dead crawl slot cleared"
                        );
                    }
                }
                if let Some(f) = st.inflight.as_ref() {
                    counter!("throttle_coalesced_total", "reason" => "in_flight").increment(1);
                    info!(target: "session", session = %sid, "auto trigger joined running crawl");
                    return Plan::Wait {
                        generation: f.generation,
                        rx: f.rx.clone(),
                        served: Served::InFlight,
                    };
                }
                if !st.throttle.try_admit_auto(now) {
                    counter!("throttle_coalesced_total", "reason" => "window").increment(1);
                    info!(target: "session", session = %sid, "auto trigger throttled");
                    return Plan::Cached(st.last.clone());
                }
            }
            Trigger::Manual => {
                st.throttle.note_manual(now);
                if let Some(old) = st.inflight.take() {
                    old.handle.abort();
                    info!(
                        target: "session",
                        session = %sid,
                        superseded = old.generation,
                        "manual refresh cancelled running crawl"
                    );
                }
            }
        }

        st.generation += 1;
        let generation = st.generation;
        let (tx, rx) = watch::channel(None);

        let engine = self.clone();
        let task_session = Arc::clone(session);
        let task_profile = profile.clone();
        let task_curated = Arc::clone(curated);
        let handle = tokio::spawn(async move {
            let d = Arc::new(engine.run_once(&task_profile, &task_curated).await);
            // A superseded result is dropped with `tx`; waiters follow the replacement.
            if task_session.complete(generation, Arc::clone(&d)) {
                let _ = tx.send(Some(d));
            }
        });

        st.inflight = Some(InFlight {
            generation,
            handle: handle.abort_handle(),
            rx: rx.clone(),
        });
        info!(target: "session", session = %sid, generation, trigger = ?trigger, "crawl started");

        Plan::Wait {
            generation,
            rx,
            served: Served::Fresh,
        }
    }
}

/// Wait for a crawl result. If the crawl is aborted, follow whichever crawl
/// replaced it. `switched` is true when the result came from a replacement.
/// A crawl that died without a replacement has its slot cleared.
async fn follow(
    session: &Session,
    mut generation: u64,
    mut rx: ResultRx,
) -> Option<(Arc<Discovery>, bool)> {
    let mut switched = false;
    loop {
        let res = rx.wait_for(|v| v.is_some()).await.map(|v| (*v).clone());
        match res {
            Ok(Some(d)) => return Some((d, switched)),
            Ok(None) => return None,
            Err(_) => {
                // Sender dropped without a value: aborted, superseded or panicked.
                let published = rx.borrow().clone();
                if let Some(d) = published {
                    return Some((d, switched));
                }
                let (next_gen, next) = session.current()?;
                if next_gen == generation || next.same_channel(&rx) {
                    session.abandon(generation);
                    return None;
                }
                generation = next_gen;
                rx = next;
                switched = true;
            }
        }
    }
}
