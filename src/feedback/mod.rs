// src/feedback/mod.rs
//! Fire-and-forget interaction feedback.
//!
//! `record` only enqueues into a bounded channel and returns; a detached
//! worker delivers events one attempt each. A full queue drops the event.
//! Failures are logged and counted, never surfaced, never retried.

pub mod http;

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::error::FeedbackError;
use crate::model::{FeedbackAction, FeedbackEvent};
use crate::session::anon_hash;

pub use http::HttpFeedbackSink;

#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn deliver(&self, ev: &FeedbackEvent) -> Result<(), FeedbackError>;
    fn name(&self) -> &'static str;
}

pub type DynFeedbackSink = Arc<dyn FeedbackSink>;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feedback_recorded_total", "Feedback events enqueued.");
        describe_counter!(
            "feedback_dropped_total",
            "Feedback events dropped (queue full, closed, or invalid)."
        );
        describe_counter!(
            "feedback_delivery_failures_total",
            "Feedback deliveries that failed."
        );
    });
}

pub struct FeedbackCollector {
    tx: mpsc::Sender<FeedbackEvent>,
    dropped: Arc<AtomicU64>,
    worker: JoinHandle<()>,
}

impl FeedbackCollector {
    /// Start the delivery worker. Must be called inside a Tokio runtime.
    pub fn spawn(sink: DynFeedbackSink, capacity: usize) -> Self {
        ensure_metrics_described();
        let (tx, mut rx) = mpsc::channel::<FeedbackEvent>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                match sink.deliver(&ev).await {
                    Ok(()) => tracing::debug!(
                        target: "feedback",
                        sink = sink.name(),
                        action = %ev.action,
                        "feedback delivered"
                    ),
                    Err(e) => {
                        counter!("feedback_delivery_failures_total").increment(1);
                        tracing::warn!(
                            target: "feedback",
                            sink = sink.name(),
                            user = %anon_hash(&ev.email),
                            error = %e,
                            "feedback delivery failed"
                        );
                    }
                }
            }
        });
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            worker,
        }
    }

    /// Enqueue one event. Never blocks, never fails.
    pub fn record(&self, email: &str, opportunity_id: &str, action: FeedbackAction) {
        if email.trim().is_empty() || opportunity_id.trim().is_empty() {
            tracing::debug!(target: "feedback", "feedback without email or opportunity id ignored");
            self.note_drop("invalid");
            return;
        }
        let ev = FeedbackEvent {
            email: email.trim().to_string(),
            opportunity_id: opportunity_id.trim().to_string(),
            action,
            timestamp: Utc::now(),
        };
        match self.tx.try_send(ev) {
            Ok(()) => counter!("feedback_recorded_total").increment(1),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(target: "feedback", "feedback queue full; event dropped");
                self.note_drop("full");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(target: "feedback", "feedback worker gone; event dropped");
                self.note_drop("closed");
            }
        }
    }

    fn note_drop(&self, reason: &'static str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        counter!("feedback_dropped_total", "reason" => reason).increment(1);
    }

    /// Events dropped since start.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting events and wait until the queue has drained.
    pub async fn shutdown(self) {
        let Self { tx, worker, .. } = self;
        drop(tx);
        if let Err(e) = worker.await {
            tracing::warn!(target: "feedback", error = %e, "feedback worker ended abnormally");
        }
    }
}
