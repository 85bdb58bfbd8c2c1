use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::FeedbackSink;
use crate::error::FeedbackError;
use crate::model::FeedbackEvent;

/// Posts events to `{base}/ml/feedback`. One attempt per event.
#[derive(Clone)]
pub struct HttpFeedbackSink {
    endpoint: String,
    client: Client,
    timeout: Duration,
}

impl HttpFeedbackSink {
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: format!("{}/ml/feedback", base_url.trim_end_matches('/')),
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl FeedbackSink for HttpFeedbackSink {
    async fn deliver(&self, ev: &FeedbackEvent) -> Result<(), FeedbackError> {
        let rsp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(ev)
            .send()
            .await
            .map_err(|e| FeedbackError::Delivery(e.to_string()))?;
        if !rsp.status().is_success() {
            return Err(FeedbackError::Status(rsp.status().as_u16()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
