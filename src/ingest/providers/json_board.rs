// src/ingest/providers/json_board.rs
//! JSON job-board APIs answering `GET <url>?search=<query>` with
//! `{"jobs": [...]}` or a bare array. Field names vary between boards, so the
//! common spellings are accepted as aliases.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::error::ConnectorError;
use crate::ingest::search_query;
use crate::ingest::types::{Connector, RawListing};
use crate::model::Profile;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BoardResponse {
    Wrapped { jobs: Vec<BoardJob> },
    Bare(Vec<BoardJob>),
}

#[derive(Debug, Deserialize)]
struct BoardJob {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "company_name", alias = "employer")]
    company: Option<String>,
    #[serde(default, alias = "job_type", alias = "type")]
    kind: Option<String>,
    #[serde(default, alias = "skills", alias = "categories")]
    tags: Vec<String>,
    #[serde(default, alias = "link", alias = "apply_url")]
    url: Option<String>,
    /// Boards disagree on zones: RFC 3339, or a bare local timestamp read as UTC.
    #[serde(default, alias = "publication_date", alias = "created_at")]
    posted_at: Option<String>,
}

fn parse_posted_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|n| n.and_utc())
}

pub struct JsonBoardConnector {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl JsonBoardConnector {
    pub fn from_fixture(name: &str, json: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Fixture(json.to_string()),
        }
    }

    pub fn from_url(name: &str, url: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("opportunity-engine/0.1")
            .connect_timeout(Duration::from_secs(4))
            .build()
            .unwrap_or_default();
        Self {
            name: name.to_string(),
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        }
    }

    fn parse_body(&self, body: &str) -> Result<Vec<RawListing>, ConnectorError> {
        let jobs = match serde_json::from_str::<BoardResponse>(body)? {
            BoardResponse::Wrapped { jobs } => jobs,
            BoardResponse::Bare(jobs) => jobs,
        };
        let total = jobs.len();
        let out: Vec<RawListing> = jobs
            .into_iter()
            .filter_map(|j| {
                let title = j.title.filter(|t| !t.trim().is_empty())?;
                Some(RawListing {
                    source: self.name.clone(),
                    title,
                    company: j.company.unwrap_or_default(),
                    kind: j.kind,
                    tags: j.tags,
                    url: j.url,
                    posted_at: j.posted_at.as_deref().and_then(parse_posted_at),
                })
            })
            .collect();
        if out.len() < total {
            tracing::debug!(
                target: "ingest",
                provider = %self.name,
                skipped = total - out.len(),
                "untitled board jobs skipped"
            );
        }
        Ok(out)
    }
}

#[async_trait]
impl Connector for JsonBoardConnector {
    async fn fetch(
        &self,
        profile: &Profile,
        budget: Duration,
    ) -> Result<Vec<RawListing>, ConnectorError> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_body(s),
            Mode::Http { url, client } => {
                let resp = client
                    .get(url)
                    .query(&[("search", search_query(profile))])
                    .timeout(budget)
                    .send()
                    .await?;
                let status = resp.status();
                if status.as_u16() == 429 {
                    let retry = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("?")
                        .to_string();
                    return Err(ConnectorError::RateLimited(format!(
                        "{} returned 429 (retry-after {retry})",
                        self.name
                    )));
                }
                if !status.is_success() {
                    return Err(ConnectorError::Unreachable(format!(
                        "{} returned {}",
                        self.name, status
                    )));
                }
                let body = resp.text().await?;
                self.parse_body(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorErrorKind;
    use chrono::TimeZone;

    #[tokio::test]
    async fn wrapped_and_bare_payloads_parse() {
        let wrapped = r#"{"jobs":[{"title":"SDE Intern","company_name":"Acme","job_type":"internship",
            "tags":["backend"],"url":"https://board.test/1","publication_date":"2025-10-01T00:00:00Z"}]}"#;
        let bare = r#"[{"title":"ML Intern","employer":"Globex","skills":["python"]}]"#;

        let a = JsonBoardConnector::from_fixture("board", wrapped)
            .fetch(&Profile::default(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(a[0].company, "Acme");
        assert_eq!(a[0].kind.as_deref(), Some("internship"));
        assert!(a[0].posted_at.is_some());

        let b = JsonBoardConnector::from_fixture("board", bare)
            .fetch(&Profile::default(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(b[0].company, "Globex");
        assert_eq!(b[0].tags, vec!["python".to_string()]);
    }

    #[tokio::test]
    async fn zone_less_dates_and_untitled_jobs_do_not_sink_the_batch() {
        let body = r#"{"job-count":3,"jobs":[
            {"title":"Backend Intern","company_name":"Remote Co","job_type":"full_time",
             "tags":["go"],"url":"https://remotive.test/1","publication_date":"2020-02-15T10:23:26"},
            {"company_name":"Nameless","url":"https://remotive.test/2"},
            {"title":"Data Intern","company_name":"Stats Inc","publication_date":"not a date"}
        ]}"#;
        let out = JsonBoardConnector::from_fixture("remotive", body)
            .fetch(&Profile::default(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].posted_at,
            Some(Utc.with_ymd_and_hms(2020, 2, 15, 10, 23, 26).unwrap())
        );
        assert_eq!(out[1].title, "Data Intern");
        assert_eq!(out[1].posted_at, None);
    }

    #[test]
    fn posted_at_accepts_common_shapes() {
        assert!(parse_posted_at("2025-10-01T08:00:00+05:30").is_some());
        assert!(parse_posted_at("2025-10-01T08:00:00.123").is_some());
        assert!(parse_posted_at("2025-10-01 08:00:00").is_some());
        assert_eq!(
            parse_posted_at("2025-10-01"),
            Some(Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_posted_at("yesterday"), None);
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let err = JsonBoardConnector::from_fixture("board", r#"{"jobs": 3}"#)
            .fetch(&Profile::default(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ConnectorErrorKind::ParseError);
    }

    #[tokio::test]
    async fn unreachable_host_maps_to_unreachable_or_timeout() {
        let c = JsonBoardConnector::from_url("dead", "http://127.0.0.1:9/jobs");
        let err = c
            .fetch(&Profile::default(), Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            ConnectorErrorKind::Unreachable | ConnectorErrorKind::Timeout
        ));
    }
}
