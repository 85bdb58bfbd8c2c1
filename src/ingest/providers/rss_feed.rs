// src/ingest/providers/rss_feed.rs
//! RSS job feeds. Titles are usually "Role at Company" or "Company - Role";
//! `<category>` elements become tags.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::canon::normalize_text;
use crate::error::ConnectorError;
use crate::ingest::search_query;
use crate::ingest::types::{Connector, RawListing};
use crate::model::Profile;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    company: Option<String>,
    #[serde(rename = "type")]
    job_type: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0))
}

/// Split "SDE Intern at Acme" / "Acme - SDE Intern" into (title, company).
fn split_title(raw: &str) -> (String, String) {
    let t = normalize_text(raw);
    if let Some(pos) = t.to_ascii_lowercase().rfind(" at ") {
        let (role, company) = t.split_at(pos);
        return (role.trim().to_string(), company[4..].trim().to_string());
    }
    if let Some((company, role)) = t.split_once(" - ") {
        return (role.trim().to_string(), company.trim().to_string());
    }
    (t, String::new())
}

pub struct RssFeedConnector {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeedConnector {
    pub fn from_fixture(name: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Http {
                url: url.to_string(),
                client: reqwest::Client::new(),
            },
        }
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<RawListing>, ConnectorError> {
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean)?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let (title, split_company) = split_title(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let company = it
                .company
                .as_deref()
                .map(normalize_text)
                .filter(|c| !c.is_empty())
                .unwrap_or(split_company);
            out.push(RawListing {
                source: self.name.clone(),
                title,
                company,
                kind: it.job_type,
                tags: it.categories,
                url: it.link,
                posted_at: it.pub_date.as_deref().and_then(parse_rfc2822),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl Connector for RssFeedConnector {
    async fn fetch(
        &self,
        profile: &Profile,
        budget: Duration,
    ) -> Result<Vec<RawListing>, ConnectorError> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http { url, client } => {
                let resp = client
                    .get(url)
                    .query(&[("q", search_query(profile))])
                    .timeout(budget)
                    .send()
                    .await?;
                let status = resp.status();
                if status.as_u16() == 429 {
                    return Err(ConnectorError::RateLimited(format!("{} returned 429", self.name)));
                }
                if !status.is_success() {
                    return Err(ConnectorError::Unreachable(format!(
                        "{} returned {}",
                        self.name, status
                    )));
                }
                let body = resp.text().await?;
                self.parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
