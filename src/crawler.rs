//! Crawler client and response normalization.
//!
//! The crawl service may answer with a bare string, a list, or an object
//! wrapping a list under `results`, `data` or `documents`. List items may in
//! turn be strings or records carrying `raw_content`, `content` or `text`
//! plus an optional `url`. [`normalize_response`] maps every one of those
//! shapes onto [`Document`]s; unrecognized shapes produce no documents
//! rather than an error.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use crate::config::CrawlerConfig;
use crate::models::Document;

/// Fetches the documents reachable from a seed URL.
#[async_trait]
pub trait Crawler: Send + Sync {
    async fn crawl(&self, url: &str, max_depth: u32, extract_depth: &str) -> Result<Vec<Document>>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CrawlPayload {
    Text(String),
    Items(Vec<CrawlItem>),
    Envelope(CrawlEnvelope),
    Other(IgnoredAny),
}

#[derive(Debug, Default, Deserialize)]
struct CrawlEnvelope {
    #[serde(default)]
    results: Option<Vec<CrawlItem>>,
    #[serde(default)]
    data: Option<Vec<CrawlItem>>,
    #[serde(default)]
    documents: Option<Vec<CrawlItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CrawlItem {
    Text(String),
    Record(CrawlRecord),
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct CrawlRecord {
    #[serde(default, alias = "rawContent")]
    raw_content: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Normalize a crawl response into documents, dropping empty content.
pub fn normalize_response(response: Value, seed_url: &str) -> Vec<Document> {
    let payload: CrawlPayload =
        serde_json::from_value(response).unwrap_or(CrawlPayload::Other(IgnoredAny));

    let items = match payload {
        CrawlPayload::Text(text) => vec![CrawlItem::Text(text)],
        CrawlPayload::Items(items) => items,
        CrawlPayload::Envelope(env) => [env.results, env.data, env.documents]
            .into_iter()
            .flatten()
            .find(|items| !items.is_empty())
            .unwrap_or_default(),
        CrawlPayload::Other(_) => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            CrawlItem::Text(content) => Some(Document::new(seed_url, content)),
            CrawlItem::Record(record) => {
                let content = [record.raw_content, record.content, record.text]
                    .into_iter()
                    .flatten()
                    .find(|c| !c.is_empty())?;
                let source = record
                    .url
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| seed_url.to_string());
                Some(Document::new(source, content))
            }
            CrawlItem::Other(_) => None,
        })
        .filter(|doc| !doc.content.is_empty())
        .collect()
}

/// Client for the Tavily crawl API.
pub struct TavilyCrawler {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl TavilyCrawler {
    pub fn new(config: &CrawlerConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Crawler for TavilyCrawler {
    async fn crawl(&self, url: &str, max_depth: u32, extract_depth: &str) -> Result<Vec<Document>> {
        info!(url, max_depth, extract_depth, "crawl started");

        let body = serde_json::json!({
            "url": url,
            "max_depth": max_depth,
            "extract_depth": extract_depth,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("crawl API error {}: {}", status, body_text);
        }

        let json: Value = response.json().await?;
        let documents = normalize_response(json, url);

        info!(documents = documents.len(), "crawl completed");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SEED: &str = "https://docs.example.com/";

    #[test]
    fn test_string_response() {
        let docs = normalize_response(json!("whole site text"), SEED);
        assert_eq!(docs, vec![Document::new(SEED, "whole site text")]);
    }

    #[test]
    fn test_list_of_strings() {
        let docs = normalize_response(json!(["a", "", "b"]), SEED);
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.source == SEED));
    }

    #[test]
    fn test_results_envelope_with_records() {
        let response = json!({
            "base_url": SEED,
            "results": [
                {"url": "https://docs.example.com/a", "raw_content": "page a"},
                {"url": "https://docs.example.com/b", "raw_content": "", "content": "page b"},
                {"url": "https://docs.example.com/c", "text": "page c"},
                {"url": "https://docs.example.com/d"},
                {"raw_content": "no url"},
                {"url": "https://docs.example.com/e", "rawContent": "page e"}
            ]
        });
        let docs = normalize_response(response, SEED);
        assert_eq!(
            docs,
            vec![
                Document::new("https://docs.example.com/a", "page a"),
                Document::new("https://docs.example.com/b", "page b"),
                Document::new("https://docs.example.com/c", "page c"),
                Document::new(SEED, "no url"),
                Document::new("https://docs.example.com/e", "page e"),
            ]
        );
    }

    #[test]
    fn test_envelope_falls_through_empty_lists() {
        let response = json!({"results": [], "documents": [{"content": "x", "url": "u"}]});
        let docs = normalize_response(response, SEED);
        assert_eq!(docs, vec![Document::new("u", "x")]);
    }

    #[test]
    fn test_unrecognized_shapes_yield_nothing() {
        assert!(normalize_response(json!(42), SEED).is_empty());
        assert!(normalize_response(json!(null), SEED).is_empty());
        assert!(normalize_response(json!({"error": "nope"}), SEED).is_empty());
        assert!(normalize_response(json!([1, true, null]), SEED).is_empty());
    }
}
