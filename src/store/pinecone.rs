//! Pinecone REST adapter.
//!
//! Talks to the index data plane directly:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | add / upsert | `POST /vectors/upsert` |
//! | delete | `POST /vectors/delete` |
//! | list ids | `GET /vectors/list` (paginated) |
//! | fetch metadata | `GET /vectors/fetch` |
//! | stats | `POST /describe_index_stats` |
//!
//! The record id is the chunk id, so add and upsert are both overwrite-safe
//! upserts. Chunk content is embedded right before it is written.
//!
//! When no data-plane host is configured it is resolved once from the
//! control plane (`GET https://api.pinecone.io/indexes/{name}`).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{Credentials, StoreConfig};
use crate::embedding::EmbeddingProvider;
use crate::models::Chunk;

use super::{IdPage, RecordMeta, StoreStats, VectorStore};

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2025-01";

pub struct PineconeStore {
    client: reqwest::Client,
    host: String,
    api_key: String,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl PineconeStore {
    /// Connect to the configured index, resolving its host if needed.
    pub async fn connect(
        config: &StoreConfig,
        credentials: &Credentials,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let host = match &config.host {
            Some(host) => host.clone(),
            None => {
                resolve_host(&client, &credentials.pinecone_api_key, &credentials.pinecone_index)
                    .await?
            }
        };

        Ok(Self {
            client,
            host: normalize_host(&host),
            api_key: credentials.pinecone_api_key.clone(),
            embedder,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn write(&self, namespace: &str, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            bail!(
                "embedding provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let records: Vec<Value> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, values)| {
                json!({
                    "id": chunk.id,
                    "values": values,
                    "metadata": record_metadata(chunk),
                })
            })
            .collect();

        let response = self
            .request(reqwest::Method::POST, "/vectors/upsert")
            .json(&json!({ "vectors": records, "namespace": namespace }))
            .send()
            .await?;
        check_status(response, "upsert").await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn add(&self, namespace: &str, chunks: &[Chunk]) -> Result<()> {
        self.write(namespace, chunks).await
    }

    async fn upsert(&self, namespace: &str, chunks: &[Chunk]) -> Result<()> {
        self.write(namespace, chunks).await
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let response = self
            .request(reqwest::Method::POST, "/vectors/delete")
            .json(&json!({ "ids": ids, "namespace": namespace }))
            .send()
            .await?;
        check_status(response, "delete").await?;
        Ok(())
    }

    async fn list_ids(
        &self,
        namespace: &str,
        page_token: Option<&str>,
        limit: usize,
    ) -> Result<IdPage> {
        let mut query: Vec<(&str, String)> = vec![
            ("namespace", namespace.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("paginationToken", token.to_string()));
        }

        let response = self
            .request(reqwest::Method::GET, "/vectors/list")
            .query(&query)
            .send()
            .await?;
        let json = check_status(response, "list").await?;
        let page = parse_list_page(&json)?;
        debug!(namespace, ids = page.ids.len(), more = page.next.is_some(), "listed page");
        Ok(page)
    }

    async fn fetch_records(&self, namespace: &str, ids: &[String]) -> Result<Vec<RecordMeta>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        query.push(("namespace", namespace));

        let response = self
            .request(reqwest::Method::GET, "/vectors/fetch")
            .query(&query)
            .send()
            .await?;
        let json = check_status(response, "fetch").await?;
        parse_fetch(&json)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let response = self
            .request(reqwest::Method::POST, "/describe_index_stats")
            .json(&json!({}))
            .send()
            .await?;
        let json = check_status(response, "describe_index_stats").await?;
        Ok(parse_stats(&json))
    }
}

async fn resolve_host(client: &reqwest::Client, api_key: &str, index: &str) -> Result<String> {
    let response = client
        .get(format!("{}/indexes/{}", CONTROL_PLANE_URL, index))
        .header("Api-Key", api_key)
        .header("X-Pinecone-API-Version", API_VERSION)
        .send()
        .await
        .with_context(|| format!("Failed to describe index '{}'", index))?;
    let json = check_status(response, "describe_index").await?;
    json.get("host")
        .and_then(|h| h.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("index '{}' description has no host", index))
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

async fn check_status(response: reqwest::Response, operation: &str) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("Pinecone {} error {}: {}", operation, status, body_text);
    }
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

fn record_metadata(chunk: &Chunk) -> Value {
    json!({
        "chunk_id": chunk.id,
        "checksum": chunk.checksum,
        "source": chunk.source,
        "text": chunk.content,
        "split_version": chunk.split_version,
    })
}

fn parse_list_page(json: &Value) -> Result<IdPage> {
    let vectors = json
        .get("vectors")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid list response: missing vectors array"))?;

    let ids = vectors
        .iter()
        .map(|v| {
            v.get("id")
                .and_then(|id| id.as_str())
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("Invalid list response: entry without id"))
        })
        .collect::<Result<Vec<_>>>()?;

    let next = json
        .pointer("/pagination/next")
        .and_then(|n| n.as_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Ok(IdPage { ids, next })
}

fn parse_fetch(json: &Value) -> Result<Vec<RecordMeta>> {
    let vectors = json
        .get("vectors")
        .and_then(|v| v.as_object())
        .ok_or_else(|| anyhow::anyhow!("Invalid fetch response: missing vectors object"))?;

    let meta_str = |meta: Option<&Value>, key: &str| {
        meta.and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    Ok(vectors
        .iter()
        .map(|(id, record)| {
            let meta = record.get("metadata");
            RecordMeta {
                id: id.clone(),
                chunk_id: meta_str(meta, "chunk_id"),
                checksum: meta_str(meta, "checksum"),
                source: meta_str(meta, "source"),
                split_version: meta_str(meta, "split_version"),
            }
        })
        .collect())
}

fn parse_stats(json: &Value) -> StoreStats {
    let namespaces: BTreeMap<String, u64> = json
        .get("namespaces")
        .and_then(|n| n.as_object())
        .map(|n| {
            n.iter()
                .map(|(name, info)| {
                    let count = info
                        .get("vectorCount")
                        .and_then(|c| c.as_u64())
                        .unwrap_or(0);
                    (name.clone(), count)
                })
                .collect()
        })
        .unwrap_or_default();

    StoreStats {
        dimension: json
            .get("dimension")
            .and_then(|d| d.as_u64())
            .map(|d| d as usize),
        total_records: json
            .get("totalVectorCount")
            .and_then(|c| c.as_u64())
            .unwrap_or_else(|| namespaces.values().sum()),
        namespaces,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_page_with_token() {
        let json = json!({
            "vectors": [{"id": "u::chunk-0"}, {"id": "u::chunk-1"}],
            "pagination": {"next": "abc"},
            "namespace": "u",
            "usage": {"readUnits": 1}
        });
        let page = parse_list_page(&json).unwrap();
        assert_eq!(page.ids, vec!["u::chunk-0", "u::chunk-1"]);
        assert_eq!(page.next.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_list_last_page() {
        let page = parse_list_page(&json!({"vectors": []})).unwrap();
        assert!(page.ids.is_empty());
        assert_eq!(page.next, None);
        assert!(parse_list_page(&json!({})).is_err());
    }

    #[test]
    fn test_parse_fetch_reads_metadata() {
        let json = json!({
            "vectors": {
                "u::chunk-0": {
                    "id": "u::chunk-0",
                    "metadata": {"chunk_id": "u::chunk-0", "checksum": "abc", "source": "u"}
                },
                "legacy": {"id": "legacy"}
            },
            "namespace": "u"
        });
        let mut records = parse_fetch(&json).unwrap();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(records[0].id, "legacy");
        assert_eq!(records[0].checksum, None);
        assert_eq!(records[1].checksum.as_deref(), Some("abc"));
        assert_eq!(records[1].split_version, None);
    }

    #[test]
    fn test_parse_stats() {
        let json = json!({
            "dimension": 1536,
            "totalVectorCount": 7,
            "namespaces": {"https://a.io/": {"vectorCount": 4}, "b": {"vectorCount": 3}}
        });
        let stats = parse_stats(&json);
        assert_eq!(stats.dimension, Some(1536));
        assert_eq!(stats.total_records, 7);
        assert_eq!(stats.namespaces.get("b"), Some(&3));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("idx-123.svc.pinecone.io"), "https://idx-123.svc.pinecone.io");
        assert_eq!(normalize_host("http://localhost:5080/"), "http://localhost:5080");
    }

    #[test]
    fn test_record_metadata_carries_signature() {
        let chunk = crate::chunk::identify("u", 2, "body", "v1:size=800,overlap=120");
        let meta = record_metadata(&chunk);
        assert_eq!(meta["chunk_id"], "u::chunk-2");
        assert_eq!(meta["checksum"], chunk.checksum.as_str());
        assert_eq!(meta["split_version"], "v1:size=800,overlap=120");
    }
}
