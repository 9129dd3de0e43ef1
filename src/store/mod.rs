//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is everything the sync engine needs from the
//! remote store: three mutations plus a paginated, namespace-scoped listing
//! of persisted record metadata. Implementations must be `Send + Sync`.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`add`](VectorStore::add) | Insert new chunk records |
//! | [`upsert`](VectorStore::upsert) | Overwrite existing chunk records |
//! | [`delete`](VectorStore::delete) | Delete records by id; unknown ids are a no-op |
//! | [`list_ids`](VectorStore::list_ids) | One page of record ids in a namespace |
//! | [`fetch_records`](VectorStore::fetch_records) | Metadata for listed ids |
//! | [`stats`](VectorStore::stats) | Index-wide record counts |
//!
//! Every record is keyed by `(namespace, chunk id)` and carries
//! [`RecordMeta`] as retrievable metadata.

pub mod memory;
pub mod pinecone;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::Chunk;

/// One page of record ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdPage {
    pub ids: Vec<String>,
    /// Token for the next page; `None` on the last page.
    pub next: Option<String>,
}

/// Metadata persisted with every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMeta {
    /// Record id in the store.
    pub id: String,
    pub chunk_id: Option<String>,
    pub checksum: Option<String>,
    pub source: Option<String>,
    pub split_version: Option<String>,
}

impl RecordMeta {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id.clone(),
            chunk_id: Some(chunk.id.clone()),
            checksum: Some(chunk.checksum.clone()),
            source: Some(chunk.source.clone()),
            split_version: Some(chunk.split_version.clone()),
        }
    }
}

/// Index-wide statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub dimension: Option<usize>,
    pub total_records: u64,
    pub namespaces: BTreeMap<String, u64>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert records for new chunks.
    async fn add(&self, namespace: &str, chunks: &[Chunk]) -> Result<()>;

    /// Overwrite records for changed chunks, keyed by chunk id.
    async fn upsert(&self, namespace: &str, chunks: &[Chunk]) -> Result<()>;

    /// Delete records by chunk id.
    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()>;

    /// List one page of record ids, starting after `page_token`.
    async fn list_ids(
        &self,
        namespace: &str,
        page_token: Option<&str>,
        limit: usize,
    ) -> Result<IdPage>;

    /// Fetch metadata for the given record ids. Ids that no longer exist
    /// are omitted from the result.
    async fn fetch_records(&self, namespace: &str, ids: &[String]) -> Result<Vec<RecordMeta>>;

    async fn stats(&self) -> Result<StoreStats>;
}
