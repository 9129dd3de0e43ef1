//! Retrieval of the previously recorded signature map for a namespace.
//!
//! The listing is driven page by page until the store reports no further
//! page, so the map always covers every persisted chunk. Anything that would
//! yield an incomplete map is an error rather than a smaller map: an
//! incomplete map would make every missing chunk look new.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::models::Signature;
use crate::pipeline::IoGuard;
use crate::store::VectorStore;

/// Reads `{chunk id → Signature}` from a [`VectorStore`].
pub struct SignatureStore<'a> {
    store: &'a dyn VectorStore,
    page_size: usize,
}

impl<'a> SignatureStore<'a> {
    pub fn new(store: &'a dyn VectorStore, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Fetch every signature recorded under `namespace`. An unknown
    /// namespace yields an empty map.
    pub async fn fetch(
        &self,
        namespace: &str,
        guard: &IoGuard,
    ) -> Result<HashMap<String, Signature>> {
        info!(namespace, "fetching previous signatures");

        let mut signatures = HashMap::new();
        let mut seen_tokens = HashSet::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let listing = self
                .store
                .list_ids(namespace, token.as_deref(), self.page_size);
            let page = guard
                .call("signature listing", listing)
                .await
                .map_err(unreachable_store)?
                .map_err(|e| SyncError::SignatureFetch(format!("{:#}", e)))?;
            pages += 1;

            if !page.ids.is_empty() {
                let records = guard
                    .call("signature fetch", self.store.fetch_records(namespace, &page.ids))
                    .await
                    .map_err(unreachable_store)?
                    .map_err(|e| SyncError::SignatureFetch(format!("{:#}", e)))?;

                if records.len() != page.ids.len() {
                    return Err(SyncError::SignatureFetch(format!(
                        "partial listing: {} ids listed but {} records fetched",
                        page.ids.len(),
                        records.len()
                    )));
                }

                for record in records {
                    let checksum = record.checksum.ok_or_else(|| {
                        SyncError::SignatureFetch(format!(
                            "partial listing: record '{}' has no checksum",
                            record.id
                        ))
                    })?;
                    let chunk_id = record.chunk_id.unwrap_or_else(|| record.id.clone());
                    let previous = signatures.insert(
                        chunk_id.clone(),
                        Signature {
                            checksum,
                            storage_ref: record.id,
                            split_version: record.split_version,
                        },
                    );
                    if previous.is_some() {
                        return Err(SyncError::SignatureFetch(format!(
                            "chunk id '{}' is recorded more than once",
                            chunk_id
                        )));
                    }
                }
            }

            match page.next {
                Some(next) => {
                    if !seen_tokens.insert(next.clone()) {
                        return Err(SyncError::SignatureFetch(format!(
                            "listing repeated page token '{}'",
                            next
                        )));
                    }
                    token = Some(next);
                }
                None => break,
            }
        }

        debug!(namespace, pages, "signature listing exhausted");
        info!(namespace, count = signatures.len(), "previous signatures fetched");
        Ok(signatures)
    }
}

/// A timed-out listing call means the store is unreachable; cancellation
/// keeps its own variant.
fn unreachable_store(err: SyncError) -> SyncError {
    match err {
        SyncError::Timeout { .. } => SyncError::SignatureFetch(err.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::store::memory::{InMemoryStore, Op};
    use crate::store::RecordMeta;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn guard() -> IoGuard {
        IoGuard::new(CancellationToken::new(), Stage::Diff, Duration::from_secs(5))
    }

    fn record(id: &str, checksum: Option<&str>) -> RecordMeta {
        RecordMeta {
            id: id.to_string(),
            chunk_id: Some(id.to_string()),
            checksum: checksum.map(str::to_string),
            source: Some("u".to_string()),
            split_version: None,
        }
    }

    #[tokio::test]
    async fn test_reads_every_page() {
        let store = InMemoryStore::new();
        store.seed(
            "ns",
            (0..250).map(|i| record(&format!("u::chunk-{}", i), Some("c"))),
        );

        let signatures = SignatureStore::new(&store, 100)
            .fetch("ns", &guard())
            .await
            .unwrap();
        assert_eq!(signatures.len(), 250);
        assert_eq!(signatures["u::chunk-249"].storage_ref, "u::chunk-249");
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_empty() {
        let store = InMemoryStore::new();
        let signatures = SignatureStore::new(&store, 100)
            .fetch("nothing", &guard())
            .await
            .unwrap();
        assert!(signatures.is_empty());
    }

    #[tokio::test]
    async fn test_record_without_checksum_is_partial() {
        let store = InMemoryStore::new();
        store.seed("ns", [record("a", Some("c")), record("b", None)]);
        let err = SignatureStore::new(&store, 100)
            .fetch("ns", &guard())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SignatureFetch(_)));
    }

    #[tokio::test]
    async fn test_failure_on_later_page_is_fatal() {
        let store = InMemoryStore::new();
        store.seed("ns", (0..30).map(|i| record(&format!("id-{:02}", i), Some("c"))));
        store.fail_after(Op::List, 1);

        let err = SignatureStore::new(&store, 10)
            .fetch("ns", &guard())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SignatureFetch(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_listing() {
        let store = InMemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let guard = IoGuard::new(cancel, Stage::Diff, Duration::from_secs(5));
        let err = SignatureStore::new(&store, 10)
            .fetch("ns", &guard)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled { stage: Stage::Diff }));
    }

    struct SlowStore;

    #[async_trait::async_trait]
    impl VectorStore for SlowStore {
        async fn add(&self, _ns: &str, _chunks: &[crate::models::Chunk]) -> anyhow::Result<()> {
            Ok(())
        }

        async fn upsert(&self, _ns: &str, _chunks: &[crate::models::Chunk]) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete(&self, _ns: &str, _ids: &[String]) -> anyhow::Result<()> {
            Ok(())
        }

        async fn list_ids(
            &self,
            _ns: &str,
            _token: Option<&str>,
            _limit: usize,
        ) -> anyhow::Result<crate::store::IdPage> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(crate::store::IdPage::default())
        }

        async fn fetch_records(&self, _ns: &str, _ids: &[String]) -> anyhow::Result<Vec<RecordMeta>> {
            Ok(Vec::new())
        }

        async fn stats(&self) -> anyhow::Result<crate::store::StoreStats> {
            Ok(crate::store::StoreStats::default())
        }
    }

    #[tokio::test]
    async fn test_listing_timeout_is_signature_fetch() {
        let guard = IoGuard::new(
            CancellationToken::new(),
            Stage::Diff,
            Duration::from_millis(20),
        );
        let err = SignatureStore::new(&SlowStore, 10)
            .fetch("ns", &guard)
            .await
            .unwrap_err();
        match err {
            SyncError::SignatureFetch(message) => {
                assert!(message.contains("signature listing timed out"), "{}", message);
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
