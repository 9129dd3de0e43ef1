//! Batched application of a [`Delta`] to a [`VectorStore`].
//!
//! Each category is cut into sequential slices of at most `batch_size`
//! items and applied in slice order: new chunks as `add`, changed chunks as
//! `upsert`, removed ids as `delete`. A failed batch stops its category and
//! the run; batches already applied stay applied; a retry of the whole run
//! converges because every mutation is idempotent.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Category, Result, SyncError};
use crate::models::{AppliedCounts, Chunk, Delta};
use crate::pipeline::IoGuard;
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::store::VectorStore;

/// Default number of items per store mutation.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Split `items` into consecutive batches of at most `size` items. The last
/// batch may be shorter; no batch is empty.
pub fn batched<T>(items: &[T], size: usize) -> Vec<&[T]> {
    items.chunks(size.max(1)).collect()
}

/// One store mutation.
enum Batch<'a> {
    Add(&'a [Chunk]),
    Upsert(&'a [Chunk]),
    Delete(&'a [String]),
}

impl Batch<'_> {
    fn len(&self) -> usize {
        match self {
            Batch::Add(items) | Batch::Upsert(items) => items.len(),
            Batch::Delete(ids) => ids.len(),
        }
    }
}

/// Applies deltas in bounded batches.
pub struct BatchApplier {
    store: Arc<dyn VectorStore>,
    batch_size: usize,
    progress: Arc<dyn SyncProgressReporter>,
}

impl BatchApplier {
    pub fn new(
        store: Arc<dyn VectorStore>,
        batch_size: usize,
        progress: Arc<dyn SyncProgressReporter>,
    ) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            progress,
        }
    }

    /// Apply `delta` to `namespace`, counting applied items into `applied`
    /// as batches complete so the caller can report partial progress.
    pub async fn apply(
        &self,
        namespace: &str,
        delta: &Delta,
        guard: &IoGuard,
        applied: &mut AppliedCounts,
    ) -> Result<()> {
        info!(
            namespace,
            new = delta.new_chunks.len(),
            changed = delta.changed_chunks.len(),
            removed = delta.removed_ids.len(),
            batch_size = self.batch_size,
            "applying delta"
        );

        let new = batched(&delta.new_chunks, self.batch_size)
            .into_iter()
            .map(Batch::Add)
            .collect();
        self.apply_category(namespace, Category::New, new, guard, &mut applied.new)
            .await?;

        let changed = batched(&delta.changed_chunks, self.batch_size)
            .into_iter()
            .map(Batch::Upsert)
            .collect();
        self.apply_category(namespace, Category::Changed, changed, guard, &mut applied.changed)
            .await?;

        let removed = batched(&delta.removed_ids, self.batch_size)
            .into_iter()
            .map(Batch::Delete)
            .collect();
        self.apply_category(namespace, Category::Removed, removed, guard, &mut applied.removed)
            .await?;

        info!(namespace, total = applied.total(), "delta applied");
        Ok(())
    }

    async fn apply_category(
        &self,
        namespace: &str,
        category: Category,
        batches: Vec<Batch<'_>>,
        guard: &IoGuard,
        applied: &mut usize,
    ) -> Result<()> {
        let total = batches.len();

        for (completed, batch) in batches.into_iter().enumerate() {
            let items = batch.len();
            let outcome = guard
                .call(category.mutation(), self.mutate(namespace, batch))
                .await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(err @ SyncError::Cancelled { .. }) => return Err(err),
                Err(other) => Some(other.to_string()),
            };

            if let Some(message) = failure {
                warn!(
                    namespace,
                    %category,
                    completed,
                    total,
                    error = %message,
                    "batch mutation failed"
                );
                return Err(SyncError::Apply {
                    category,
                    completed_batches: completed,
                    total_batches: total,
                    message,
                });
            }

            *applied += items;
            self.progress.report(SyncProgressEvent::BatchApplied {
                namespace: namespace.to_string(),
                category,
                batch: completed + 1,
                total,
                items,
            });
        }

        Ok(())
    }

    async fn mutate(&self, namespace: &str, batch: Batch<'_>) -> anyhow::Result<()> {
        match batch {
            Batch::Add(chunks) => self.store.add(namespace, chunks).await,
            Batch::Upsert(chunks) => self.store.upsert(namespace, chunks).await,
            Batch::Delete(ids) => self.store.delete(namespace, ids).await,
        }
    }
}
