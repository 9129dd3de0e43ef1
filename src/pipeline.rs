//! Sync pipeline orchestration.
//!
//! A run moves strictly forward through
//!
//! ```text
//! Idle → Crawled → Split → Diffed → Applied
//!    ╲        ╲       ╲        ╲
//!     ╰────────┴───────┴────────┴──▶ Failed
//! ```
//!
//! and stops at the first failure. Network calls (crawl, each signature
//! page, each batch mutation) are the only suspension points; each runs
//! under its own timeout and is abandoned immediately on cancellation.
//! Splitting runs on the blocking pool.
//!
//! Collaborators are injected at construction, so tests can substitute any
//! of the crawler, splitter, or store.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::batch::{BatchApplier, DEFAULT_BATCH_SIZE};
use crate::chunk::assign_identity;
use crate::config::{Config, Credentials};
use crate::crawler::{Crawler, TavilyCrawler};
use crate::delta::compute_delta;
use crate::embedding::OpenAIProvider;
use crate::error::{Result, Stage, SyncError, SyncFailure};
use crate::lease::NamespaceLeases;
use crate::models::{AppliedCounts, Chunk, Document, SyncReport};
use crate::progress::{NoProgress, SyncProgressEvent, SyncProgressReporter};
use crate::signatures::SignatureStore;
use crate::splitter::{RecursiveSplitter, Splitter};
use crate::store::pinecone::PineconeStore;
use crate::store::VectorStore;

/// State of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Crawled,
    Split,
    Diffed,
    Applied,
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Crawled => "crawled",
            SyncState::Split => "split",
            SyncState::Diffed => "diffed",
            SyncState::Applied => "applied",
            SyncState::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timeout and cancellation policy for the I/O calls of one stage.
#[derive(Clone)]
pub struct IoGuard {
    cancel: CancellationToken,
    stage: Stage,
    timeout: Duration,
}

impl IoGuard {
    pub fn new(cancel: CancellationToken, stage: Stage, timeout: Duration) -> Self {
        Self {
            cancel,
            stage,
            timeout,
        }
    }

    /// Run one I/O call. The outer error is a timeout or cancellation; the
    /// inner result is the call's own outcome.
    pub async fn call<T, F>(&self, operation: &str, future: F) -> Result<anyhow::Result<T>>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled { stage: self.stage }),
            outcome = tokio::time::timeout(self.timeout, future) => match outcome {
                Ok(result) => Ok(result),
                Err(_) => Err(SyncError::Timeout {
                    operation: operation.to_string(),
                    timeout: self.timeout,
                }),
            },
        }
    }
}

/// Tunables for a pipeline.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub batch_size: usize,
    pub list_page_size: usize,
    pub crawl_timeout: Duration,
    pub signature_timeout: Duration,
    pub mutation_timeout: Duration,
    /// Stop after diffing without mutating the store.
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            list_page_size: 100,
            crawl_timeout: Duration::from_secs(120),
            signature_timeout: Duration::from_secs(60),
            mutation_timeout: Duration::from_secs(60),
            dry_run: false,
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.sync.batch_size,
            list_page_size: config.store.list_page_size,
            crawl_timeout: Duration::from_secs(config.crawler.timeout_secs),
            signature_timeout: Duration::from_secs(config.sync.signature_timeout_secs),
            mutation_timeout: Duration::from_secs(config.sync.mutation_timeout_secs),
            dry_run: false,
        }
    }
}

/// What to sync. The seed URL doubles as the namespace.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub url: String,
    pub max_depth: u32,
    pub extract_depth: String,
}

impl SyncRequest {
    pub fn new(url: impl Into<String>, max_depth: u32, extract_depth: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_depth,
            extract_depth: extract_depth.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.url
    }
}

/// Crawl → split → diff → apply for one namespace.
pub struct SyncPipeline {
    crawler: Arc<dyn Crawler>,
    splitter: Arc<dyn Splitter>,
    store: Arc<dyn VectorStore>,
    options: SyncOptions,
    progress: Arc<dyn SyncProgressReporter>,
    leases: Option<Arc<NamespaceLeases>>,
}

impl SyncPipeline {
    pub fn new(
        crawler: Arc<dyn Crawler>,
        splitter: Arc<dyn Splitter>,
        store: Arc<dyn VectorStore>,
        options: SyncOptions,
    ) -> Self {
        Self {
            crawler,
            splitter,
            store,
            options,
            progress: Arc::new(NoProgress),
            leases: None,
        }
    }

    /// Build the production pipeline: Tavily crawler, recursive splitter,
    /// Pinecone store embedding through OpenAI.
    pub async fn from_config(config: &Config, credentials: &Credentials) -> anyhow::Result<Self> {
        let crawler = TavilyCrawler::new(&config.crawler, &credentials.tavily_api_key)?;
        let embedder = OpenAIProvider::new(&config.embedding, &credentials.openai_api_key)?;
        let store = PineconeStore::connect(&config.store, credentials, Arc::new(embedder))
            .await
            .context("Failed to connect to vector store")?;

        Ok(Self::new(
            Arc::new(crawler),
            Arc::new(RecursiveSplitter::from_config(&config.chunking)),
            Arc::new(store),
            SyncOptions::from_config(config),
        ))
    }

    pub fn with_progress(mut self, progress: Arc<dyn SyncProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Serialize runs per namespace through `leases`.
    pub fn with_leases(mut self, leases: Arc<NamespaceLeases>) -> Self {
        self.leases = Some(leases);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.options.dry_run = dry_run;
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run one sync to completion.
    pub async fn run_sync(
        &self,
        request: &SyncRequest,
    ) -> std::result::Result<SyncReport, SyncFailure> {
        self.run_sync_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Run one sync, abandoning outstanding I/O when `cancel` fires.
    pub async fn run_sync_with_cancel(
        &self,
        request: &SyncRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<SyncReport, SyncFailure> {
        let namespace = request.namespace();
        let _lease = match &self.leases {
            Some(leases) => Some(leases.acquire(namespace).await),
            None => None,
        };

        info!(
            url = %request.url,
            max_depth = request.max_depth,
            extract_depth = %request.extract_depth,
            dry_run = self.options.dry_run,
            "pipeline started"
        );
        self.transition(namespace, SyncState::Idle);

        let mut applied = AppliedCounts::default();
        match self.execute(request, cancel, &mut applied).await {
            Ok(report) => {
                info!(namespace, applied = report.applied.total(), "pipeline completed");
                Ok(report)
            }
            Err((stage, error)) => {
                warn!(namespace, %stage, error = %error, "pipeline failed");
                self.transition(namespace, SyncState::Failed);
                Err(SyncFailure::new(stage, error).with_applied(applied))
            }
        }
    }

    async fn execute(
        &self,
        request: &SyncRequest,
        cancel: &CancellationToken,
        applied: &mut AppliedCounts,
    ) -> std::result::Result<SyncReport, (Stage, SyncError)> {
        let namespace = request.namespace();

        let documents = self
            .crawl(request, cancel)
            .await
            .map_err(|e| (Stage::Crawl, e))?;
        self.transition(namespace, SyncState::Crawled);

        let document_count = documents.len();
        let chunks = self
            .split(documents, cancel)
            .await
            .map_err(|e| (Stage::Split, e))?;
        let chunk_count = chunks.len();
        self.transition(namespace, SyncState::Split);

        let guard = IoGuard::new(cancel.clone(), Stage::Diff, self.options.signature_timeout);
        let previous = SignatureStore::new(self.store.as_ref(), self.options.list_page_size)
            .fetch(namespace, &guard)
            .await
            .map_err(|e| (Stage::Diff, e))?;
        let delta = compute_delta(&previous, chunks, &self.splitter.version())
            .map_err(|e| (Stage::Diff, e))?;
        self.transition(namespace, SyncState::Diffed);

        if delta.reindex_required {
            warn!(
                namespace,
                "recorded chunks were split with different parameters; this run replaces them"
            );
        }

        let planned = delta.counts();
        let unchanged = chunk_count - planned.new - planned.changed;
        let mut report = SyncReport {
            namespace: namespace.to_string(),
            documents: document_count,
            chunks: chunk_count,
            unchanged,
            planned,
            applied: AppliedCounts::default(),
            reindex_required: delta.reindex_required,
            dry_run: self.options.dry_run,
        };

        if self.options.dry_run {
            info!(namespace, "dry run, skipping apply");
            return Ok(report);
        }

        let guard = IoGuard::new(cancel.clone(), Stage::Apply, self.options.mutation_timeout);
        BatchApplier::new(
            self.store.clone(),
            self.options.batch_size,
            self.progress.clone(),
        )
        .apply(namespace, &delta, &guard, applied)
        .await
        .map_err(|e| (Stage::Apply, e))?;
        self.transition(namespace, SyncState::Applied);

        report.applied = *applied;
        Ok(report)
    }

    async fn crawl(
        &self,
        request: &SyncRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>> {
        let guard = IoGuard::new(cancel.clone(), Stage::Crawl, self.options.crawl_timeout);
        let crawl = self
            .crawler
            .crawl(&request.url, request.max_depth, &request.extract_depth);
        let documents = guard
            .call("crawl", crawl)
            .await?
            .map_err(|e| SyncError::Crawl(format!("{:#}", e)))?;

        if documents.is_empty() {
            return Err(SyncError::Crawl(format!(
                "no documents returned for {}",
                request.url
            )));
        }
        Ok(documents)
    }

    async fn split(
        &self,
        documents: Vec<Document>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Chunk>> {
        info!(raw_docs = documents.len(), "splitting documents");

        let splitter = self.splitter.clone();
        let work = tokio::task::spawn_blocking(move || {
            let version = splitter.version();
            documents
                .iter()
                .flat_map(|doc| assign_identity(doc, &splitter.split(doc), &version))
                .collect::<Vec<_>>()
        });

        let chunks = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled { stage: Stage::Split }),
            joined = work => joined.map_err(|e| SyncError::Split(e.to_string()))?,
        };

        if chunks.is_empty() {
            return Err(SyncError::Split("documents produced no chunks".to_string()));
        }

        info!(chunks = chunks.len(), "split completed");
        Ok(chunks)
    }

    fn transition(&self, namespace: &str, state: SyncState) {
        self.progress.report(SyncProgressEvent::State {
            namespace: namespace.to_string(),
            state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_times_out() {
        let guard = IoGuard::new(
            CancellationToken::new(),
            Stage::Crawl,
            Duration::from_millis(10),
        );
        let err = guard
            .call("crawl", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, anyhow::Error>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Timeout { ref operation, .. } if operation == "crawl"));
        assert_eq!(err.to_string(), "crawl timed out after 10ms");
    }

    #[tokio::test]
    async fn test_guard_passes_inner_result() {
        let guard = IoGuard::new(CancellationToken::new(), Stage::Apply, Duration::from_secs(1));
        let inner = guard
            .call("add", async { Err::<(), _>(anyhow::anyhow!("boom")) })
            .await
            .unwrap();
        assert_eq!(inner.unwrap_err().to_string(), "boom");
    }

    #[tokio::test]
    async fn test_guard_cancellation_wins() {
        let cancel = CancellationToken::new();
        let guard = IoGuard::new(cancel.clone(), Stage::Diff, Duration::from_secs(5));
        cancel.cancel();
        let err = guard
            .call("list", async { Ok::<_, anyhow::Error>(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled { stage: Stage::Diff }));
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.sync.batch_size = 7;
        let options = SyncOptions::from_config(&config);
        assert_eq!(options.batch_size, 7);
        assert_eq!(options.crawl_timeout, Duration::from_secs(120));
        assert!(!options.dry_run);
    }
}
