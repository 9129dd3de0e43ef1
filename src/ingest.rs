//! Command entry points for the `palma` binary.
//!
//! Builds the production pipeline from configuration, runs it, and prints a
//! plain `key: value` summary on stdout. Credentials are checked before any
//! network call.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::{Config, Credentials};
use crate::embedding::OpenAIProvider;
use crate::error::SyncFailure;
use crate::models::SyncReport;
use crate::pipeline::{SyncPipeline, SyncRequest};
use crate::progress::SyncProgressReporter;
use crate::store::pinecone::PineconeStore;
use crate::store::VectorStore;

/// Sync one seed URL into its namespace.
pub async fn run_sync(
    config: &Config,
    request: &SyncRequest,
    dry_run: bool,
    progress: Arc<dyn SyncProgressReporter>,
) -> Result<()> {
    let credentials = Credentials::from_env(config)?;

    let pipeline = SyncPipeline::from_config(config, &credentials)
        .await?
        .with_progress(progress)
        .with_dry_run(dry_run);

    match pipeline.run_sync(request).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(failure) => {
            print_failure(&failure);
            Err(failure.into())
        }
    }
}

/// Check credentials and print index statistics.
pub async fn run_verify(config: &Config) -> Result<()> {
    let credentials = Credentials::from_env(config)?;
    println!("verify");
    println!("  index: {}", credentials.pinecone_index);

    let embedder = OpenAIProvider::new(&config.embedding, &credentials.openai_api_key)?;
    let store = PineconeStore::connect(&config.store, &credentials, Arc::new(embedder)).await?;
    let stats = store.stats().await?;

    match stats.dimension {
        Some(dim) => {
            println!("  dimension: {}", dim);
            if dim != config.embedding.dims {
                bail!(
                    "index dimension {} does not match embedding.dims {}",
                    dim,
                    config.embedding.dims
                );
            }
        }
        None => println!("  dimension: unknown"),
    }
    println!("  total records: {}", stats.total_records);
    println!("  namespaces: {}", stats.namespaces.len());
    for (namespace, count) in &stats.namespaces {
        println!("    {}: {}", namespace, count);
    }
    println!("ok");
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.dry_run {
        println!("sync {} (dry-run)", report.namespace);
    } else {
        println!("sync {}", report.namespace);
    }
    println!("  documents: {}", report.documents);
    println!("  chunks: {}", report.chunks);
    println!("  unchanged: {}", report.unchanged);
    if report.dry_run {
        println!("  would add: {}", report.planned.new);
        println!("  would update: {}", report.planned.changed);
        println!("  would delete: {}", report.planned.removed);
    } else {
        println!("  added: {}", report.applied.new);
        println!("  updated: {}", report.applied.changed);
        println!("  deleted: {}", report.applied.removed);
    }
    if report.reindex_required {
        println!("  reindex: split parameters changed since the last run");
    }
    println!("ok");
}

fn print_failure(failure: &SyncFailure) {
    println!("sync failed");
    println!("  stage: {}", failure.stage);
    println!("  error: {}", failure.error);
    println!("  added before failure: {}", failure.applied.new);
    println!("  updated before failure: {}", failure.applied.changed);
    println!("  deleted before failure: {}", failure.applied.removed);
    println!(
        "  retry safe: {}",
        if failure.is_retryable() { "yes" } else { "no" }
    );
}
