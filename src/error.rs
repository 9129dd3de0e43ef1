//! Error taxonomy for a sync run.
//!
//! | Variant | Retryable | Raised by |
//! |---------|-----------|-----------|
//! | `Config` | No | config loading, before any I/O |
//! | `Crawl` | Yes | crawler call or empty crawl result |
//! | `Split` | Yes | splitter worker failure |
//! | `DuplicateIdentity` | No | chunk identity / delta computation |
//! | `SignatureFetch` | Yes | signature listing (unreachable or partial) |
//! | `Apply` | Yes | a batch mutation |
//! | `Timeout` | Yes | the crawl call exceeding its budget |
//! | `Cancelled` | Yes | caller cancellation |
//!
//! Timed-out signature and batch calls are reported as `SignatureFetch` and
//! `Apply` respectively.
//!
//! Every error reaches the caller wrapped in a [`SyncFailure`], which names
//! the stage that failed and the work already applied.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::models::AppliedCounts;

/// Result alias for library operations that fail with [`SyncError`].
pub type Result<T> = std::result::Result<T, SyncError>;

/// A delta category, used to label batch mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    New,
    Changed,
    Removed,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::New => "new",
            Category::Changed => "changed",
            Category::Removed => "removed",
        }
    }

    /// The store mutation issued for this category.
    pub fn mutation(&self) -> &'static str {
        match self {
            Category::New => "add",
            Category::Changed => "upsert",
            Category::Removed => "delete",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can end a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Required endpoint or credential missing, or invalid settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Upstream crawl failure, or the crawl produced no documents.
    #[error("crawl failed: {0}")]
    Crawl(String),

    /// The splitting worker failed.
    #[error("split failed: {0}")]
    Split(String),

    /// Two chunks in one batch resolved to the same id.
    #[error("duplicate chunk identity: {id}")]
    DuplicateIdentity { id: String },

    /// Signature listing failed or was detected as partial.
    #[error("signature fetch failed: {0}")]
    SignatureFetch(String),

    /// A batch mutation failed; earlier batches remain applied.
    #[error(
        "{category} batch {} of {total_batches} failed ({} mutation): {message}",
        .completed_batches + 1,
        .category.mutation()
    )]
    Apply {
        category: Category,
        completed_batches: usize,
        total_batches: usize,
        message: String,
    },

    /// A single I/O call exceeded its timeout.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    /// The caller cancelled the run.
    #[error("cancelled during {stage}")]
    Cancelled { stage: Stage },
}

impl SyncError {
    /// Whether re-invoking the whole run can succeed without a code or
    /// configuration change.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SyncError::Config(_) | SyncError::DuplicateIdentity { .. }
        )
    }
}

/// Pipeline stage, used for state tracking and failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Crawl,
    Split,
    Diff,
    Apply,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Crawl => "crawl",
            Stage::Split => "split",
            Stage::Diff => "diff",
            Stage::Apply => "apply",
        })
    }
}

/// Terminal failure of a sync run.
#[derive(Error, Debug)]
#[error("sync failed at {stage}: {error}")]
pub struct SyncFailure {
    pub stage: Stage,
    #[source]
    pub error: SyncError,
    /// Items applied before the failure. All zero unless the failure
    /// happened during `Apply`.
    pub applied: AppliedCounts,
}

impl SyncFailure {
    pub fn new(stage: Stage, error: SyncError) -> Self {
        Self {
            stage,
            error,
            applied: AppliedCounts::default(),
        }
    }

    pub fn with_applied(mut self, applied: AppliedCounts) -> Self {
        self.applied = applied;
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }
}
