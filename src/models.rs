//! Core data models that flow through a sync run.
//!
//! Documents come from the crawler, chunks from the splitter plus
//! [`chunk`](crate::chunk) identity assignment, signatures from the store.
//! A [`Delta`] is derived per run and discarded afterwards.

use serde::Serialize;

/// A crawled document. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Source URI of the page.
    pub source: String,
    pub content: String,
}

impl Document {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }
}

/// A chunk of a document with its derived identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source: String,
    /// Position of the chunk within its document, starting at 0.
    pub sequence_index: usize,
    pub content: String,
    /// `{source}::chunk-{sequence_index}`.
    pub id: String,
    /// SHA-256 of `content`, lowercase hex.
    pub checksum: String,
    /// Tag of the split parameters that produced this chunk.
    pub split_version: String,
}

/// Last-known persisted state of a chunk, keyed by chunk id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub checksum: String,
    /// Record id in the backing store.
    pub storage_ref: String,
    /// Split version recorded with the chunk, absent on untagged records.
    pub split_version: Option<String>,
}

/// Minimal set of mutations that brings a namespace up to date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub new_chunks: Vec<Chunk>,
    pub changed_chunks: Vec<Chunk>,
    pub removed_ids: Vec<String>,
    /// Set when previously recorded chunks were produced by different
    /// split parameters, meaning positional ids no longer line up.
    pub reindex_required: bool,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.new_chunks.is_empty() && self.changed_chunks.is_empty() && self.removed_ids.is_empty()
    }

    pub fn counts(&self) -> AppliedCounts {
        AppliedCounts {
            new: self.new_chunks.len(),
            changed: self.changed_chunks.len(),
            removed: self.removed_ids.len(),
        }
    }
}

/// Number of items per delta category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppliedCounts {
    pub new: usize,
    pub changed: usize,
    pub removed: usize,
}

impl AppliedCounts {
    pub fn total(&self) -> usize {
        self.new + self.changed + self.removed
    }
}

/// Successful outcome of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub namespace: String,
    pub documents: usize,
    pub chunks: usize,
    pub unchanged: usize,
    /// Delta computed for this run.
    pub planned: AppliedCounts,
    /// Items actually written; equals `planned` unless this was a dry run.
    pub applied: AppliedCounts,
    pub reindex_required: bool,
    /// True when the run stopped after diffing without mutating the store.
    pub dry_run: bool,
}
