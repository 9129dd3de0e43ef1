//! # Palma Sync
//!
//! **Incremental synchronization of crawled documents into a vector store.**
//!
//! A sync run crawls a seed URL, splits every page into chunks, gives each
//! chunk a positional id and a content checksum, diffs that against the
//! signatures recorded in the store for the same namespace, and applies only
//! the resulting additions, updates and deletions in bounded batches. An
//! unchanged site produces an empty delta; a run never re-indexes wholesale.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌──────────┐
//! │ Crawler  │──▶│ Splitter │──▶│  Identity  │──▶│  Delta   │──▶│  Batch   │
//! │ (Tavily) │   │          │   │ id+checksum│   │  Engine  │   │ Applier  │
//! └──────────┘   └──────────┘   └────────────┘   └────▲─────┘   └────┬─────┘
//!                                                     │              │
//!                                              ┌──────┴──────┐       │
//!                                              │ Signatures  │◀──────┤
//!                                              └──────▲──────┘       ▼
//!                                                     └────── Vector store
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, environment credentials, validation |
//! | [`models`] | Core data types: `Document`, `Chunk`, `Signature`, `Delta` |
//! | [`error`] | Error taxonomy and stage-tagged failures |
//! | [`hash`] | SHA-256 content checksums |
//! | [`chunk`] | Positional chunk ids and split version tags |
//! | [`splitter`] | Recursive character splitter |
//! | [`crawler`] | Crawler trait, Tavily client, response normalization |
//! | [`embedding`] | Embedding provider trait and OpenAI implementation |
//! | [`store`] | Vector store trait, in-memory and Pinecone backends |
//! | [`signatures`] | Full, paginated retrieval of recorded signatures |
//! | [`delta`] | New / changed / removed computation |
//! | [`batch`] | Batch partitioning and application |
//! | [`pipeline`] | Run state machine, timeouts, cancellation |
//! | [`lease`] | Per-namespace mutual exclusion |
//! | [`progress`] | Stage and batch progress on stderr |
//! | [`ingest`] | `palma sync` / `palma verify` command bodies |

pub mod batch;
pub mod chunk;
pub mod config;
pub mod crawler;
pub mod delta;
pub mod embedding;
pub mod error;
pub mod hash;
pub mod ingest;
pub mod lease;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod signatures;
pub mod splitter;
pub mod store;

pub use error::{SyncError, SyncFailure};
pub use models::{AppliedCounts, Chunk, Delta, Document, Signature, SyncReport};
pub use pipeline::{SyncOptions, SyncPipeline, SyncRequest, SyncState};
