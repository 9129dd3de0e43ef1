//! Sync progress reporting.
//!
//! Reports pipeline state transitions and applied batches so users see
//! where a run is and how much of the delta has landed. Progress is emitted
//! on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

use crate::error::Category;
use crate::pipeline::SyncState;

/// A single progress event for a sync run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncProgressEvent {
    /// The run entered a new state.
    State { namespace: String, state: SyncState },
    /// One batch mutation completed.
    BatchApplied {
        namespace: String,
        category: Category,
        /// 1-based batch number within the category.
        batch: usize,
        total: usize,
        items: usize,
    },
}

/// Reports sync progress. Called from the pipeline and the batch applier.
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync https://a.io/  add  2 / 3 batches (50 items)".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::State { namespace, state } => {
                format!("sync {}  {}\n", namespace, state)
            }
            SyncProgressEvent::BatchApplied {
                namespace,
                category,
                batch,
                total,
                items,
            } => format!(
                "sync {}  {}  {} / {} batches ({} items)\n",
                namespace,
                category.mutation(),
                format_number(*batch as u64),
                format_number(*total as u64),
                format_number(*items as u64)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::State { namespace, state } => serde_json::json!({
                "event": "state",
                "namespace": namespace,
                "state": state.as_str(),
            }),
            SyncProgressEvent::BatchApplied {
                namespace,
                category,
                batch,
                total,
                items,
            } => serde_json::json!({
                "event": "batch",
                "namespace": namespace,
                "category": category.as_str(),
                "mutation": category.mutation(),
                "batch": batch,
                "total": total,
                "items": items,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Arc<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}
