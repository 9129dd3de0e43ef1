//! In-memory [`VectorStore`] for tests and local dry runs.
//!
//! Records live in a `BTreeMap` per namespace behind `std::sync::RwLock`,
//! so listing order is stable and page tokens are simply the last id of the
//! previous page. Every successful mutation is appended to a log that tests
//! inspect for batch sizes and ordering. Failures can be injected per
//! operation.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{PoisonError, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::Chunk;

use super::{IdPage, RecordMeta, StoreStats, VectorStore};

/// Store operation, used for the mutation log and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Upsert,
    Delete,
    List,
    Fetch,
}

/// A mutation that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub op: Op,
    pub namespace: String,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    meta: RecordMeta,
    content: String,
}

#[derive(Debug, Default)]
struct Failure {
    /// Successful calls to let through before failing.
    after: usize,
    calls: usize,
}

/// In-memory store, namespaced by key.
#[derive(Default)]
pub struct InMemoryStore {
    namespaces: RwLock<HashMap<String, BTreeMap<String, StoredRecord>>>,
    log: RwLock<Vec<Mutation>>,
    failures: RwLock<HashMap<Op, Failure>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a namespace with raw records, bypassing the mutation log.
    pub fn seed(&self, namespace: &str, records: impl IntoIterator<Item = RecordMeta>) {
        let mut namespaces = self.namespaces.write().unwrap_or_else(PoisonError::into_inner);
        let ns = namespaces.entry(namespace.to_string()).or_default();
        for meta in records {
            ns.insert(
                meta.id.clone(),
                StoredRecord {
                    meta,
                    content: String::new(),
                },
            );
        }
    }

    /// Make `op` fail after `after` successful calls.
    pub fn fail_after(&self, op: Op, after: usize) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, Failure { after, calls: 0 });
    }

    pub fn clear_failures(&self) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// All successful mutations, in the order they were applied.
    pub fn mutations(&self) -> Vec<Mutation> {
        self.log.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Record metadata in a namespace, ordered by id.
    pub fn records(&self, namespace: &str) -> Vec<RecordMeta> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .map(|ns| ns.values().map(|r| r.meta.clone()).collect())
            .unwrap_or_default()
    }

    /// Stored content of one record.
    pub fn content(&self, namespace: &str, id: &str) -> Option<String> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .and_then(|ns| ns.get(id))
            .map(|r| r.content.clone())
    }

    fn check_failure(&self, op: Op) -> Result<()> {
        let mut failures = self.failures.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(failure) = failures.get_mut(&op) {
            if failure.calls >= failure.after {
                bail!("injected {:?} failure", op);
            }
            failure.calls += 1;
        }
        Ok(())
    }

    fn write_chunks(&self, op: Op, namespace: &str, chunks: &[Chunk]) -> Result<()> {
        self.check_failure(op)?;
        {
            let mut namespaces = self.namespaces.write().unwrap_or_else(PoisonError::into_inner);
            let ns = namespaces.entry(namespace.to_string()).or_default();
            for chunk in chunks {
                ns.insert(
                    chunk.id.clone(),
                    StoredRecord {
                        meta: RecordMeta::from_chunk(chunk),
                        content: chunk.content.clone(),
                    },
                );
            }
        }
        self.log_mutation(op, namespace, chunks.iter().map(|c| c.id.clone()).collect());
        Ok(())
    }

    fn log_mutation(&self, op: Op, namespace: &str, ids: Vec<String>) {
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Mutation {
                op,
                namespace: namespace.to_string(),
                ids,
            });
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn add(&self, namespace: &str, chunks: &[Chunk]) -> Result<()> {
        self.write_chunks(Op::Add, namespace, chunks)
    }

    async fn upsert(&self, namespace: &str, chunks: &[Chunk]) -> Result<()> {
        self.write_chunks(Op::Upsert, namespace, chunks)
    }

    async fn delete(&self, namespace: &str, ids: &[String]) -> Result<()> {
        self.check_failure(Op::Delete)?;
        {
            let mut namespaces = self.namespaces.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(ns) = namespaces.get_mut(namespace) {
                for id in ids {
                    ns.remove(id);
                }
            }
        }
        self.log_mutation(Op::Delete, namespace, ids.to_vec());
        Ok(())
    }

    async fn list_ids(
        &self,
        namespace: &str,
        page_token: Option<&str>,
        limit: usize,
    ) -> Result<IdPage> {
        self.check_failure(Op::List)?;
        let namespaces = self.namespaces.read().unwrap_or_else(PoisonError::into_inner);
        let Some(ns) = namespaces.get(namespace) else {
            return Ok(IdPage::default());
        };

        let lower = match page_token {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Unbounded,
        };
        let mut remaining = ns.range((lower, Bound::Unbounded)).map(|(id, _)| id.clone());
        let ids: Vec<String> = remaining.by_ref().take(limit.max(1)).collect();
        let next = match remaining.next() {
            Some(_) => ids.last().cloned(),
            None => None,
        };

        Ok(IdPage { ids, next })
    }

    async fn fetch_records(&self, namespace: &str, ids: &[String]) -> Result<Vec<RecordMeta>> {
        self.check_failure(Op::Fetch)?;
        let namespaces = self.namespaces.read().unwrap_or_else(PoisonError::into_inner);
        Ok(namespaces
            .get(namespace)
            .map(|ns| {
                ids.iter()
                    .filter_map(|id| ns.get(id).map(|r| r.meta.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let namespaces = self.namespaces.read().unwrap_or_else(PoisonError::into_inner);
        let counts: BTreeMap<String, u64> = namespaces
            .iter()
            .map(|(name, ns)| (name.clone(), ns.len() as u64))
            .collect();
        Ok(StoreStats {
            dimension: None,
            total_records: counts.values().sum(),
            namespaces: counts,
        })
    }
}
