//! Three-way delta between recorded signatures and the current chunk set.
//!
//! Matching is exact on chunk id and checksum:
//!
//! | In current | In previous | Checksum | Result |
//! |------------|-------------|----------|--------|
//! | yes | no | – | new |
//! | yes | yes | differs | changed |
//! | yes | yes | equal, other split tag | changed (retagged) |
//! | yes | yes | equal | dropped (unchanged) |
//! | no | yes | – | removed |
//!
//! New and changed chunks keep their split order; removed ids are sorted so
//! the same inputs always produce the same delta.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::error::{Result, SyncError};
use crate::models::{Chunk, Delta, Signature};

/// Compute the delta for `current` against `previous`.
///
/// `split_version` is the tag of the split parameters that produced
/// `current`; a different recorded tag sets [`Delta::reindex_required`].
///
/// Fails with [`SyncError::DuplicateIdentity`] if two current chunks share
/// an id.
pub fn compute_delta(
    previous: &HashMap<String, Signature>,
    current: Vec<Chunk>,
    split_version: &str,
) -> Result<Delta> {
    info!(
        previous_count = previous.len(),
        current_count = current.len(),
        "computing delta"
    );

    let mut current_ids = HashSet::with_capacity(current.len());
    for chunk in &current {
        if !current_ids.insert(chunk.id.as_str()) {
            return Err(SyncError::DuplicateIdentity {
                id: chunk.id.clone(),
            });
        }
    }

    let mut removed_ids: Vec<String> = previous
        .keys()
        .filter(|id| !current_ids.contains(id.as_str()))
        .cloned()
        .collect();
    removed_ids.sort();

    let reindex_required = previous
        .values()
        .any(|sig| is_stale_tag(sig, split_version));

    let mut new_chunks = Vec::new();
    let mut changed_chunks = Vec::new();
    for chunk in current {
        match previous.get(&chunk.id) {
            None => new_chunks.push(chunk),
            Some(sig) if sig.checksum != chunk.checksum => changed_chunks.push(chunk),
            // same text under a different split tag: rewrite to retag
            Some(sig) if is_stale_tag(sig, split_version) => changed_chunks.push(chunk),
            Some(_) => {}
        }
    }

    let delta = Delta {
        new_chunks,
        changed_chunks,
        removed_ids,
        reindex_required,
    };

    info!(
        new = delta.new_chunks.len(),
        changed = delta.changed_chunks.len(),
        removed = delta.removed_ids.len(),
        reindex_required,
        "delta computed"
    );

    Ok(delta)
}

/// A recorded tag that differs from the current one. Untagged records
/// predate tagging and are not treated as stale.
fn is_stale_tag(sig: &Signature, split_version: &str) -> bool {
    sig.split_version
        .as_deref()
        .is_some_and(|recorded| recorded != split_version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::identify;

    const VERSION: &str = "v1:size=800,overlap=120";

    fn chunk(source: &str, index: usize, text: &str) -> Chunk {
        identify(source, index, text, VERSION)
    }

    fn sig(checksum: &str) -> Signature {
        Signature {
            checksum: checksum.to_string(),
            storage_ref: String::new(),
            split_version: Some(VERSION.to_string()),
        }
    }

    fn ids(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_empty_previous_all_new() {
        let current = vec![chunk("u", 0, "a"), chunk("u", 1, "b"), chunk("u", 2, "c")];
        let delta = compute_delta(&HashMap::new(), current, VERSION).unwrap();
        assert_eq!(ids(&delta.new_chunks), ["u::chunk-0", "u::chunk-1", "u::chunk-2"]);
        assert!(delta.changed_chunks.is_empty());
        assert!(delta.removed_ids.is_empty());
    }

    #[test]
    fn test_changed_checksum() {
        let id1 = chunk("u", 0, "a2");
        let id2 = chunk("u", 1, "b");
        let mut previous = HashMap::new();
        previous.insert(id1.id.clone(), sig(&crate::hash::checksum("a")));
        previous.insert(id2.id.clone(), sig(&id2.checksum));

        let delta = compute_delta(&previous, vec![id1, id2], VERSION).unwrap();
        assert!(delta.new_chunks.is_empty());
        assert_eq!(ids(&delta.changed_chunks), ["u::chunk-0"]);
        assert!(delta.removed_ids.is_empty());
    }

    #[test]
    fn test_missing_id_removed() {
        let kept = chunk("u", 0, "a");
        let mut previous = HashMap::new();
        previous.insert(kept.id.clone(), sig(&kept.checksum));
        previous.insert("u::chunk-3".to_string(), sig("zz"));

        let delta = compute_delta(&previous, vec![kept], VERSION).unwrap();
        assert_eq!(delta.removed_ids, vec!["u::chunk-3".to_string()]);
        assert!(delta.new_chunks.is_empty());
        assert!(delta.changed_chunks.is_empty());
    }

    #[test]
    fn test_duplicate_identity_fails_fast() {
        let current = vec![chunk("u", 0, "a"), chunk("u", 0, "b")];
        let err = compute_delta(&HashMap::new(), current, VERSION).unwrap_err();
        assert!(matches!(err, SyncError::DuplicateIdentity { id } if id == "u::chunk-0"));
    }

    #[test]
    fn test_partition_covers_current_ids() {
        let current: Vec<Chunk> = (0..10).map(|i| chunk("u", i, &format!("t{}", i))).collect();
        let mut previous = HashMap::new();
        for c in &current[..4] {
            previous.insert(c.id.clone(), sig(&c.checksum));
        }
        for c in &current[4..7] {
            previous.insert(c.id.clone(), sig("stale"));
        }
        previous.insert("other::chunk-0".to_string(), sig("x"));

        let delta = compute_delta(&previous, current.clone(), VERSION).unwrap();

        let new: HashSet<&str> = ids(&delta.new_chunks).into_iter().collect();
        let changed: HashSet<&str> = ids(&delta.changed_chunks).into_iter().collect();
        let unchanged: HashSet<&str> = ids(&current[..4]).into_iter().collect();
        assert!(new.is_disjoint(&changed));
        assert!(new.is_disjoint(&unchanged));
        assert!(changed.is_disjoint(&unchanged));
        assert_eq!(new.len() + changed.len() + unchanged.len(), current.len());

        for removed in &delta.removed_ids {
            assert!(!new.contains(removed.as_str()));
            assert!(!changed.contains(removed.as_str()));
        }
        assert_eq!(delta.removed_ids, vec!["other::chunk-0".to_string()]);
    }

    #[test]
    fn test_deterministic_and_idempotent() {
        let current: Vec<Chunk> = (0..5).map(|i| chunk("u", i, "same")).collect();
        let mut previous = HashMap::new();
        previous.insert("gone-b".to_string(), sig("x"));
        previous.insert("gone-a".to_string(), sig("y"));
        previous.insert(current[1].id.clone(), sig("old"));

        let first = compute_delta(&previous, current.clone(), VERSION).unwrap();
        let second = compute_delta(&previous, current, VERSION).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.removed_ids, vec!["gone-a".to_string(), "gone-b".to_string()]);
    }

    #[test]
    fn test_unchanged_set_is_empty_delta() {
        let current = vec![chunk("u", 0, "a"), chunk("u", 1, "b")];
        let previous: HashMap<String, Signature> = current
            .iter()
            .map(|c| (c.id.clone(), sig(&c.checksum)))
            .collect();
        let delta = compute_delta(&previous, current, VERSION).unwrap();
        assert!(delta.is_empty());
        assert!(!delta.reindex_required);
    }

    #[test]
    fn test_split_version_mismatch_flags_reindex() {
        let mut previous = HashMap::new();
        previous.insert(
            "u::chunk-0".to_string(),
            Signature {
                checksum: "x".to_string(),
                storage_ref: "u::chunk-0".to_string(),
                split_version: Some("v1:size=1000,overlap=200".to_string()),
            },
        );
        let delta = compute_delta(&previous, vec![chunk("u", 0, "a")], VERSION).unwrap();
        assert!(delta.reindex_required);

        let mut untagged = previous.clone();
        if let Some(sig) = untagged.get_mut("u::chunk-0") {
            sig.split_version = None;
        }
        let delta = compute_delta(&untagged, vec![chunk("u", 0, "a")], VERSION).unwrap();
        assert!(!delta.reindex_required);
    }

    #[test]
    fn test_stale_tag_with_same_text_is_rewritten() {
        let current = chunk("u", 0, "a");
        let mut previous = HashMap::new();
        previous.insert(
            current.id.clone(),
            Signature {
                checksum: current.checksum.clone(),
                storage_ref: current.id.clone(),
                split_version: Some("v1:size=10,overlap=0".to_string()),
            },
        );

        let delta = compute_delta(&previous, vec![current], VERSION).unwrap();
        assert!(delta.reindex_required);
        assert_eq!(ids(&delta.changed_chunks), ["u::chunk-0"]);
        assert_eq!(delta.changed_chunks[0].split_version, VERSION);

        let mut untagged = previous.clone();
        if let Some(sig) = untagged.get_mut("u::chunk-0") {
            sig.split_version = None;
        }
        let delta = compute_delta(&untagged, vec![chunk("u", 0, "a")], VERSION).unwrap();
        assert!(delta.is_empty());
    }
}
