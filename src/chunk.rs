//! Chunk identity assignment.
//!
//! Each chunk receives a positional id derived from its document source and
//! sequence index, plus a SHA-256 checksum of its content. Both are pure
//! functions of `(source, sequence_index, content)`.
//!
//! Positional ids are only stable while the split parameters are unchanged,
//! so every chunk also carries a split version tag (see [`split_version`]).

use crate::hash::checksum;
use crate::models::{Chunk, Document};

/// Build the id for the chunk at `index` within `source`.
pub fn chunk_id(source: &str, index: usize) -> String {
    format!("{}::chunk-{}", source, index)
}

/// Tag identifying the split parameters that produced a chunk set.
pub fn split_version(chunk_size: usize, chunk_overlap: usize) -> String {
    format!("v1:size={},overlap={}", chunk_size, chunk_overlap)
}

/// Annotate one chunk with its id and checksum.
pub fn identify(source: &str, index: usize, content: &str, split_version: &str) -> Chunk {
    Chunk {
        source: source.to_string(),
        sequence_index: index,
        content: content.to_string(),
        id: chunk_id(source, index),
        checksum: checksum(content),
        split_version: split_version.to_string(),
    }
}

/// Turn the ordered split output of one document into identified chunks.
/// Sequence indices are contiguous and start at 0 for every document.
pub fn assign_identity(doc: &Document, pieces: &[String], split_version: &str) -> Vec<Chunk> {
    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| identify(&doc.source, i, piece, split_version))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        assert_eq!(chunk_id("https://a.io/x", 3), "https://a.io/x::chunk-3");
    }

    #[test]
    fn test_deterministic() {
        let a = identify("u", 1, "hello", "v1:size=800,overlap=120");
        let b = identify("u", 1, "hello", "v1:size=800,overlap=120");
        assert_eq!(a, b);
    }

    #[test]
    fn test_indices_restart_per_document() {
        let version = split_version(800, 120);
        let pieces = vec!["one".to_string(), "two".to_string()];
        let first = assign_identity(&Document::new("a", "x"), &pieces, &version);
        let second = assign_identity(&Document::new("b", "y"), &pieces, &version);

        assert_eq!(first[0].id, "a::chunk-0");
        assert_eq!(first[1].id, "a::chunk-1");
        assert_eq!(second[0].id, "b::chunk-0");
        assert_eq!(first[1].checksum, second[1].checksum);
    }

    #[test]
    fn test_split_version_tracks_parameters() {
        assert_eq!(split_version(800, 120), "v1:size=800,overlap=120");
        assert_ne!(split_version(800, 120), split_version(1000, 120));
    }
}
