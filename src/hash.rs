//! Content fingerprinting.

use sha2::{Digest, Sha256};

/// SHA-256 of `text` as lowercase hex. Identical content always yields an
/// identical checksum.
pub fn checksum(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            checksum("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_empty_and_distinct() {
        assert_eq!(checksum("").len(), 64);
        assert_ne!(checksum("a"), checksum("a "));
        assert_eq!(checksum("same"), checksum("same"));
    }
}
