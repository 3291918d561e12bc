//! Deterministic content hashing.
//!
//! Cache keys are xxh3 digests of raw bytes, immune to timestamp drift
//! from branch switching or save-without-changes. Short 8-hex digests
//! identify chunks and detect repeated sandbox code.

/// Full 16-hex xxh3 digest of raw bytes.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(bytes))
}

/// Short 8-hex digest of raw bytes.
///
/// Used for chunk content hashes and the agent engine's visited-code
/// map. Collisions are acceptable in both uses: a chunk hash collision
/// only affects display, and a visited-code collision only produces one
/// spurious "repeating yourself" nudge.
#[must_use]
pub fn short_hash(bytes: &[u8]) -> String {
    format!("{:08x}", xxhash_rust::xxh3::xxh3_64(bytes) as u32)
}

/// Stable chunk identifier.
///
/// Derived from the path, the byte span, and the chunk's content hash,
/// so re-indexing an unchanged file reproduces identical ids while any
/// content edit produces fresh ones.
#[must_use]
pub fn chunk_id(path: &str, start_byte: usize, end_byte: usize, content_hash: &str) -> String {
    let key = format!("{path}\u{1f}{start_byte}\u{1f}{end_byte}\u{1f}{content_hash}");
    content_hash_of_key(&key)
}

fn content_hash_of_key(key: &str) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash(b"hello"), content_hash(b"hello"));
        assert_ne!(content_hash(b"hello"), content_hash(b"hello!"));
        assert_eq!(content_hash(b"hello").len(), 16);
    }

    #[test]
    fn test_short_hash_is_eight_hex() {
        let h = short_hash(b"some chunk body");
        assert_eq!(h.len(), 8);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_chunk_id_changes_with_span_and_content() {
        let a = chunk_id("src/a.ts", 0, 100, "aabbccdd");
        let b = chunk_id("src/a.ts", 0, 100, "aabbccdd");
        let c = chunk_id("src/a.ts", 0, 101, "aabbccdd");
        let d = chunk_id("src/a.ts", 0, 100, "ddccbbaa");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
