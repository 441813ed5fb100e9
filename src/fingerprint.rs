//! Stable lookup keys: chapter filename stems and generation fingerprints

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
const FINGERPRINT_HEX_LEN: usize = 16;

/// Normalize a chapter identifier into a filename stem by stripping all
/// whitespace. Case is preserved.
///
/// Identifiers that differ only in whitespace collide on this stem. Known
/// limitation, documented in DESIGN.md.
pub fn chapter_key(identifier: &str) -> String {
    identifier.split_whitespace().collect()
}

/// Deterministic, collision-resistant fingerprint for arbitrary generation
/// input (prompt plus serialized history, or an image description).
///
/// SHA-256 truncated to a fixed prefix, rendered as lowercase hex. Two calls
/// with byte-identical input always yield the same fingerprint.
pub fn fingerprint(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..FINGERPRINT_HEX_LEN].to_string()
}
