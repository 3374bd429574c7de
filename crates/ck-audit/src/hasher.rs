// hasher.rs — SHA-256 helpers for chaining audit lines.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash that links the record serialized as `line` to its successor.
pub fn link_hash(line: &str) -> String {
    hash_str(line.trim_end())
}
