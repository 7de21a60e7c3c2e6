//! # Content Digests
//!
//! SHA-256 digests recorded on every ready variant so operators can verify
//! that a formatted object still matches what the index says was written.

use sha2::{Digest, Sha256};

/// Compute the lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
