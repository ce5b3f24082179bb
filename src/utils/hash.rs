// src/utils/hash.rs
// Centralized SHA-256 hashing utility

use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of a string and return hex-encoded result
///
/// Used for webhook body fingerprinting and idempotency keys throughout the
/// sync pipeline.
pub fn sha256_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compute SHA-256 hash of bytes and return hex-encoded result
pub fn sha256_hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hash() {
        let hash = sha256_hash("hello world");
        assert_eq!(hash.len(), 64);

        let hash2 = sha256_hash("hello world");
        assert_eq!(hash, hash2);

        let hash3 = sha256_hash("hello world!");
        assert_ne!(hash, hash3);
    }

    #[test]
    fn test_sha256_hash_bytes_matches_str() {
        let hash = sha256_hash_bytes(b"hello world");
        let hash_str = sha256_hash("hello world");
        assert_eq!(hash, hash_str);
    }
}
