//! Key-hash load balancing strategy.
//!
//! `index = sha256(key) mod len(healthy)`. The same key maps to the same
//! position in the currently healthy, id-ordered set. When that set changes
//! between calls the mapped server can change too.

use sha2::{Digest, Sha256};

use crate::load_balancer::{Selector, Server};

/// Stable hash of the selection key.
#[derive(Debug, Default)]
pub struct KeyHash;

impl KeyHash {
    pub fn new() -> Self {
        Self
    }
}

/// First eight bytes of the SHA-256 digest, big-endian.
pub fn stable_hash(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

impl Selector for KeyHash {
    fn next_server<'a>(&self, healthy: &[&'a Server], key: &str) -> Option<&'a Server> {
        if healthy.is_empty() {
            return None;
        }
        let index = (stable_hash(key) % healthy.len() as u64) as usize;
        Some(healthy[index])
    }

    fn name(&self) -> &'static str {
        "key_hash"
    }
}
