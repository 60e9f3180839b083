//! Deterministic keys for stored objects.
//!
//! A key is a 128-bit blake3-derived identifier. Named keys hash the name,
//! fresh keys hash a process-unique counter, and segment keys are derived
//! from their column key plus the segment index, so the same column always
//! yields the same segment keys.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Immutable, globally unique identifier naming one stored object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(u128);

impl Key {
    /// Key derived from a user-visible name. Same name, same key.
    pub fn named(name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"name:");
        hasher.update(name.as_bytes());
        Self::from_hash(hasher.finalize())
    }

    /// Fresh key, unique within this process.
    pub fn make() -> Self {
        let seq = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"anon:");
        hasher.update(&std::process::id().to_le_bytes());
        hasher.update(&seq.to_le_bytes());
        hasher.update(&nanos.to_le_bytes());
        Self::from_hash(hasher.finalize())
    }

    /// Key of the `index`-th child of `parent` (e.g. a column's segments).
    pub fn derive(parent: Key, index: usize) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"child:");
        hasher.update(&parent.0.to_le_bytes());
        hasher.update(&(index as u64).to_le_bytes());
        Self::from_hash(hasher.finalize())
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    fn from_hash(hash: blake3::Hash) -> Self {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash.as_bytes()[0..16]);
        Key(u128::from_le_bytes(bytes))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:032x}", self.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}
