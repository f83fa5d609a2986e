//! Deterministic 64-bit content hashing for cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A deterministic 64-bit hash computed using XXH3, used for compile
/// fingerprints and artifact cache keys.
///
/// Two inputs with the same `Hash64` are assumed equivalent for caching
/// purposes. The `Display` form is 16 lowercase hex characters, rendered as
/// two fixed-width 32-bit halves; artifact filenames use this form directly.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash64(u64);

impl Hash64 {
    /// Computes the hash of a byte slice using XXH3-64.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_64(data))
    }

    /// Finalizes a raw 64-bit accumulator into a well-mixed hash.
    ///
    /// Used after order-independent accumulation (summing contributions),
    /// where the plain sum has weaker avalanche properties than a hash.
    pub fn from_accumulator(value: u64) -> Self {
        Self::from_bytes(&value.to_le_bytes())
    }

    /// Combines two hashes into one with a fixed, deterministic mixing
    /// function. Not commutative: `a.mix(b) != b.mix(a)` in general.
    pub fn mix(self, other: Hash64) -> Hash64 {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&self.0.to_le_bytes());
        buf[8..].copy_from_slice(&other.0.to_le_bytes());
        Self::from_bytes(&buf)
    }

    /// Returns the raw 64-bit value.
    pub fn value(self) -> u64 {
        self.0
    }

    /// Returns the upper 32 bits.
    pub fn hi(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the lower 32 bits.
    pub fn lo(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Hash64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}{:08x}", self.hi(), self.lo())
    }
}

impl fmt::Debug for Hash64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash64({:08x}..)", self.hi())
    }
}
