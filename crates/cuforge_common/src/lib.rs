//! Shared foundational types for the Cuforge kernel compilation cache.
//!
//! This crate provides the deterministic 64-bit content hash that both cache
//! tiers key on.

#![warn(missing_docs)]

pub mod hash;

pub use hash::Hash64;
