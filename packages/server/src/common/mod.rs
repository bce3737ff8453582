//! Shared utilities used across domains.

pub mod hash;

pub use hash::{hash_bytes, hash_file};
