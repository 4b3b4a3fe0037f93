//! Shared types and utilities for stashbin.
//!
//! This crate provides common functionality used across all stashbin crates:
//! - Content hash computation (XXH128, used for dedup keys)
//! - Filename extension classification
//! - Shared leaf error types

pub mod error;
pub mod ext;
pub mod hash;

// Re-export commonly used items at crate root
pub use error::FileIoError;
pub use ext::{parse_extension, url_extension, Extension};
pub use hash::{hash_bytes, hash_file, Xxh3Hasher};
