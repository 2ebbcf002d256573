//! Shared foundational types used across the protoforge workspace.
//!
//! This crate provides content hashing for fingerprints and extraction keys,
//! plus the path helpers every stage uses to compare schema roots.

#![warn(missing_docs)]

pub mod hash;
pub mod paths;

pub use hash::{ContentHash, ContentHasher};
pub use paths::{has_extension, normalize_path};
