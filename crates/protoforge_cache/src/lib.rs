//! Incremental generation cache.
//!
//! This crate provides content hashing of schema trees, the [`Fingerprint`] of
//! a unit's generation inputs, and the per-unit [`FingerprintCache`] that lets
//! the pipeline skip the external compiler when nothing changed.

#![warn(missing_docs)]

pub mod artifact;
pub mod error;
pub mod fingerprint;
pub mod hasher;
pub mod state;

pub use artifact::ArtifactStore;
pub use error::CacheError;
pub use fingerprint::{Fingerprint, FingerprintBuilder};
pub use hasher::{SourceHasher, TreeDigest};
pub use state::{FingerprintCache, UnitRecord};
