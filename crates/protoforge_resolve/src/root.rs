//! Resolved schema roots and compiled files.

use std::fmt;
use std::path::{Path, PathBuf};

use protoforge_cache::TreeDigest;
use protoforge_common::ContentHash;

/// Where a root's files came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootOrigin {
    /// A plain directory in the project.
    Directory,
    /// An extracted archive.
    Archive,
    /// A resolved library artifact (directory or extracted archive).
    Artifact,
}

impl fmt::Display for RootOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootOrigin::Directory => write!(f, "directory"),
            RootOrigin::Archive => write!(f, "archive"),
            RootOrigin::Artifact => write!(f, "artifact"),
        }
    }
}

/// A directory of schema files on a unit's include path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoRoot {
    /// Normalized absolute path.
    pub path: PathBuf,
    /// Kind of source the directory was produced from.
    pub origin: RootOrigin,
    /// The declared source this root was resolved from.
    pub declared: PathBuf,
    /// The unit that declared the source.
    pub owner: String,
    /// `true` for include-only sources, which are never compiled.
    pub include_only: bool,
    /// Hashes of the schema files beneath the root.
    pub digest: TreeDigest,
}

impl ProtoRoot {
    /// Content fingerprint of the whole root.
    pub fn fingerprint(&self) -> ContentHash {
        self.digest.hash
    }

    /// Schema files relative to the root, sorted.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.digest.files.iter().map(|(p, _)| p.as_path())
    }
}

/// One schema file a unit compiles.
///
/// The compiler addresses files relative to an include root, so the root is
/// kept alongside the relative path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompiledFile {
    /// The own root the file was found under.
    pub root: PathBuf,
    /// Path relative to `root`.
    pub relative: PathBuf,
}

impl CompiledFile {
    /// Absolute path of the file.
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.relative)
    }
}
