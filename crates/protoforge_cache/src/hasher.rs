//! Content hashing of schema files and schema trees.
//!
//! A schema root is summarized as a [`TreeDigest`]: the sorted list of schema
//! files beneath it with their individual hashes, folded into one root hash.
//! Fingerprints and conflict checks are both computed from digests.

use std::path::{Path, PathBuf};

use protoforge_common::{has_extension, ContentHash, ContentHasher};

use crate::error::CacheError;

/// Hashes of every schema file under one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDigest {
    /// Hash over all relative paths and file hashes, in order.
    pub hash: ContentHash,
    /// Schema files relative to the root, sorted, with their content hashes.
    pub files: Vec<(PathBuf, ContentHash)>,
}

/// Utility for computing content hashes of schema files.
pub struct SourceHasher;

impl SourceHasher {
    /// Computes the content hash of a single file.
    pub fn hash_file(path: &Path) -> Result<ContentHash, CacheError> {
        let content = std::fs::read(path).map_err(|e| CacheError::io(path, e))?;
        Ok(ContentHash::from_bytes(&content))
    }

    /// Walks `root` and hashes every file with the given extension.
    ///
    /// Symlinked directories are not followed. The walk is sorted so the
    /// digest only depends on names and contents.
    pub fn hash_tree(root: &Path, extension: &str) -> Result<TreeDigest, CacheError> {
        let mut relative = Vec::new();
        collect_files(root, Path::new(""), extension, &mut relative)?;
        relative.sort();

        let mut hasher = ContentHasher::new();
        let mut files = Vec::with_capacity(relative.len());
        for rel in relative {
            let hash = Self::hash_file(&root.join(&rel))?;
            hasher.update_str(&portable(&rel));
            hasher.update_hash(&hash);
            files.push((rel, hash));
        }

        Ok(TreeDigest {
            hash: hasher.finish(),
            files,
        })
    }
}

fn collect_files(
    root: &Path,
    prefix: &Path,
    extension: &str,
    out: &mut Vec<PathBuf>,
) -> Result<(), CacheError> {
    let dir = root.join(prefix);
    let entries = std::fs::read_dir(&dir).map_err(|e| CacheError::io(&dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io(&dir, e))?;
        let file_type = entry.file_type().map_err(|e| CacheError::io(entry.path(), e))?;
        let rel = prefix.join(entry.file_name());
        if file_type.is_dir() {
            collect_files(root, &rel, extension, out)?;
        } else if has_extension(&rel, extension) && entry.path().is_file() {
            out.push(rel);
        }
    }
    Ok(())
}

/// Forward-slash form of a relative path, so digests match across platforms.
fn portable(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn hash_file_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.proto");
        fs::write(&file, "syntax = \"proto3\";").unwrap();

        let h1 = SourceHasher::hash_file(&file).unwrap();
        let h2 = SourceHasher::hash_file(&file).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_file_nonexistent() {
        let result = SourceHasher::hash_file(Path::new("/nonexistent/file.proto"));
        assert!(matches!(result, Err(CacheError::Io { .. })));
    }

    #[test]
    fn tree_filters_by_extension_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "z.proto", "z");
        write(dir.path(), "a/b.proto", "b");
        write(dir.path(), "a/readme.md", "no");
        write(dir.path(), "a.protobuf", "no");

        let digest = SourceHasher::hash_tree(dir.path(), "proto").unwrap();
        let names: Vec<_> = digest.files.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("a/b.proto"), PathBuf::from("z.proto")]);
        assert_eq!(digest.files.len(), 2);
    }

    #[test]
    fn tree_hash_tracks_content_and_names() {
        let one = tempfile::tempdir().unwrap();
        let two = tempfile::tempdir().unwrap();
        write(one.path(), "a.proto", "message A {}");
        write(two.path(), "a.proto", "message A {}");
        let d1 = SourceHasher::hash_tree(one.path(), "proto").unwrap();
        let d2 = SourceHasher::hash_tree(two.path(), "proto").unwrap();
        assert_eq!(d1.hash, d2.hash);

        write(two.path(), "a.proto", "message B {}");
        let d3 = SourceHasher::hash_tree(two.path(), "proto").unwrap();
        assert_ne!(d1.hash, d3.hash);

        fs::rename(two.path().join("a.proto"), two.path().join("b.proto")).unwrap();
        write(two.path(), "b.proto", "message A {}");
        let d4 = SourceHasher::hash_tree(two.path(), "proto").unwrap();
        assert_ne!(d1.hash, d4.hash);
    }

    #[test]
    fn empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let digest = SourceHasher::hash_tree(dir.path(), "proto").unwrap();
        assert!(digest.files.is_empty());
    }
}
