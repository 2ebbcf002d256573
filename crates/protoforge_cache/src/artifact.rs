//! Checksummed binary record storage.
//!
//! Records (per-unit generation state) are stored as binary files in
//! subdirectories of the cache. Each record has a header containing magic
//! bytes, format version, the tool version that wrote it and a checksum of
//! the payload. Writes go to a temporary sibling and are renamed into place,
//! so a reader never observes a half-written record.

use std::io::Write;
use std::path::{Path, PathBuf};

use protoforge_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Magic bytes identifying a protoforge cache record.
const RECORD_MAGIC: [u8; 4] = *b"PFRG";

/// Current record format version. Increment on breaking changes to
/// the header or payload format.
const RECORD_FORMAT_VERSION: u32 = 1;

/// Header prepended to every record for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordHeader {
    /// Magic bytes: must be `b"PFRG"`.
    pub magic: [u8; 4],

    /// Record format version.
    pub format_version: u32,

    /// Tool version that produced this record.
    pub tool_version: String,

    /// Content hash of the payload data.
    pub checksum: ContentHash,
}

/// Keyed store for binary records.
///
/// Each record is stored at `<cache_dir>/<subdir>/<key>.<ext>`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    cache_dir: PathBuf,
    tool_version: String,
}

impl ArtifactStore {
    /// Creates a store rooted at `cache_dir` that writes and accepts records
    /// tagged with `tool_version`.
    pub fn new(cache_dir: &Path, tool_version: &str) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            tool_version: tool_version.to_string(),
        }
    }

    /// The root directory of the store.
    pub fn root(&self) -> &Path {
        &self.cache_dir
    }

    /// Ensures that the given subdirectory exists.
    pub fn ensure_dirs(&self, subdir: &str) -> Result<(), CacheError> {
        let dir = self.cache_dir.join(subdir);
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::io(dir, e))
    }

    /// Returns the file path for a record with the given key.
    pub fn record_path(&self, subdir: &str, key: &str, ext: &str) -> PathBuf {
        self.cache_dir.join(subdir).join(format!("{key}.{ext}"))
    }

    /// Writes a record atomically.
    pub fn write_record(
        &self,
        subdir: &str,
        key: &str,
        ext: &str,
        data: &[u8],
    ) -> Result<PathBuf, CacheError> {
        self.ensure_dirs(subdir)?;
        let path = self.record_path(subdir, key, ext);

        let header = RecordHeader {
            magic: RECORD_MAGIC,
            format_version: RECORD_FORMAT_VERSION,
            tool_version: self.tool_version.clone(),
            checksum: ContentHash::from_bytes(data),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        // 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + data.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(data);

        let dir = self.cache_dir.join(subdir);
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| CacheError::io(&dir, e))?;
        tmp.write_all(&output)
            .map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| CacheError::io(&path, e.error))?;

        Ok(path)
    }

    /// Reads a record, validating its header.
    ///
    /// Returns `None` if the file doesn't exist or fails validation, so
    /// damage results in a cache miss rather than an error.
    pub fn read_record(&self, subdir: &str, key: &str, ext: &str) -> Option<Vec<u8>> {
        let path = self.record_path(subdir, key, ext);
        let raw = std::fs::read(&path).ok()?;
        match self.validate(&path, &raw) {
            Ok(payload) => Some(payload.to_vec()),
            Err(e) => {
                tracing::debug!("discarding cache record: {e}");
                None
            }
        }
    }

    fn validate<'a>(&self, path: &Path, raw: &'a [u8]) -> Result<&'a [u8], CacheError> {
        let invalid = |reason: &str| CacheError::InvalidHeader {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if raw.len() < 4 {
            return Err(invalid("truncated header length"));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&raw[..4]);
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        if raw.len() < 4 + header_len {
            return Err(invalid("truncated header"));
        }

        let (header, _): (RecordHeader, usize) =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .map_err(|e| invalid(&e.to_string()))?;

        if header.magic != RECORD_MAGIC {
            return Err(invalid("missing magic bytes"));
        }
        if header.format_version != RECORD_FORMAT_VERSION {
            return Err(invalid(&format!(
                "unsupported format version {}",
                header.format_version
            )));
        }
        if header.tool_version != self.tool_version {
            return Err(CacheError::VersionMismatch {
                path: path.to_path_buf(),
                expected: self.tool_version.clone(),
                actual: header.tool_version,
            });
        }

        let payload = &raw[4 + header_len..];
        let actual = ContentHash::from_bytes(payload);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: header.checksum.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(payload)
    }

    /// Deletes one record. Missing records are not an error.
    pub fn remove(&self, subdir: &str, key: &str, ext: &str) -> Result<(), CacheError> {
        let path = self.record_path(subdir, key, ext);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Removes records that are not in the set of live keys.
    ///
    /// Returns the number of files removed.
    pub fn gc(&self, subdir: &str, ext: &str, live_keys: &[&str]) -> Result<usize, CacheError> {
        let dir = self.cache_dir.join(subdir);
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        let entries = std::fs::read_dir(&dir).map_err(|e| CacheError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !live_keys.contains(&stem) {
                    std::fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}
