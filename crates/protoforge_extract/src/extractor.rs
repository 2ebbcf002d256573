//! Exactly-once, content-addressed archive extraction.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use protoforge_common::{has_extension, ContentHash, ContentHasher};

use crate::error::ExtractError;
use crate::format::{ArchiveFormat, ArchiveRef};
use crate::ops::FileOps;

/// Marker written into a finished extraction directory.
const COMPLETE_MARKER: &str = ".complete";

type Slot = Arc<OnceLock<Result<PathBuf, ExtractError>>>;

/// Unpacks archives into `<root>/<fingerprint>` directories.
///
/// The fingerprint covers the archive bytes and the member filter, so two
/// references to identical archives share one directory. Within a process,
/// concurrent requests for one fingerprint block behind a single extraction
/// and then observe its result (including its failure). Across processes, a
/// directory carrying the completion marker is reused as-is.
#[derive(Debug)]
pub struct ArchiveExtractor {
    root: PathBuf,
    ops: Arc<dyn FileOps>,
    slots: Mutex<HashMap<ContentHash, Slot>>,
    extractions: AtomicUsize,
}

impl ArchiveExtractor {
    /// Creates an extractor that unpacks under `root` using `ops`.
    pub fn new(root: impl Into<PathBuf>, ops: Arc<dyn FileOps>) -> Self {
        Self {
            root: root.into(),
            ops,
            slots: Mutex::new(HashMap::new()),
            extractions: AtomicUsize::new(0),
        }
    }

    /// The extraction root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of physical extractions this extractor has performed.
    pub fn extraction_count(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    /// Computes the fingerprint an archive reference is keyed by.
    pub fn fingerprint(archive: &ArchiveRef) -> Result<ContentHash, ExtractError> {
        let bytes = fs::read(&archive.path).map_err(|e| ExtractError::Unreadable {
            archive: archive.path.clone(),
            reason: e.to_string(),
        })?;
        let mut hasher = ContentHasher::new();
        hasher.update(&bytes).update_str(&archive.extension);
        Ok(hasher.finish())
    }

    /// Returns the directory holding the archive's schema files, extracting
    /// it first if no caller has done so yet.
    pub fn extract(&self, archive: &ArchiveRef) -> Result<PathBuf, ExtractError> {
        let format =
            ArchiveFormat::from_path(&archive.path).ok_or_else(|| ExtractError::UnsupportedFormat {
                archive: archive.path.clone(),
            })?;
        let fingerprint = Self::fingerprint(archive)?;

        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(fingerprint).or_default())
        };
        slot.get_or_init(|| self.extract_once(archive, format, fingerprint))
            .clone()
    }

    fn extract_once(
        &self,
        archive: &ArchiveRef,
        format: ArchiveFormat,
        fingerprint: ContentHash,
    ) -> Result<PathBuf, ExtractError> {
        let dest = self.root.join(fingerprint.to_string());
        if dest.join(COMPLETE_MARKER).is_file() {
            tracing::debug!(
                "reusing extraction of {} at {}",
                archive.path.display(),
                dest.display()
            );
            return Ok(dest);
        }

        fs::create_dir_all(&self.root).map_err(|e| ExtractError::io(&self.root, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(&self.root)
            .map_err(|e| ExtractError::io(&self.root, e))?;

        let extension = archive.extension.as_str();
        let accept = |member: &Path| has_extension(member, extension);
        let files = self
            .ops
            .unpack(&archive.path, format, staging.path(), &accept)?;

        let marker = staging.path().join(COMPLETE_MARKER);
        fs::write(&marker, fingerprint.to_string()).map_err(|e| ExtractError::io(&marker, e))?;
        self.ops
            .publish(staging.path(), &dest)
            .map_err(|e| ExtractError::io(&dest, e))?;

        self.extractions.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            "extracted {files} schema files from {} ({format})",
            archive.path.display()
        );
        Ok(dest)
    }
}
