//! Per-unit generation state.
//!
//! After a successful generation the pipeline records the unit's
//! [`Fingerprint`] together with the output directories it populated. The
//! next run computes a fresh fingerprint and skips the compiler when it
//! matches and the outputs are still present.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactStore;
use crate::error::CacheError;
use crate::fingerprint::Fingerprint;

const UNITS_DIR: &str = "units";
const STATE_EXT: &str = "state";

/// What the cache remembers about a unit's last successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Fingerprint of the inputs that produced the outputs.
    pub fingerprint: Fingerprint,
    /// Output directories the generation populated.
    pub output_dirs: Vec<PathBuf>,
    /// Number of files the compiler generated.
    pub generated_files: usize,
}

/// Persistent store of [`UnitRecord`]s, one per unit.
///
/// Reads are fail-safe: a missing, damaged or foreign record is a miss.
/// Callers that check and then update a unit's record should do so inside
/// [`with_unit`](Self::with_unit) so concurrent work on the same unit is
/// serialized.
#[derive(Debug)]
pub struct FingerprintCache {
    store: ArtifactStore,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FingerprintCache {
    /// Opens (creating if needed) the cache rooted at `dir`.
    ///
    /// Records written by a different `tool_version` are ignored.
    pub fn open(dir: &Path, tool_version: &str) -> Result<Self, CacheError> {
        let store = ArtifactStore::new(dir, tool_version);
        store.ensure_dirs(UNITS_DIR)?;
        Ok(Self {
            store,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        self.store.root()
    }

    /// Runs `f` while holding the lock for `unit`.
    pub fn with_unit<R>(&self, unit: &str, f: impl FnOnce() -> R) -> R {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(unit.to_string()).or_default())
        };
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Reads the stored record for `unit`, if any.
    pub fn record(&self, unit: &str) -> Option<UnitRecord> {
        let payload = self.store.read_record(UNITS_DIR, unit, STATE_EXT)?;
        bincode::serde::decode_from_slice(&payload, bincode::config::standard())
            .ok()
            .map(|(record, _)| record)
    }

    /// Returns the stored record when it matches `fingerprint` and all of its
    /// output directories still exist.
    pub fn lookup(&self, unit: &str, fingerprint: &Fingerprint) -> Option<UnitRecord> {
        let record = self.record(unit)?;
        if record.fingerprint != *fingerprint {
            tracing::debug!(unit, "fingerprint changed");
            return None;
        }
        if let Some(missing) = record.output_dirs.iter().find(|d| !d.is_dir()) {
            tracing::debug!(unit, "output directory {} is missing", missing.display());
            return None;
        }
        Some(record)
    }

    /// Stores the record of a successful generation.
    pub fn record_success(&self, unit: &str, record: &UnitRecord) -> Result<(), CacheError> {
        let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;
        self.store.write_record(UNITS_DIR, unit, STATE_EXT, &payload)?;
        Ok(())
    }

    /// Forgets the record for `unit`.
    pub fn invalidate(&self, unit: &str) -> Result<(), CacheError> {
        self.store.remove(UNITS_DIR, unit, STATE_EXT)
    }

    /// Removes records of units not in `live_units`. Returns how many were removed.
    pub fn gc(&self, live_units: &[&str]) -> Result<usize, CacheError> {
        self.store.gc(UNITS_DIR, STATE_EXT, live_units)
    }

    /// Deletes every record, whichever tool version wrote it. Returns how
    /// many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        self.store.gc(UNITS_DIR, STATE_EXT, &[])
    }
}
