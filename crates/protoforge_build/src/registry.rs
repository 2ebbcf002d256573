//! Wiring generated output back into the units' compile inputs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use protoforge_resolve::UnitGraph;

/// Where each unit's generated sources go.
///
/// A unit's generated directories are compile sources of that unit only.
/// Units deriving from it see them on their classpath: they may use the
/// generated types but never compile them again. Units without an
/// inheritance path to the owner see nothing.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Vec<PathBuf>>,
    classpath: BTreeMap<String, BTreeSet<(String, PathBuf)>>,
}

impl SourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `dirs` as generated sources of `unit`.
    pub fn register(
        &mut self,
        unit: &str,
        dirs: impl IntoIterator<Item = PathBuf>,
        graph: &UnitGraph,
    ) {
        let own = self.sources.entry(unit.to_string()).or_default();
        let mut added = Vec::new();
        for dir in dirs {
            if !own.contains(&dir) {
                own.push(dir.clone());
                added.push(dir);
            }
        }
        for derived in graph.descendants(unit) {
            let entries = self.classpath.entry(derived).or_default();
            entries.extend(added.iter().map(|d| (unit.to_string(), d.clone())));
        }
    }

    /// Generated directories `unit` compiles.
    pub fn sources_of(&self, unit: &str) -> &[PathBuf] {
        self.sources.get(unit).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Generated directories of base units that `unit` may reference,
    /// ordered by owning unit then path.
    pub fn classpath_of(&self, unit: &str) -> Vec<&Path> {
        self.classpath
            .get(unit)
            .map(|entries| entries.iter().map(|(_, dir)| dir.as_path()).collect())
            .unwrap_or_default()
    }
}
