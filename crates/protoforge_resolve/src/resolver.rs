//! Per-unit source-set resolution.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use protoforge_cache::SourceHasher;
use protoforge_common::{normalize_path, ContentHash};
use protoforge_config::{ProjectConfig, SourceSpec};
use protoforge_extract::{ArchiveExtractor, ArchiveFormat, ArchiveRef};

use crate::error::ResolveError;
use crate::graph::UnitGraph;
use crate::root::{CompiledFile, ProtoRoot, RootOrigin};

/// A unit's resolved view of the schema world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUnit {
    /// The unit name.
    pub unit: String,
    /// Include path in precedence order: own roots, include-only roots, then
    /// each base unit's include roots in declaration order. Paths are unique.
    pub include_roots: Vec<Arc<ProtoRoot>>,
    /// Files to compile, drawn only from the unit's own non-include roots.
    pub compiled_files: Vec<CompiledFile>,
}

impl ResolvedUnit {
    /// Roots declared by this unit itself.
    pub fn own_roots(&self) -> impl Iterator<Item = &ProtoRoot> {
        self.include_roots
            .iter()
            .filter(move |r| r.owner == self.unit)
            .map(Arc::as_ref)
    }

    /// Roots that came from base units.
    pub fn inherited_roots(&self) -> impl Iterator<Item = &ProtoRoot> {
        self.include_roots
            .iter()
            .filter(move |r| r.owner != self.unit)
            .map(Arc::as_ref)
    }

    /// Include root paths, in order.
    pub fn root_paths(&self) -> Vec<&Path> {
        self.include_roots.iter().map(|r| r.path.as_path()).collect()
    }
}

#[derive(Debug, Clone)]
struct UnitSources {
    sources: Vec<SourceSpec>,
    include: Vec<SourceSpec>,
}

type Slot = Arc<OnceLock<Result<Arc<ResolvedUnit>, ResolveError>>>;

/// Resolves units on demand, memoizing each unit's result.
///
/// A unit's bases are resolved (once) before the unit itself, so resolving
/// any unit transitively resolves everything it can see. `resolve` may be
/// called from many threads; concurrent requests for one unit wait for a
/// single resolution.
#[derive(Debug)]
pub struct Resolver {
    project_dir: PathBuf,
    extension: String,
    units: BTreeMap<String, UnitSources>,
    graph: UnitGraph,
    extractor: Arc<ArchiveExtractor>,
    memo: Mutex<HashMap<String, Slot>>,
}

impl Resolver {
    /// Creates a resolver for the configured units.
    pub fn new(
        config: &ProjectConfig,
        project_dir: &Path,
        extractor: Arc<ArchiveExtractor>,
    ) -> Self {
        let units = config
            .units
            .iter()
            .map(|(name, unit)| {
                (
                    name.clone(),
                    UnitSources {
                        sources: unit.sources.clone(),
                        include: unit.include.clone(),
                    },
                )
            })
            .collect();
        Self {
            project_dir: project_dir.to_path_buf(),
            extension: config.compiler.extension.clone(),
            units,
            graph: UnitGraph::from_config(config),
            extractor,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// The unit inheritance graph.
    pub fn graph(&self) -> &UnitGraph {
        &self.graph
    }

    /// The extractor archive sources are routed through.
    pub fn extractor(&self) -> &ArchiveExtractor {
        &self.extractor
    }

    /// Resolves `unit`, reusing an earlier result if there is one.
    pub fn resolve(&self, unit: &str) -> Result<Arc<ResolvedUnit>, ResolveError> {
        let Some(sources) = self.units.get(unit) else {
            return Err(ResolveError::UnknownUnit(unit.to_string()));
        };
        let slot = {
            let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(memo.entry(unit.to_string()).or_default())
        };
        slot.get_or_init(|| self.resolve_uncached(unit, sources))
            .clone()
    }

    fn resolve_uncached(
        &self,
        unit: &str,
        sources: &UnitSources,
    ) -> Result<Arc<ResolvedUnit>, ResolveError> {
        if let Some(cycle) = self.graph.cycle_of(unit) {
            return Err(ResolveError::Cycle {
                unit: unit.to_string(),
                cycle: cycle.to_vec(),
            });
        }

        let mut roots: Vec<Arc<ProtoRoot>> = Vec::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        let own = sources.sources.iter().map(|s| (s, false));
        let include = sources.include.iter().map(|s| (s, true));
        for (spec, include_only) in own.chain(include) {
            let root = self.discover(unit, spec, include_only)?;
            if seen.insert(root.path.clone()) {
                roots.push(Arc::new(root));
            } else {
                tracing::debug!(unit, "source {} declared twice", root.path.display());
            }
        }

        let compiled_files = compiled_files(unit, &roots)?;

        for base in self.graph.bases(unit) {
            if !self.graph.contains(base) {
                return Err(ResolveError::UnknownBase {
                    unit: unit.to_string(),
                    base: base.clone(),
                });
            }
            let resolved = self.resolve(base).map_err(|e| ResolveError::Base {
                unit: unit.to_string(),
                base: base.clone(),
                source: Box::new(e),
            })?;
            for root in &resolved.include_roots {
                if seen.insert(root.path.clone()) {
                    roots.push(Arc::clone(root));
                } else {
                    tracing::debug!(
                        unit,
                        "{} from '{}' is shadowed by an earlier root",
                        root.path.display(),
                        root.owner
                    );
                }
            }
        }

        tracing::debug!(
            unit,
            "resolved {} include roots, {} compiled files",
            roots.len(),
            compiled_files.len()
        );
        Ok(Arc::new(ResolvedUnit {
            unit: unit.to_string(),
            include_roots: roots,
            compiled_files,
        }))
    }

    fn discover(
        &self,
        unit: &str,
        spec: &SourceSpec,
        include_only: bool,
    ) -> Result<ProtoRoot, ResolveError> {
        let declared = normalize_path(&self.project_dir, Path::new(spec.path()));
        let discovery = |path: &Path, reason: &str| ResolveError::Discovery {
            unit: unit.to_string(),
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let (path, origin) = match spec {
            SourceSpec::Dir { .. } => {
                if !declared.is_dir() {
                    return Err(discovery(&declared, "directory does not exist"));
                }
                (declared.clone(), RootOrigin::Directory)
            }
            SourceSpec::Archive { .. } => {
                if !declared.is_file() {
                    return Err(discovery(&declared, "archive does not exist"));
                }
                (self.extract(unit, &declared)?, RootOrigin::Archive)
            }
            SourceSpec::Artifact { .. } => {
                if declared.is_dir() {
                    (declared.clone(), RootOrigin::Artifact)
                } else if declared.is_file() && ArchiveFormat::is_archive(&declared) {
                    (self.extract(unit, &declared)?, RootOrigin::Artifact)
                } else if declared.is_file() {
                    return Err(discovery(&declared, "not a directory or supported archive"));
                } else {
                    return Err(discovery(&declared, "artifact does not exist"));
                }
            }
        };

        let digest = SourceHasher::hash_tree(&path, &self.extension)
            .map_err(|e| discovery(&path, &e.to_string()))?;

        Ok(ProtoRoot {
            path,
            origin,
            declared,
            owner: unit.to_string(),
            include_only,
            digest,
        })
    }

    fn extract(&self, unit: &str, archive: &Path) -> Result<PathBuf, ResolveError> {
        self.extractor
            .extract(&ArchiveRef::new(archive, self.extension.as_str()))
            .map_err(|source| ResolveError::Extraction {
                unit: unit.to_string(),
                source,
            })
    }
}

/// Enumerates the files under the unit's own compiled roots.
///
/// A relative path supplied by two roots with identical content is compiled
/// once; with different content it is a conflict. A file reachable through
/// two nested roots is compiled once, under the root declared first.
fn compiled_files(
    unit: &str,
    roots: &[Arc<ProtoRoot>],
) -> Result<Vec<CompiledFile>, ResolveError> {
    let mut claimed: HashMap<&Path, (&Path, ContentHash)> = HashMap::new();
    let mut physical: HashSet<PathBuf> = HashSet::new();
    let mut files = Vec::new();

    for root in roots.iter().filter(|r| r.owner == unit && !r.include_only) {
        for (relative, hash) in &root.digest.files {
            if !physical.insert(root.path.join(relative)) {
                tracing::debug!(
                    unit,
                    "{} is already compiled through an enclosing root",
                    root.path.join(relative).display()
                );
                continue;
            }
            match claimed.get(relative.as_path()) {
                Some((_, existing)) if existing == hash => continue,
                Some((first, _)) => {
                    return Err(ResolveError::ConflictingFile {
                        unit: unit.to_string(),
                        file: relative.clone(),
                        first: first.to_path_buf(),
                        second: root.path.clone(),
                    });
                }
                None => {
                    claimed.insert(relative.as_path(), (root.path.as_path(), *hash));
                    files.push(CompiledFile {
                        root: root.path.clone(),
                        relative: relative.clone(),
                    });
                }
            }
        }
    }
    Ok(files)
}
