//! The build scheduler.
//!
//! Units are resolved one inheritance level at a time, in parallel within a
//! level, on a resolution pool. As soon as a unit is resolved its generation
//! is spawned onto the worker pool, so a derived unit's resolution never
//! waits for its base unit's compiler run. The worker count bounds the number
//! of compiler processes alive at once, and separately the resolution
//! threads.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rayon::prelude::*;

use protoforge_cache::FingerprintCache;
use protoforge_codegen::{
    CancelToken, Compiler, CompilerInvoker, GenerationTaskDescriptor, InvokerSettings, Planner,
    PlannerSettings, UnitRequest, GENERATED_DIR,
};
use protoforge_config::{
    resolve_outputs, resolve_tool_path, ConfigError, OutputPlugin, ProjectConfig,
};
use protoforge_diagnostics::Diagnostic;
use protoforge_extract::{select_file_ops, sweep_scratch, ArchiveExtractor};
use protoforge_resolve::{ResolvedUnit, Resolver};

use crate::error::{BuildError, UnitError};
use crate::registry::SourceRegistry;
use crate::uptodate::{ensure_up_to_date, Freshness, UpToDate};

/// Extracted archives, relative to the build directory.
pub const EXTRACT_DIR: &str = "extracted-protos";

/// Incrementality records, relative to the build directory.
pub const CACHE_DIR: &str = ".protoforge-cache";

const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Per-run options on top of the project configuration.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Worker limit; overrides `workers.limit`.
    pub workers: Option<usize>,
    /// Units to generate; empty means all. Their bases are still resolved.
    pub units: Vec<String>,
    /// Ignore recorded fingerprints and run the compiler for every unit.
    pub force: bool,
    /// Aborts in-flight compiler runs when cancelled.
    pub cancel: CancelToken,
}

/// What happened to one unit.
#[derive(Debug)]
pub struct UnitReport {
    /// The unit.
    pub unit: String,
    /// Whether the unit's source set was resolved.
    pub resolved: bool,
    /// Include roots in precedence order.
    pub include_roots: Vec<PathBuf>,
    /// Files compiled for the unit.
    pub compiled_files: Vec<PathBuf>,
    /// The generated output, `None` when there was nothing to generate.
    pub outcome: Result<Option<UpToDate>, UnitError>,
}

impl UnitReport {
    fn failed(unit: &str, err: UnitError) -> Self {
        Self {
            unit: unit.to_string(),
            resolved: false,
            include_roots: Vec::new(),
            compiled_files: Vec::new(),
            outcome: Err(err),
        }
    }

    /// Number of compiled files, when the unit resolved.
    pub fn compiled_count(&self) -> Option<usize> {
        self.resolved.then_some(self.compiled_files.len())
    }

    /// Whether the compiler ran, if output was produced.
    pub fn freshness(&self) -> Option<Freshness> {
        match &self.outcome {
            Ok(Some(output)) => Some(output.freshness),
            _ => None,
        }
    }
}

/// Result of a build.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Per-unit results, by unit name.
    pub units: BTreeMap<String, UnitReport>,
    /// Generated source directories and their visibility.
    pub registry: SourceRegistry,
    /// Archives physically extracted during this build.
    pub extractions: usize,
}

impl BuildReport {
    /// Returns `true` when every unit succeeded.
    pub fn is_success(&self) -> bool {
        self.units.values().all(|u| u.outcome.is_ok())
    }

    /// The report for `unit`.
    pub fn unit(&self, unit: &str) -> Option<&UnitReport> {
        self.units.get(unit)
    }

    /// Failed units with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &UnitError)> {
        self.units.values().filter_map(|u| match &u.outcome {
            Err(e) => Some((u.unit.as_str(), e)),
            Ok(_) => None,
        })
    }

    /// Every compiler diagnostic, warnings of successful units included.
    pub fn diagnostics(&self) -> Vec<&Diagnostic> {
        self.units
            .values()
            .flat_map(|u| match &u.outcome {
                Ok(Some(output)) => output.diagnostics.iter().collect::<Vec<_>>(),
                Ok(None) => Vec::new(),
                Err(e) => e.diagnostics().iter().collect(),
            })
            .collect()
    }
}

/// A configured build, ready to run.
#[derive(Debug)]
pub struct Build {
    config: ProjectConfig,
    options: BuildOptions,
    outputs: BTreeMap<String, Vec<OutputPlugin>>,
    compiler: Compiler,
    resolver: Resolver,
    planner: Planner,
    invoker: CompilerInvoker,
    cache: FingerprintCache,
    pool: rayon::ThreadPool,
    resolve_pool: rayon::ThreadPool,
}

impl Build {
    /// Prepares a build of `config` rooted at `project_dir`.
    ///
    /// Identifies the compiler (running it with `--version` unless the
    /// configuration pins a version), chooses the filesystem strategy and
    /// opens the incrementality cache.
    pub fn new(
        config: ProjectConfig,
        project_dir: &Path,
        options: BuildOptions,
    ) -> Result<Self, BuildError> {
        for unit in &options.units {
            if !config.units.contains_key(unit) {
                return Err(ConfigError::UnknownUnit(unit.clone()).into());
            }
        }
        let mut outputs = BTreeMap::new();
        for unit in config.units.keys() {
            outputs.insert(unit.clone(), resolve_outputs(&config, project_dir, unit)?);
        }

        let build_dir = project_dir.join(&config.project.build_dir);
        let compiler_path = resolve_tool_path(project_dir, &config.compiler.path);
        let compiler = match &config.compiler.version {
            Some(version) => Compiler::with_version(compiler_path, version.clone()),
            None => Compiler::probe(&compiler_path)?,
        };
        tracing::debug!("compiler {} ({})", compiler.path.display(), compiler.version);

        let extract_root = build_dir.join(EXTRACT_DIR);
        let ops = select_file_ops(
            config.workers.file_ops,
            &extract_root,
            &build_dir.join(GENERATED_DIR),
        );
        tracing::debug!("file operations: {}", ops.name());
        for dir in [extract_root.clone(), build_dir.join(GENERATED_DIR)] {
            match sweep_scratch(&dir) {
                Ok(0) => {}
                Ok(n) => {
                    tracing::debug!("removed {n} stale scratch directories in {}", dir.display());
                }
                Err(e) => tracing::warn!("cannot sweep {}: {e}", dir.display()),
            }
        }

        let extractor = Arc::new(ArchiveExtractor::new(extract_root, Arc::clone(&ops)));
        let resolver = Resolver::new(&config, project_dir, extractor);
        let planner = Planner::new(PlannerSettings::for_build_dir(
            &build_dir,
            config.compiler.max_command_len,
            compiler.clone(),
        ));
        let timeout = (config.compiler.timeout_secs > 0)
            .then(|| Duration::from_secs(config.compiler.timeout_secs));
        let invoker = CompilerInvoker::new(
            compiler.clone(),
            ops,
            InvokerSettings {
                timeout,
                cancel: options.cancel.clone(),
                ..InvokerSettings::default()
            },
        );
        let cache = FingerprintCache::open(&build_dir.join(CACHE_DIR), TOOL_VERSION)?;

        let workers = options.workers.or(config.workers.limit).unwrap_or(0);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("protoforge-worker-{i}"))
            .build()
            .map_err(|e| BuildError::WorkerPool(e.to_string()))?;
        let resolve_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("protoforge-resolve-{i}"))
            .build()
            .map_err(|e| BuildError::WorkerPool(e.to_string()))?;

        Ok(Self {
            config,
            options,
            outputs,
            compiler,
            resolver,
            planner,
            invoker,
            cache,
            pool,
            resolve_pool,
        })
    }

    /// The identified compiler.
    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    /// The resolver, for inspecting resolved units.
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Resolves, plans and generates every selected unit.
    ///
    /// A failing unit fails itself and the units deriving from it; every
    /// other unit still runs to completion.
    pub fn run(&self) -> BuildReport {
        let selected = self.selected();
        let reports: Mutex<BTreeMap<String, UnitReport>> = Mutex::new(BTreeMap::new());
        let store = |report: UnitReport| {
            let mut reports = reports.lock().unwrap_or_else(PoisonError::into_inner);
            reports.insert(report.unit.clone(), report);
        };

        // The calling thread only resolves; compiler runs stay on the workers.
        self.pool.in_place_scope(|scope| {
            for level in self.resolver.graph().levels() {
                let level: Vec<String> = level
                    .into_iter()
                    .filter(|u| selected.contains(u.as_str()))
                    .collect();
                let resolved: Vec<_> = self.resolve_pool.install(|| {
                    level
                        .into_par_iter()
                        .map(|unit| {
                            let result = self.resolver.resolve(&unit);
                            (unit, result)
                        })
                        .collect()
                });

                for (unit, result) in resolved {
                    match result {
                        Ok(resolved) => {
                            let store = &store;
                            scope.spawn(move |_| store(self.generate(&unit, &resolved)));
                        }
                        Err(err) => {
                            tracing::debug!(unit = unit.as_str(), "resolution failed: {err}");
                            store(UnitReport::failed(&unit, UnitError::from_resolve(err)));
                        }
                    }
                }
            }
        });

        let units = reports.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut registry = SourceRegistry::new();
        for report in units.values() {
            if let Ok(Some(output)) = &report.outcome {
                registry.register(
                    &report.unit,
                    output.output_dirs.iter().cloned(),
                    self.resolver.graph(),
                );
            }
        }

        let live: Vec<&str> = self.config.units.keys().map(String::as_str).collect();
        match self.cache.gc(&live) {
            Ok(0) => {}
            Ok(n) => tracing::debug!("dropped {n} records of removed units"),
            Err(e) => tracing::warn!("cache cleanup failed: {e}"),
        }

        BuildReport {
            units,
            registry,
            extractions: self.resolver.extractor().extraction_count(),
        }
    }

    /// Resolves and plans the selected units without running the compiler.
    pub fn plan_only(&self) -> BTreeMap<String, Result<Vec<GenerationTaskDescriptor>, UnitError>> {
        let selected: Vec<String> = self.selected().into_iter().collect();
        self.resolve_pool.install(|| {
            selected
                .into_par_iter()
                .map(|unit| {
                    let plan = self
                        .resolver
                        .resolve(&unit)
                        .map(|resolved| self.plan_unit(&unit, &resolved))
                        .map_err(UnitError::from_resolve);
                    (unit, plan)
                })
                .collect()
        })
    }

    fn selected(&self) -> BTreeSet<String> {
        if self.options.units.is_empty() {
            self.config.units.keys().cloned().collect()
        } else {
            self.options.units.iter().cloned().collect()
        }
    }

    fn plan_unit(&self, unit: &str, resolved: &ResolvedUnit) -> Vec<GenerationTaskDescriptor> {
        let Some(config) = self.config.units.get(unit) else {
            return Vec::new();
        };
        let request = UnitRequest {
            name: unit,
            options: &config.options,
            descriptor_set: config.descriptor_set.as_ref(),
        };
        let plugins = self.outputs.get(unit).map(Vec::as_slice).unwrap_or(&[]);
        self.planner.plan(&request, resolved, plugins)
    }

    fn generate(&self, unit: &str, resolved: &ResolvedUnit) -> UnitReport {
        let outcome = self.generate_unit(unit, resolved);
        match &outcome {
            Ok(Some(output)) if output.freshness == Freshness::Generated => {
                tracing::info!(unit, "generated {} files", output.generated_files);
            }
            Ok(Some(_)) => tracing::info!(unit, "up to date"),
            Ok(None) => tracing::info!(unit, "nothing to generate"),
            Err(e) => tracing::info!(unit, "failed: {}", e.kind()),
        }
        UnitReport {
            unit: unit.to_string(),
            resolved: true,
            include_roots: resolved.root_paths().into_iter().map(Path::to_path_buf).collect(),
            compiled_files: resolved.compiled_files.iter().map(|f| f.path()).collect(),
            outcome,
        }
    }

    fn generate_unit(
        &self,
        unit: &str,
        resolved: &ResolvedUnit,
    ) -> Result<Option<UpToDate>, UnitError> {
        if self.options.cancel.is_cancelled() {
            return Err(UnitError::Cancelled {
                unit: unit.to_string(),
            });
        }
        let descriptors = self.plan_unit(unit, resolved);
        if descriptors.is_empty() {
            self.remove_stale_output(unit)?;
            return Ok(None);
        }
        if self.options.force {
            if let Err(e) = self.cache.invalidate(unit) {
                tracing::warn!(unit, "cannot invalidate cache record: {e}");
            }
        }
        ensure_up_to_date(&descriptors, &self.compiler, &self.invoker, &self.cache).map(Some)
    }

    /// Drops output left behind by a unit that no longer generates anything.
    fn remove_stale_output(&self, unit: &str) -> Result<(), UnitError> {
        let output_root = self.planner.output_root(unit);
        self.cache.with_unit(unit, || {
            if output_root.exists() {
                tracing::debug!(unit, "removing stale output {}", output_root.display());
                fs::remove_dir_all(&output_root).map_err(|e| UnitError::Io {
                    unit: unit.to_string(),
                    reason: format!("cannot remove {}: {e}", output_root.display()),
                })?;
            }
            if let Err(e) = self.cache.invalidate(unit) {
                tracing::warn!(unit, "cannot invalidate cache record: {e}");
            }
            Ok(())
        })
    }
}

/// Removes generated output, extracted archives and cache records.
///
/// Returns the directories that had something to remove.
pub fn clean(config: &ProjectConfig, project_dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let build_dir = project_dir.join(&config.project.build_dir);
    let mut removed = Vec::new();
    for dir in [build_dir.join(GENERATED_DIR), build_dir.join(EXTRACT_DIR)] {
        match fs::remove_dir_all(&dir) {
            Ok(()) => removed.push(dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(BuildError::Io { path: dir, source }),
        }
    }

    let cache_dir = build_dir.join(CACHE_DIR);
    if cache_dir.is_dir() {
        let cache = FingerprintCache::open(&cache_dir, TOOL_VERSION)?;
        let records = cache.clear()?;
        if records > 0 {
            tracing::debug!("dropped {records} cache records");
            removed.push(cache.root().to_path_buf());
        }
    }
    Ok(removed)
}
