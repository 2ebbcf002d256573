//! Error types for build orchestration.

use protoforge_cache::CacheError;
use protoforge_codegen::InvokeError;
use protoforge_config::ConfigError;
use protoforge_diagnostics::Diagnostic;
use protoforge_resolve::ResolveError;

/// Why one unit failed. Failures never spread to units that neither derive
/// from the failed unit nor share its broken input.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// A declared source path is missing or unreadable.
    #[error(transparent)]
    Discovery(ResolveError),

    /// An archive the unit depends on could not be extracted.
    #[error(transparent)]
    Extraction(ResolveError),

    /// The unit's source set is inconsistent (cycle, conflicting files).
    #[error(transparent)]
    Resolution(ResolveError),

    /// The compiler could not be run or rejected the schema files.
    #[error(transparent)]
    CompilerInvocation(InvokeError),

    /// Generated output could not be written or moved into place.
    #[error("unit '{unit}': {reason}")]
    Io {
        /// The affected unit.
        unit: String,
        /// The underlying failure.
        reason: String,
    },

    /// The build was aborted before the unit finished.
    #[error("unit '{unit}': cancelled")]
    Cancelled {
        /// The affected unit.
        unit: String,
    },
}

impl UnitError {
    /// Classifies a resolution failure by its root cause.
    pub fn from_resolve(err: ResolveError) -> Self {
        match err.root_cause() {
            ResolveError::Discovery { .. } => UnitError::Discovery(err),
            ResolveError::Extraction { .. } => UnitError::Extraction(err),
            _ => UnitError::Resolution(err),
        }
    }

    /// Classifies an invocation failure.
    pub fn from_invoke(unit: &str, err: InvokeError) -> Self {
        match err {
            InvokeError::Cancelled { .. } => UnitError::Cancelled {
                unit: unit.to_string(),
            },
            InvokeError::Io { .. } => UnitError::Io {
                unit: unit.to_string(),
                reason: err.to_string(),
            },
            other => UnitError::CompilerInvocation(other),
        }
    }

    /// Returns `true` for failures of the execution environment rather than
    /// of the project's inputs.
    pub fn is_environment_fault(&self) -> bool {
        matches!(self, UnitError::Io { .. })
    }

    /// Compiler diagnostics carried by the failure, if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            UnitError::CompilerInvocation(err) => err.diagnostics(),
            _ => &[],
        }
    }

    /// Short category name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            UnitError::Discovery(_) => "discovery",
            UnitError::Extraction(_) => "extraction",
            UnitError::Resolution(_) => "resolution",
            UnitError::CompilerInvocation(_) => "compiler",
            UnitError::Io { .. } => "io",
            UnitError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Failures that stop a build before any unit runs.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The configuration could not be turned into a build.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The incrementality cache could not be opened.
    #[error("cannot open cache: {0}")]
    Cache(#[from] CacheError),

    /// The compiler version could not be determined.
    #[error("cannot identify compiler: {0}")]
    Compiler(#[from] InvokeError),

    /// The worker pool could not be created.
    #[error("cannot start worker pool: {0}")]
    WorkerPool(String),

    /// Cleaning build output failed.
    #[error("cannot remove {}: {source}", path.display())]
    Io {
        /// The path being removed.
        path: std::path::PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}
