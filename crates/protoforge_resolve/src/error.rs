//! Error types for source-set resolution.

use std::path::PathBuf;

use protoforge_extract::ExtractError;

/// Errors that prevent a unit's source set from being resolved.
///
/// Every variant names the unit it fails. Errors are `Clone` because a
/// failed unit's error is also reported, wrapped in [`ResolveError::Base`],
/// by each unit deriving from it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// A declared source path is missing or unreadable.
    #[error("unit '{unit}': cannot read source {path}: {reason}")]
    Discovery {
        /// The declaring unit.
        unit: String,
        /// The offending path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// An archive the unit references could not be extracted.
    #[error("unit '{unit}': {source}")]
    Extraction {
        /// The referencing unit.
        unit: String,
        /// The extraction failure, shared by every unit using the archive.
        source: ExtractError,
    },

    /// The unit is part of a cycle of base units.
    #[error("unit '{unit}' is part of a base-unit cycle: {}", cycle.join(" -> "))]
    Cycle {
        /// The unit being resolved.
        unit: String,
        /// The units forming the cycle.
        cycle: Vec<String>,
    },

    /// The unit is not configured.
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    /// A base unit named by the unit is not configured.
    #[error("unit '{unit}' derives from unknown unit '{base}'")]
    UnknownBase {
        /// The derived unit.
        unit: String,
        /// The missing base.
        base: String,
    },

    /// Two of the unit's own roots supply different content for the same file.
    #[error(
        "unit '{unit}': {} is provided by both {} and {} with different content",
        file.display(),
        first.display(),
        second.display()
    )]
    ConflictingFile {
        /// The unit being resolved.
        unit: String,
        /// The file path relative to its root.
        file: PathBuf,
        /// The root that claimed the file first.
        first: PathBuf,
        /// The root with the conflicting copy.
        second: PathBuf,
    },

    /// A base unit failed to resolve.
    #[error("unit '{unit}': base unit '{base}' failed: {source}")]
    Base {
        /// The derived unit.
        unit: String,
        /// The failed base.
        base: String,
        /// Why the base failed.
        source: Box<ResolveError>,
    },
}

impl ResolveError {
    /// The unit this error was raised for.
    pub fn unit(&self) -> &str {
        match self {
            ResolveError::Discovery { unit, .. }
            | ResolveError::Extraction { unit, .. }
            | ResolveError::Cycle { unit, .. }
            | ResolveError::UnknownBase { unit, .. }
            | ResolveError::ConflictingFile { unit, .. }
            | ResolveError::Base { unit, .. } => unit,
            ResolveError::UnknownUnit(unit) => unit,
        }
    }

    /// Follows [`ResolveError::Base`] links to the error that started the chain.
    pub fn root_cause(&self) -> &ResolveError {
        match self {
            ResolveError::Base { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
