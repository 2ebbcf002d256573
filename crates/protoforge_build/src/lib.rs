//! Build orchestration for schema code generation.
//!
//! Ties the pipeline together: units are resolved level by level along their
//! inheritance edges, planned, and handed to the compiler as soon as their
//! own resolution is done. [`ensure_up_to_date`] skips the compiler when a
//! unit's fingerprint matches its last successful run, and the
//! [`SourceRegistry`] wires generated directories back to the owning unit
//! and, as classpath only, to the units deriving from it.

#![warn(missing_docs)]

pub mod error;
pub mod expect;
pub mod registry;
pub mod scheduler;
pub mod uptodate;

pub use error::{BuildError, UnitError};
pub use expect::{check_expectations, ExpectationFailure};
pub use registry::SourceRegistry;
pub use scheduler::{clean, Build, BuildOptions, BuildReport, UnitReport};
pub use uptodate::{compute_fingerprint, ensure_up_to_date, Freshness, UpToDate};
