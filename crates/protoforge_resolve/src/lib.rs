//! Source-set resolution for compilation units.
//!
//! For each unit the [`Resolver`] computes the ordered include roots (own
//! sources, include-only sources, then everything its base units resolved)
//! and the files that unit must compile, which only ever come from its own
//! sources. The [`UnitGraph`] orders units along their inheritance edges and
//! isolates cycles.

#![warn(missing_docs)]

pub mod error;
pub mod graph;
pub mod resolver;
pub mod root;

pub use error::ResolveError;
pub use graph::UnitGraph;
pub use resolver::{ResolvedUnit, Resolver};
pub use root::{CompiledFile, ProtoRoot, RootOrigin};
