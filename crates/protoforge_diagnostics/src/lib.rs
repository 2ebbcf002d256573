//! Structured schema-compiler diagnostics.
//!
//! The external compiler reports problems as plain text on stderr/stdout. This
//! crate parses that text into [`Diagnostic`] values (file, line, column and
//! message where the compiler supplies them) and renders them for the
//! terminal or as JSON.

#![warn(missing_docs)]

pub mod diagnostic;
pub mod parse;
pub mod renderer;
pub mod severity;

pub use diagnostic::{Diagnostic, Location};
pub use parse::{parse_compiler_output, parse_line};
pub use renderer::{DiagnosticRenderer, JsonRenderer, TerminalRenderer};
pub use severity::Severity;
