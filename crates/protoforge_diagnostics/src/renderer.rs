//! Diagnostic rendering backends for human-readable and machine-readable output.

use crate::diagnostic::Diagnostic;

/// Trait for rendering diagnostics into formatted output strings.
///
/// Implementations format diagnostics for different output targets:
/// the terminal (human-readable) and JSON lines (machine-readable).
pub trait DiagnosticRenderer {
    /// Renders a single diagnostic into a formatted string.
    fn render(&self, diag: &Diagnostic) -> String;
}

/// Renders diagnostics in a compiler-style terminal format.
///
/// Produces output like:
/// ```text
/// error: Expected ";".
///   --> src/main/proto/foo.proto:12:5
///    = unit: main
///    = note: ...
/// ```
pub struct TerminalRenderer {
    /// Whether to use ANSI color codes in output.
    pub color: bool,
}

impl TerminalRenderer {
    /// Creates a new terminal renderer.
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl DiagnosticRenderer for TerminalRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        let mut out = String::new();

        if self.color {
            out.push_str(&format!(
                "{}{}\x1b[0m: {}\n",
                diag.severity.ansi(),
                diag.severity,
                diag.message
            ));
        } else {
            out.push_str(&format!("{}: {}\n", diag.severity, diag.message));
        }

        if let Some(location) = &diag.location {
            out.push_str(&format!("  --> {location}\n"));
        }

        if let Some(unit) = &diag.unit {
            out.push_str(&format!("   = unit: {unit}\n"));
        }

        for note in &diag.notes {
            out.push_str(&format!("   = note: {note}\n"));
        }

        out
    }
}

/// Renders each diagnostic as one line of JSON.
pub struct JsonRenderer;

impl DiagnosticRenderer for JsonRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        // Diagnostic contains only strings, paths and integers
        serde_json::to_string(diag).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}
