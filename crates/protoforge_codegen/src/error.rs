//! Error types for compiler invocation.

use std::path::PathBuf;

use protoforge_diagnostics::Diagnostic;

/// Errors from running the schema compiler for one unit.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// The compiler process could not be started.
    #[error("failed to run {}: {reason}", program.display())]
    Spawn {
        /// The executable.
        program: PathBuf,
        /// The OS error.
        reason: String,
    },

    /// The compiler exited with a non-zero status.
    #[error("compiler failed for unit '{unit}' (exit code {exit_code}){}", verbatim(stderr, stdout))]
    Failed {
        /// The unit being generated.
        unit: String,
        /// The process exit code, or -1 if killed by a signal.
        exit_code: i32,
        /// Captured standard output, verbatim.
        stdout: String,
        /// Captured standard error, verbatim.
        stderr: String,
        /// The output parsed into diagnostics.
        diagnostics: Vec<Diagnostic>,
    },

    /// The invocation was cancelled before it finished.
    #[error("compiler invocation for unit '{unit}' was cancelled")]
    Cancelled {
        /// The unit being generated.
        unit: String,
    },

    /// The compiler ran longer than the configured timeout.
    #[error("compiler invocation for unit '{unit}' timed out after {secs}s")]
    TimedOut {
        /// The unit being generated.
        unit: String,
        /// The timeout in seconds.
        secs: u64,
    },

    /// Staging or publishing the generated files failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The path being written.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}

impl InvokeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InvokeError::Io {
            path: path.into(),
            source,
        }
    }

    /// Parsed diagnostics carried by a failed invocation.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            InvokeError::Failed { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

fn verbatim(stderr: &str, stdout: &str) -> String {
    let mut text = String::new();
    for part in [stderr.trim_end(), stdout.trim_end()] {
        if !part.is_empty() {
            text.push('\n');
            text.push_str(part);
        }
    }
    text
}
