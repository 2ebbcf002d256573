//! The schema compiler executable and its version.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::InvokeError;

/// A schema compiler with a known version identifier.
///
/// The version is part of every fingerprint, so upgrading the compiler
/// regenerates everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiler {
    /// Executable path, or a bare name looked up on `PATH`.
    pub path: PathBuf,
    /// Version identifier.
    pub version: String,
}

impl Compiler {
    /// Uses a declared version without running the compiler.
    pub fn with_version(path: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
        }
    }

    /// Runs `<path> --version` and uses its trimmed output as the version.
    pub fn probe(path: &Path) -> Result<Self, InvokeError> {
        let output = Command::new(path)
            .arg("--version")
            .output()
            .map_err(|e| InvokeError::Spawn {
                program: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(InvokeError::Failed {
                unit: String::new(),
                exit_code: output.status.code().unwrap_or(-1),
                stdout,
                stderr,
                diagnostics: Vec::new(),
            });
        }

        let version = stdout.trim().to_string();
        tracing::debug!("{} reports version '{version}'", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            version,
        })
    }
}
