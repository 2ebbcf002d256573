//! Output resolution: merging a unit's generator requests with plugin declarations.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use protoforge_common::normalize_path;
use std::path::{Path, PathBuf};

/// How a generator is provided to the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PluginKind {
    /// Built into the compiler (`--<name>_out`).
    Builtin,
    /// An external executable registered with `--plugin=protoc-gen-<name>=<path>`.
    External {
        /// Resolved executable path.
        path: PathBuf,
    },
}

/// A fully specified generator output for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputPlugin {
    /// Generator name (builtin name or plugin id).
    pub name: String,
    /// Builtin or external executable.
    pub kind: PluginKind,
    /// Sub-directory of the unit's output root receiving this generator's files.
    pub out_subdir: String,
    /// Generator options, forwarded verbatim.
    pub options: Vec<String>,
}

impl OutputPlugin {
    /// Returns `true` for compiler built-ins.
    pub fn is_builtin(&self) -> bool {
        matches!(self.kind, PluginKind::Builtin)
    }
}

/// Resolves every generator output a unit requested.
///
/// Builtins sort before external plugins and each group is sorted by name,
/// so the resulting order (and therefore the command line) is deterministic.
pub fn resolve_outputs(
    config: &ProjectConfig,
    project_dir: &Path,
    unit_name: &str,
) -> Result<Vec<OutputPlugin>, ConfigError> {
    let unit = config
        .units
        .get(unit_name)
        .ok_or_else(|| ConfigError::UnknownUnit(unit_name.to_string()))?;

    let mut outputs = Vec::with_capacity(unit.builtins.len() + unit.plugins.len());

    // BTreeMap iteration is already name-ordered
    for (name, request) in &unit.builtins {
        outputs.push(OutputPlugin {
            name: name.clone(),
            kind: PluginKind::Builtin,
            out_subdir: request.out_subdir.clone().unwrap_or_else(|| name.clone()),
            options: request.options.clone(),
        });
    }

    for (name, request) in &unit.plugins {
        let decl = config
            .plugins
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPlugin {
                unit: unit_name.to_string(),
                plugin: name.clone(),
            })?;
        outputs.push(OutputPlugin {
            name: name.clone(),
            kind: PluginKind::External {
                path: resolve_tool_path(project_dir, &decl.path),
            },
            out_subdir: request.out_subdir.clone().unwrap_or_else(|| name.clone()),
            options: request.options.clone(),
        });
    }

    Ok(outputs)
}

/// Resolves an executable reference.
///
/// Bare names (no path separator) are left for `PATH` lookup; anything else is
/// resolved against the project directory.
pub fn resolve_tool_path(project_dir: &Path, tool: &str) -> PathBuf {
    if tool.contains(['/', '\\']) {
        normalize_path(project_dir, Path::new(tool))
    } else {
        PathBuf::from(tool)
    }
}
