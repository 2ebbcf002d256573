//! Generation task descriptors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use protoforge_config::OutputPlugin;
use protoforge_resolve::{CompiledFile, ProtoRoot};

/// One generator output of a task: the plugin and the directory it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginOutput {
    /// The generator.
    pub plugin: OutputPlugin,
    /// `<output root>/<out_subdir>`.
    pub dir: PathBuf,
}

/// Where and how to write a descriptor set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSetOutput {
    /// Final location of the descriptor set, inside the output root.
    pub path: PathBuf,
    /// Pass `--include_imports`.
    pub include_imports: bool,
    /// Pass `--include_source_info`.
    pub include_source_info: bool,
}

/// Everything needed to run the compiler once for a unit.
///
/// A unit is planned into one descriptor, or several when its command line
/// would be too long; all descriptors of a unit share the output root and
/// are published together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTaskDescriptor {
    /// The unit being generated.
    pub unit: String,
    /// Include path, in precedence order.
    pub include_roots: Vec<Arc<ProtoRoot>>,
    /// Files passed positionally, sorted.
    pub compiled_files: Vec<CompiledFile>,
    /// Root of the unit's generated output.
    pub output_root: PathBuf,
    /// Requested generator outputs.
    pub outputs: Vec<PluginOutput>,
    /// Requested descriptor set, if any.
    pub descriptor_set: Option<DescriptorSetOutput>,
    /// Extra compiler arguments, verbatim.
    pub options: Vec<String>,
    /// Zero-based batch index within the unit.
    pub batch: usize,
    /// Number of batches the unit was split into.
    pub batches: usize,
}

impl GenerationTaskDescriptor {
    /// Directories the generators write to.
    pub fn output_dirs(&self) -> Vec<PathBuf> {
        self.outputs.iter().map(|o| o.dir.clone()).collect()
    }

    /// Maps a path under the output root to the same place under `staging`.
    pub fn staged(&self, path: &Path, staging: &Path) -> PathBuf {
        match path.strip_prefix(&self.output_root) {
            Ok(relative) => staging.join(relative),
            Err(_) => staging.join(path.file_name().unwrap_or_default()),
        }
    }
}
