//! Generation planning.

use std::path::{Path, PathBuf};

use protoforge_config::{DescriptorSetConfig, OutputPlugin};
use protoforge_resolve::ResolvedUnit;

use crate::command::{build_command, command_len};
use crate::compiler::Compiler;
use crate::descriptor::{DescriptorSetOutput, GenerationTaskDescriptor, PluginOutput};

/// Output location of all generated code, relative to the build directory.
pub const GENERATED_DIR: &str = "generated/source/proto";

/// Default descriptor set file name inside a unit's output root.
const DEFAULT_DESCRIPTOR_SET: &str = "descriptor_set.desc";

/// Staging directories are siblings of output roots with a longer name;
/// each output argument is budgeted this much extra length.
const STAGING_SLACK: usize = 32;

/// Project-wide planning settings.
#[derive(Debug, Clone)]
pub struct PlannerSettings {
    /// Directory receiving one output root per unit.
    pub output_base: PathBuf,
    /// Longest command line the host accepts; `0` disables batching.
    pub max_command_len: usize,
    /// The compiler, for measuring command lines.
    pub compiler: Compiler,
}

impl PlannerSettings {
    /// Settings placing output under `<build_dir>/generated/source/proto`.
    pub fn for_build_dir(build_dir: &Path, max_command_len: usize, compiler: Compiler) -> Self {
        Self {
            output_base: build_dir.join(GENERATED_DIR),
            max_command_len,
            compiler,
        }
    }
}

/// Per-unit generation settings beyond its resolved sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitRequest<'a> {
    /// The unit name.
    pub name: &'a str,
    /// Extra compiler options, forwarded verbatim.
    pub options: &'a [String],
    /// Descriptor set request.
    pub descriptor_set: Option<&'a DescriptorSetConfig>,
}

impl<'a> UnitRequest<'a> {
    /// A request with no extra options and no descriptor set.
    pub fn named(name: &'a str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }
}

/// Turns resolved units into generation tasks.
#[derive(Debug, Clone)]
pub struct Planner {
    settings: PlannerSettings,
}

impl Planner {
    /// Creates a planner.
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    /// The unit's output root.
    pub fn output_root(&self, unit: &str) -> PathBuf {
        self.settings.output_base.join(unit)
    }

    /// Plans the compiler invocations for one unit.
    ///
    /// Every output shares each invocation so the compiler parses the schema
    /// files once. The unit is split into batches of compiled files only when
    /// a single command line would exceed the limit, and never when a
    /// descriptor set is requested. Returns nothing when the unit has no
    /// files to compile or nothing to generate.
    pub fn plan(
        &self,
        unit: &UnitRequest<'_>,
        resolved: &ResolvedUnit,
        plugins: &[OutputPlugin],
    ) -> Vec<GenerationTaskDescriptor> {
        if resolved.compiled_files.is_empty() {
            return Vec::new();
        }
        if plugins.is_empty() && unit.descriptor_set.is_none() {
            tracing::debug!(unit = unit.name, "no generators requested");
            return Vec::new();
        }

        let output_root = self.output_root(unit.name);
        let outputs: Vec<PluginOutput> = plugins
            .iter()
            .map(|plugin| PluginOutput {
                plugin: plugin.clone(),
                dir: output_root.join(&plugin.out_subdir),
            })
            .collect();
        let descriptor_set = unit.descriptor_set.map(|d| DescriptorSetOutput {
            path: output_root.join(d.path.as_deref().unwrap_or(DEFAULT_DESCRIPTOR_SET)),
            include_imports: d.include_imports,
            include_source_info: d.include_source_info,
        });

        let mut compiled_files = resolved.compiled_files.clone();
        compiled_files.sort_by_key(|f| f.path());

        let template = GenerationTaskDescriptor {
            unit: unit.name.to_string(),
            include_roots: resolved.include_roots.clone(),
            compiled_files: Vec::new(),
            output_root: output_root.clone(),
            outputs,
            descriptor_set,
            options: unit.options.to_vec(),
            batch: 0,
            batches: 1,
        };

        let batches = self.split(&template, compiled_files);
        let count = batches.len();
        if count > 1 {
            tracing::debug!(unit = unit.name, "command line too long, split into {count} batches");
        }
        batches
            .into_iter()
            .enumerate()
            .map(|(i, files)| GenerationTaskDescriptor {
                compiled_files: files,
                batch: i,
                batches: count,
                ..template.clone()
            })
            .collect()
    }

    /// Packs files, in order, into the fewest batches that fit.
    fn split(
        &self,
        template: &GenerationTaskDescriptor,
        files: Vec<protoforge_resolve::CompiledFile>,
    ) -> Vec<Vec<protoforge_resolve::CompiledFile>> {
        let limit = self.settings.max_command_len;
        if limit == 0 || template.descriptor_set.is_some() {
            return vec![files];
        }

        let fixed = command_len(&build_command(
            &self.settings.compiler,
            template,
            &template.output_root,
        )) + STAGING_SLACK * (template.outputs.len() + 1);
        let file_len = |f: &protoforge_resolve::CompiledFile| f.path().as_os_str().len() + 1;

        let total: usize = fixed + files.iter().map(file_len).sum::<usize>();
        if total <= limit {
            return vec![files];
        }

        let mut batches = Vec::new();
        let mut current = Vec::new();
        let mut current_len = fixed;
        for file in files {
            let len = file_len(&file);
            if !current.is_empty() && current_len + len > limit {
                batches.push(std::mem::take(&mut current));
                current_len = fixed;
            }
            current_len += len;
            current.push(file);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }
}
