//! Configuration types deserialized from `protoforge.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// The top-level project configuration parsed from `protoforge.toml`.
///
/// Contains project metadata, the schema compiler settings, worker limits,
/// external plugin declarations, every compilation unit, and the optional
/// expectation manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata (name, build directory).
    pub project: ProjectMeta,
    /// Schema compiler settings.
    #[serde(default)]
    pub compiler: CompilerConfig,
    /// Parallelism and filesystem strategy settings.
    #[serde(default)]
    pub workers: WorkerConfig,
    /// External code-generator plugins, keyed by plugin id.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginDecl>,
    /// Compilation units keyed by unit name (e.g. "main", "test").
    #[serde(default)]
    pub units: BTreeMap<String, UnitConfig>,
    /// Expected compiled-file counts, checked by `protoforge check`.
    #[serde(default)]
    pub expect: Vec<Expectation>,
}

/// Core project metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
    /// Build directory holding generated output, extractions and the cache.
    #[serde(default = "default_build_dir")]
    pub build_dir: String,
}

fn default_build_dir() -> String {
    "build".to_string()
}

/// Settings for the external schema compiler.
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerConfig {
    /// Executable name (looked up on `PATH`) or path relative to the project.
    #[serde(default = "default_compiler_path")]
    pub path: String,
    /// Version identifier used in fingerprints. Probed with `--version` if absent.
    #[serde(default)]
    pub version: Option<String>,
    /// Schema file extension, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Per-invocation timeout in seconds. Zero disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Longest command line, in bytes, before files are split into batches.
    #[serde(default = "default_max_command_len")]
    pub max_command_len: usize,
}

fn default_compiler_path() -> String {
    "protoc".to_string()
}

fn default_extension() -> String {
    "proto".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_max_command_len() -> usize {
    30_000
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            path: default_compiler_path(),
            version: None,
            extension: default_extension(),
            timeout_secs: default_timeout_secs(),
            max_command_len: default_max_command_len(),
        }
    }
}

/// Parallelism and filesystem strategy settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs. Defaults to the host's available parallelism.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Strategy for unpacking archives and publishing generated output.
    #[serde(default)]
    pub file_ops: FileOpsKind,
}

/// Which filesystem strategy to use for unpack and publish operations.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileOpsKind {
    /// Detect once at start-up (rename when staging and output share a device).
    #[default]
    Auto,
    /// Stream archives and publish by directory rename.
    Rename,
    /// Buffer archives and publish by copy-then-rename.
    Copy,
}

/// Declaration of an external code-generator plugin executable.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginDecl {
    /// Executable path, relative to the project or looked up on `PATH`.
    pub path: String,
}

/// A single compilation unit (e.g. "main", "test", "androidTest").
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitConfig {
    /// Whether this is an ordinary unit or a platform variant.
    #[serde(default)]
    pub kind: UnitKind,
    /// Own schema sources, in declaration order. Their files are compiled.
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    /// Include-only sources: on the include path, never compiled.
    #[serde(default)]
    pub include: Vec<SourceSpec>,
    /// Units whose resolved roots this unit may see, in precedence order.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub bases: Vec<String>,
    /// Built-in generators requested for this unit, keyed by generator name.
    #[serde(default)]
    pub builtins: BTreeMap<String, OutputRequest>,
    /// External plugins requested for this unit, keyed by plugin id.
    #[serde(default)]
    pub plugins: BTreeMap<String, OutputRequest>,
    /// Emit a descriptor set alongside generated code.
    #[serde(default)]
    pub descriptor_set: Option<DescriptorSetConfig>,
    /// Extra compiler arguments forwarded verbatim.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub options: Vec<String>,
}

/// The kind of a compilation unit.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// An ordinary source set.
    #[default]
    Ordinary,
    /// A platform or build variant.
    Variant,
}

/// Specification of one schema source.
///
/// Uses serde's untagged enum to distinguish directories, archives, and
/// artifacts supplied by dependency resolution.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SourceSpec {
    /// A plain directory of schema files.
    Dir {
        /// The directory path.
        dir: String,
    },
    /// A `.tar.gz`, `.tgz`, `.tar`, `.zip` or `.jar` archive of schema files.
    Archive {
        /// The archive path.
        archive: String,
    },
    /// An already-resolved dependency artifact (directory or archive).
    Artifact {
        /// The artifact path.
        artifact: String,
    },
}

impl SourceSpec {
    /// Returns the declared path string.
    pub fn path(&self) -> &str {
        match self {
            SourceSpec::Dir { dir } => dir,
            SourceSpec::Archive { archive } => archive,
            SourceSpec::Artifact { artifact } => artifact,
        }
    }
}

/// One requested generator output for a unit.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct OutputRequest {
    /// Generator options, joined with `,` on the command line.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub options: Vec<String>,
    /// Output sub-directory under the unit's output root. Defaults to the name.
    #[serde(default)]
    pub out_subdir: Option<String>,
}

/// Descriptor set generation settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DescriptorSetConfig {
    /// Output path; defaults to `descriptor_set.desc` in the unit's output root.
    #[serde(default)]
    pub path: Option<String>,
    /// Include all transitive imports in the set.
    #[serde(default)]
    pub include_imports: bool,
    /// Retain source info (comments, locations) in the set.
    #[serde(default)]
    pub include_source_info: bool,
}

/// An expected compiled-file count for one unit.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Expectation {
    /// The unit name.
    pub unit: String,
    /// Exact number of files the unit must compile.
    pub compiled: usize,
}

/// Deserializes a field that can be either a single string or a list of strings.
///
/// Allows `bases = "main"` as well as `bases = ["main", "shared"]`.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}
