//! Fingerprints of generation inputs.
//!
//! A [`Fingerprint`] summarizes everything that influences what the compiler
//! writes for a unit: the content of each include root, the compiled file
//! list, every generator with its options, the output location and the
//! compiler version. Two runs with equal fingerprints produce equal output.

use std::fmt;
use std::path::Path;

use protoforge_common::{ContentHash, ContentHasher};
use serde::{Deserialize, Serialize};

/// A digest over one unit's generation inputs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(ContentHash);

impl Fingerprint {
    /// Starts building a fingerprint for the given compiler version.
    pub fn builder(compiler_version: &str) -> FingerprintBuilder {
        FingerprintBuilder::new(compiler_version)
    }

    /// The underlying content hash.
    pub fn hash(&self) -> ContentHash {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0.short(12))
    }
}

/// Accumulates fingerprint inputs.
///
/// Roots, compiled files and outputs are order-insensitive and sorted before
/// hashing; extra compiler options keep their order since the compiler sees
/// them in sequence.
#[derive(Debug, Clone, Default)]
pub struct FingerprintBuilder {
    compiler_version: String,
    roots: Vec<(String, ContentHash)>,
    compiled: Vec<String>,
    outputs: Vec<String>,
    options: Vec<String>,
    output_root: String,
    descriptor_set: String,
}

impl FingerprintBuilder {
    /// Creates an empty builder.
    pub fn new(compiler_version: &str) -> Self {
        Self {
            compiler_version: compiler_version.to_string(),
            ..Self::default()
        }
    }

    /// Adds an include root and the digest of its content.
    pub fn root(&mut self, path: &Path, content: ContentHash) -> &mut Self {
        self.roots.push((path.to_string_lossy().into_owned(), content));
        self
    }

    /// Adds a compiled file path.
    pub fn compiled_file(&mut self, path: &Path) -> &mut Self {
        self.compiled.push(path.to_string_lossy().into_owned());
        self
    }

    /// Adds a generator output.
    pub fn output(
        &mut self,
        name: &str,
        executable: Option<&Path>,
        dir: &Path,
        options: &[String],
    ) -> &mut Self {
        let executable = executable
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.outputs.push(format!(
            "{name}\u{0}{executable}\u{0}{}\u{0}{}",
            dir.to_string_lossy(),
            options.join("\u{1}")
        ));
        self
    }

    /// Adds an extra compiler option.
    pub fn option(&mut self, option: &str) -> &mut Self {
        self.options.push(option.to_string());
        self
    }

    /// Sets the unit's output root.
    pub fn output_root(&mut self, path: &Path) -> &mut Self {
        self.output_root = path.to_string_lossy().into_owned();
        self
    }

    /// Records the descriptor-set request.
    pub fn descriptor_set(
        &mut self,
        path: &Path,
        include_imports: bool,
        include_source_info: bool,
    ) -> &mut Self {
        self.descriptor_set = format!(
            "{}\u{0}{include_imports}\u{0}{include_source_info}",
            path.to_string_lossy()
        );
        self
    }

    /// Computes the fingerprint.
    pub fn finish(&self) -> Fingerprint {
        let mut roots = self.roots.clone();
        roots.sort();
        roots.dedup();
        let mut compiled = self.compiled.clone();
        compiled.sort();
        compiled.dedup();
        let mut outputs = self.outputs.clone();
        outputs.sort();
        outputs.dedup();

        let mut hasher = ContentHasher::new();
        hasher.update_str("compiler");
        hasher.update_str(&self.compiler_version);

        hasher.update_str("roots");
        hasher.update(&(roots.len() as u64).to_le_bytes());
        for (path, content) in &roots {
            hasher.update_str(path);
            hasher.update_hash(content);
        }

        hasher.update_str("compiled");
        hasher.update(&(compiled.len() as u64).to_le_bytes());
        for path in &compiled {
            hasher.update_str(path);
        }

        hasher.update_str("outputs");
        hasher.update(&(outputs.len() as u64).to_le_bytes());
        for output in &outputs {
            hasher.update_str(output);
        }

        hasher.update_str("options");
        hasher.update(&(self.options.len() as u64).to_le_bytes());
        for option in &self.options {
            hasher.update_str(option);
        }

        hasher.update_str("output_root");
        hasher.update_str(&self.output_root);
        hasher.update_str("descriptor_set");
        hasher.update_str(&self.descriptor_set);

        Fingerprint(hasher.finish())
    }
}
