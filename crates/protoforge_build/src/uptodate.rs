//! Incremental generation.

use std::path::PathBuf;

use protoforge_cache::{Fingerprint, FingerprintCache, UnitRecord};
use protoforge_codegen::{Compiler, CompilerInvoker, GenerationTaskDescriptor, InvokeError};
use protoforge_config::PluginKind;
use protoforge_diagnostics::Diagnostic;

use crate::error::UnitError;

/// Whether the compiler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The recorded output matched; the compiler was skipped.
    UpToDate,
    /// The compiler ran and its output was published.
    Generated,
}

/// A unit's generated output after [`ensure_up_to_date`].
#[derive(Debug, Clone)]
pub struct UpToDate {
    /// The unit.
    pub unit: String,
    /// Root of the unit's generated output.
    pub output_root: PathBuf,
    /// Per-generator output directories.
    pub output_dirs: Vec<PathBuf>,
    /// Fingerprint of the inputs the output was generated from.
    pub fingerprint: Fingerprint,
    /// Whether the compiler ran this time.
    pub freshness: Freshness,
    /// Number of generated files.
    pub generated_files: usize,
    /// Warnings the compiler printed (empty when skipped).
    pub diagnostics: Vec<Diagnostic>,
}

/// Fingerprints every input of a unit's planned invocations.
///
/// Covers each include root's content digest, the compiled files, every
/// generator with its options and output directory, extra compiler options,
/// the descriptor-set request and the compiler version. Batches of one unit
/// share everything except their compiled files, so the result does not
/// depend on how the unit was split.
pub fn compute_fingerprint(
    descriptors: &[GenerationTaskDescriptor],
    compiler_version: &str,
) -> Fingerprint {
    let mut builder = Fingerprint::builder(compiler_version);
    for descriptor in descriptors {
        for root in &descriptor.include_roots {
            builder.root(&root.path, root.fingerprint());
        }
        for file in &descriptor.compiled_files {
            builder.compiled_file(&file.path());
        }
        for output in &descriptor.outputs {
            let executable = match &output.plugin.kind {
                PluginKind::Builtin => None,
                PluginKind::External { path } => Some(path.as_path()),
            };
            builder.output(&output.plugin.name, executable, &output.dir, &output.plugin.options);
        }
    }
    if let Some(first) = descriptors.first() {
        builder.output_root(&first.output_root);
        for option in &first.options {
            builder.option(option);
        }
        if let Some(set) = &first.descriptor_set {
            builder.descriptor_set(&set.path, set.include_imports, set.include_source_info);
        }
    }
    builder.finish()
}

/// Makes sure a unit's generated output matches its current inputs.
///
/// When the cache holds a successful run with the same fingerprint and its
/// output directories still exist, the compiler is skipped and the existing
/// output is returned untouched. Otherwise every descriptor is run and the
/// new fingerprint is recorded, only after the output was published.
///
/// `descriptors` are the planned batches of one unit and must not be empty.
pub fn ensure_up_to_date(
    descriptors: &[GenerationTaskDescriptor],
    compiler: &Compiler,
    invoker: &CompilerInvoker,
    cache: &FingerprintCache,
) -> Result<UpToDate, UnitError> {
    let Some(first) = descriptors.first() else {
        return Err(UnitError::Io {
            unit: String::new(),
            reason: "no generation tasks to run".to_string(),
        });
    };
    let unit = first.unit.as_str();
    let fingerprint = compute_fingerprint(descriptors, &compiler.version);

    let mut output_dirs: Vec<PathBuf> = first.output_dirs();
    output_dirs.sort();

    cache.with_unit(unit, || {
        if let Some(record) = cache.lookup(unit, &fingerprint) {
            tracing::debug!(unit, "up to date ({})", fingerprint);
            return Ok(UpToDate {
                unit: unit.to_string(),
                output_root: first.output_root.clone(),
                output_dirs: output_dirs.clone(),
                fingerprint,
                freshness: Freshness::UpToDate,
                generated_files: record.generated_files,
                diagnostics: Vec::new(),
            });
        }
        tracing::debug!(unit, "out of date ({})", fingerprint);

        let runs = match invoker.invoke_all(descriptors) {
            Ok(runs) => runs,
            Err(err) => {
                // A failed publish may have left the output in an unknown state
                if matches!(err, InvokeError::Io { .. }) {
                    if let Err(e) = cache.invalidate(unit) {
                        tracing::warn!(unit, "cannot invalidate cache record: {e}");
                    }
                }
                return Err(UnitError::from_invoke(unit, err));
            }
        };

        let generated_files = runs.iter().map(|r| r.generated_files.len()).sum();
        let diagnostics = runs.into_iter().flat_map(|r| r.diagnostics).collect();

        let mut recorded_dirs = vec![first.output_root.clone()];
        recorded_dirs.extend(output_dirs.iter().cloned());
        let record = UnitRecord {
            fingerprint,
            output_dirs: recorded_dirs,
            generated_files,
        };
        if let Err(e) = cache.record_success(unit, &record) {
            tracing::warn!(unit, "cannot record fingerprint, next run regenerates: {e}");
        }

        Ok(UpToDate {
            unit: unit.to_string(),
            output_root: first.output_root.clone(),
            output_dirs: output_dirs.clone(),
            fingerprint,
            freshness: Freshness::Generated,
            generated_files,
            diagnostics,
        })
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use protoforge_cache::TreeDigest;
    use protoforge_codegen::{DescriptorSetOutput, InvokerSettings, PluginOutput};
    use protoforge_common::ContentHash;
    use protoforge_config::OutputPlugin;
    use protoforge_extract::RenameOps;
    use protoforge_resolve::{CompiledFile, ProtoRoot, RootOrigin};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Arc;

    /// Counts invocations in `calls.log` next to itself; fails on `FAIL`.
    const FAKE: &str = r#"#!/bin/sh
echo call >> "$(dirname "$0")/calls.log"
outs=""
files=""
for arg in "$@"; do
  case "$arg" in
    --*_out=*) dir="${arg#*=}"; outs="$outs $dir" ;;
    -*) ;;
    *) files="$files $arg" ;;
  esac
done
for f in $files; do
  if grep -q FAIL "$f"; then echo "$f:1:1: rejected" >&2; exit 1; fi
done
for o in $outs; do
  for f in $files; do
    cat "$f" > "$o/$(basename "$f" .proto).gen"
  done
done
"#;

    struct Fixture {
        dir: tempfile::TempDir,
        compiler: Compiler,
        invoker: CompilerInvoker,
        cache: FingerprintCache,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("fakec");
            fs::write(&script, FAKE).unwrap();
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
            fs::create_dir_all(dir.path().join("src")).unwrap();
            let compiler = Compiler::with_version(&script, "fake 1.0");
            let invoker = CompilerInvoker::new(
                compiler.clone(),
                Arc::new(RenameOps),
                InvokerSettings::default(),
            );
            let cache = FingerprintCache::open(&dir.path().join("cache"), "test").unwrap();
            Self {
                dir,
                compiler,
                invoker,
                cache,
            }
        }

        fn src(&self) -> PathBuf {
            self.dir.path().join("src")
        }

        fn write(&self, name: &str, body: &str) {
            fs::write(self.src().join(name), body).unwrap();
        }

        fn calls(&self) -> usize {
            fs::read_to_string(self.dir.path().join("calls.log"))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }

        /// A descriptor whose root digest reflects the current file contents.
        fn descriptor(&self, files: &[&str]) -> GenerationTaskDescriptor {
            let mut hasher = protoforge_common::ContentHasher::new();
            let mut names: Vec<_> = files.to_vec();
            names.sort();
            for name in &names {
                hasher.update_str(name);
                hasher.update(&fs::read(self.src().join(name)).unwrap());
            }
            let out = self.dir.path().join("out/main");
            GenerationTaskDescriptor {
                unit: "main".to_string(),
                include_roots: vec![Arc::new(ProtoRoot {
                    path: self.src(),
                    origin: RootOrigin::Directory,
                    declared: self.src(),
                    owner: "main".to_string(),
                    include_only: false,
                    digest: TreeDigest {
                        hash: hasher.finish(),
                        files: vec![],
                    },
                })],
                compiled_files: names
                    .iter()
                    .map(|n| CompiledFile {
                        root: self.src(),
                        relative: PathBuf::from(n),
                    })
                    .collect(),
                outputs: vec![PluginOutput {
                    plugin: OutputPlugin {
                        name: "java".to_string(),
                        kind: PluginKind::Builtin,
                        out_subdir: "java".to_string(),
                        options: vec![],
                    },
                    dir: out.join("java"),
                }],
                descriptor_set: None,
                options: vec![],
                output_root: out,
                batch: 0,
                batches: 1,
            }
        }

        fn ensure(&self, d: &GenerationTaskDescriptor) -> Result<UpToDate, UnitError> {
            ensure_up_to_date(std::slice::from_ref(d), &self.compiler, &self.invoker, &self.cache)
        }
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn second_run_skips_compiler() {
        let fx = Fixture::new();
        fx.write("a.proto", "message A {}");
        let d = fx.descriptor(&["a.proto"]);

        let first = fx.ensure(&d).unwrap();
        assert_eq!(first.freshness, Freshness::Generated);
        assert_eq!(first.generated_files, 1);
        let generated = d.output_root.join("java/a.gen");
        let before = read(&generated);

        let second = fx.ensure(&d).unwrap();
        assert_eq!(second.freshness, Freshness::UpToDate);
        assert_eq!(second.generated_files, 1);
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(fx.calls(), 1);
        assert_eq!(read(&generated), before);
    }

    #[test]
    fn content_change_regenerates() {
        let fx = Fixture::new();
        fx.write("a.proto", "message A {}");
        fx.ensure(&fx.descriptor(&["a.proto"])).unwrap();

        fx.write("a.proto", "message A { int32 x = 1; }");
        let d = fx.descriptor(&["a.proto"]);
        let run = fx.ensure(&d).unwrap();
        assert_eq!(run.freshness, Freshness::Generated);
        assert_eq!(fx.calls(), 2);
        assert_eq!(read(&d.output_root.join("java/a.gen")), "message A { int32 x = 1; }");
    }

    #[test]
    fn deleted_output_regenerates() {
        let fx = Fixture::new();
        fx.write("a.proto", "message A {}");
        let d = fx.descriptor(&["a.proto"]);
        fx.ensure(&d).unwrap();
        fs::remove_dir_all(&d.output_root).unwrap();

        assert_eq!(fx.ensure(&d).unwrap().freshness, Freshness::Generated);
        assert!(d.output_root.join("java/a.gen").is_file());
    }

    #[test]
    fn failure_does_not_poison_cache() {
        let fx = Fixture::new();
        fx.write("a.proto", "message A {}");
        let good = fx.descriptor(&["a.proto"]);
        let good_fp = fx.ensure(&good).unwrap().fingerprint;

        fx.write("a.proto", "FAIL");
        let bad = fx.descriptor(&["a.proto"]);
        let err = fx.ensure(&bad).unwrap_err();
        assert_eq!(err.kind(), "compiler");
        assert_eq!(fx.cache.record("main").unwrap().fingerprint, good_fp);

        // Retrying the broken input runs the compiler again
        assert!(fx.ensure(&bad).is_err());
        assert_eq!(fx.calls(), 3);
        // The previous output survives
        assert_eq!(read(&good.output_root.join("java/a.gen")), "message A {}");
    }

    #[test]
    fn fingerprint_ignores_batching() {
        let fx = Fixture::new();
        fx.write("a.proto", "A");
        fx.write("b.proto", "B");
        let whole = fx.descriptor(&["a.proto", "b.proto"]);
        let mut first = whole.clone();
        first.compiled_files.truncate(1);
        let mut second = whole.clone();
        second.compiled_files.remove(0);
        assert_eq!(
            compute_fingerprint(std::slice::from_ref(&whole), "v"),
            compute_fingerprint(&[first, second], "v")
        );
    }

    #[test]
    fn fingerprint_covers_configuration() {
        let fx = Fixture::new();
        fx.write("a.proto", "A");
        let d = fx.descriptor(&["a.proto"]);
        let base = compute_fingerprint(std::slice::from_ref(&d), "3.21.12");

        assert_ne!(base, compute_fingerprint(std::slice::from_ref(&d), "3.25.0"));

        let mut with_option = d.clone();
        with_option.outputs[0].plugin.options.push("lite".to_string());
        assert_ne!(base, compute_fingerprint(&[with_option], "3.21.12"));

        let mut with_set = d.clone();
        with_set.descriptor_set = Some(DescriptorSetOutput {
            path: d.output_root.join("descriptor_set.desc"),
            include_imports: true,
            include_source_info: false,
        });
        assert_ne!(base, compute_fingerprint(&[with_set], "3.21.12"));

        let mut other_root = d.clone();
        Arc::make_mut(&mut other_root.include_roots[0]).digest.hash = ContentHash::from_bytes(b"x");
        assert_ne!(base, compute_fingerprint(&[other_root], "3.21.12"));
    }

    #[test]
    fn empty_plan_is_rejected() {
        let fx = Fixture::new();
        let err = ensure_up_to_date(&[], &fx.compiler, &fx.invoker, &fx.cache).unwrap_err();
        assert!(err.is_environment_fault());
    }
}
