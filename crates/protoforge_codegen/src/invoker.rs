//! Running the schema compiler.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use protoforge_diagnostics::{parse_compiler_output, Diagnostic, Severity};
use protoforge_extract::FileOps;

use crate::cancel::CancelToken;
use crate::command::build_command;
use crate::compiler::Compiler;
use crate::descriptor::GenerationTaskDescriptor;
use crate::error::InvokeError;

/// Result of one successful compiler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Files this run generated, at their published locations.
    pub generated_files: Vec<PathBuf>,
    /// Warnings and notes the compiler printed.
    pub diagnostics: Vec<Diagnostic>,
    /// The process exit code (always `0` here; failures are errors).
    pub exit_code: i32,
}

/// Invocation limits.
#[derive(Debug, Clone)]
pub struct InvokerSettings {
    /// Kill the compiler after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Shared cancellation flag.
    pub cancel: CancelToken,
    /// How often a running process is checked for exit, cancellation and timeout.
    pub poll_interval: Duration,
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            cancel: CancelToken::new(),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Runs compiler invocations and publishes their output.
///
/// Output is written to a staging directory beside the unit's output root and
/// swapped into place only after every batch of the unit succeeded. A failed,
/// cancelled or timed-out run leaves the previous output untouched.
#[derive(Debug)]
pub struct CompilerInvoker {
    compiler: Compiler,
    ops: Arc<dyn FileOps>,
    settings: InvokerSettings,
}

impl CompilerInvoker {
    /// Creates an invoker.
    pub fn new(compiler: Compiler, ops: Arc<dyn FileOps>, settings: InvokerSettings) -> Self {
        Self {
            compiler,
            ops,
            settings,
        }
    }

    /// The compiler this invoker runs.
    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    /// Runs a single descriptor and publishes its output.
    pub fn invoke(&self, descriptor: &GenerationTaskDescriptor) -> Result<Invocation, InvokeError> {
        let mut runs = self.invoke_all(std::slice::from_ref(descriptor))?;
        Ok(runs.remove(0))
    }

    /// Runs every batch of one unit into a shared staging directory and
    /// publishes the result once all of them succeeded.
    ///
    /// All descriptors must share one output root.
    pub fn invoke_all(
        &self,
        descriptors: &[GenerationTaskDescriptor],
    ) -> Result<Vec<Invocation>, InvokeError> {
        let Some(first) = descriptors.first() else {
            return Ok(Vec::new());
        };
        let unit = first.unit.as_str();
        let output_root = first.output_root.as_path();

        let parent = output_root
            .parent()
            .ok_or_else(|| InvokeError::io(output_root, std::io::ErrorKind::InvalidInput.into()))?;
        fs::create_dir_all(parent).map_err(|e| InvokeError::io(parent, e))?;
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{unit}.staging-"))
            .tempdir_in(parent)
            .map_err(|e| InvokeError::io(parent, e))?;

        prepare_staging(first, staging.path())?;

        let mut seen = BTreeSet::new();
        let mut runs = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if self.settings.cancel.is_cancelled() {
                return Err(InvokeError::Cancelled {
                    unit: unit.to_string(),
                });
            }
            let argv = build_command(&self.compiler, descriptor, staging.path());
            tracing::info!(
                "compiling {} files for {unit} (batch {}/{})",
                descriptor.compiled_files.len(),
                descriptor.batch + 1,
                descriptor.batches
            );
            tracing::debug!("{}", display_command(&argv));

            let diagnostics = self.run(unit, &argv)?;

            let mut generated = Vec::new();
            list_files(staging.path(), Path::new(""), &mut |rel| {
                if seen.insert(rel.to_path_buf()) {
                    generated.push(output_root.join(rel));
                }
            })
            .map_err(|e| InvokeError::io(staging.path(), e))?;
            generated.sort();

            runs.push(Invocation {
                generated_files: generated,
                diagnostics,
                exit_code: 0,
            });
        }

        self.ops
            .publish(staging.path(), output_root)
            .map_err(|e| InvokeError::io(output_root, e))?;
        tracing::info!("published {} files to {}", seen.len(), output_root.display());
        Ok(runs)
    }

    /// Runs one command to completion, honouring cancellation and the timeout.
    fn run(&self, unit: &str, argv: &[OsString]) -> Result<Vec<Diagnostic>, InvokeError> {
        let program = PathBuf::from(&argv[0]);
        let mut child = Command::new(&program)
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| InvokeError::Spawn {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        // Drain both pipes so a chatty compiler cannot block on a full buffer
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    kill(&mut child);
                    return Err(InvokeError::io(&program, e));
                }
            }
            if self.settings.cancel.is_cancelled() {
                kill(&mut child);
                return Err(InvokeError::Cancelled {
                    unit: unit.to_string(),
                });
            }
            if let Some(timeout) = self.settings.timeout {
                if started.elapsed() >= timeout {
                    kill(&mut child);
                    return Err(InvokeError::TimedOut {
                        unit: unit.to_string(),
                        secs: timeout.as_secs(),
                    });
                }
            }
            thread::sleep(self.settings.poll_interval);
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if status.success() {
            let mut diagnostics = parse_compiler_output(&stderr, Severity::Warning);
            diagnostics.extend(parse_compiler_output(&stdout, Severity::Note));
            Ok(tag(diagnostics, unit))
        } else {
            let mut diagnostics = parse_compiler_output(&stderr, Severity::Error);
            diagnostics.extend(parse_compiler_output(&stdout, Severity::Error));
            Err(InvokeError::Failed {
                unit: unit.to_string(),
                exit_code: status.code().unwrap_or(-1),
                stdout,
                stderr,
                diagnostics: tag(diagnostics, unit),
            })
        }
    }
}

/// Creates every directory the compiler will write into.
fn prepare_staging(descriptor: &GenerationTaskDescriptor, staging: &Path) -> Result<(), InvokeError> {
    for output in &descriptor.outputs {
        let dir = descriptor.staged(&output.dir, staging);
        fs::create_dir_all(&dir).map_err(|e| InvokeError::io(&dir, e))?;
    }
    if let Some(set) = &descriptor.descriptor_set {
        let path = descriptor.staged(&set.path, staging);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| InvokeError::io(parent, e))?;
        }
    }
    Ok(())
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn tag(diagnostics: Vec<Diagnostic>, unit: &str) -> Vec<Diagnostic> {
    diagnostics.into_iter().map(|d| d.for_unit(unit)).collect()
}

fn list_files(root: &Path, prefix: &Path, f: &mut dyn FnMut(&Path)) -> std::io::Result<()> {
    for entry in fs::read_dir(root.join(prefix))? {
        let entry = entry?;
        let rel = prefix.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            list_files(root, &rel, f)?;
        } else {
            f(&rel);
        }
    }
    Ok(())
}

fn display_command(argv: &[OsString]) -> String {
    argv.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::descriptor::PluginOutput;
    use protoforge_cache::TreeDigest;
    use protoforge_common::ContentHash;
    use protoforge_config::{OutputPlugin, PluginKind};
    use protoforge_extract::RenameOps;
    use protoforge_resolve::{CompiledFile, ProtoRoot, RootOrigin};
    use std::os::unix::fs::PermissionsExt;

    /// A compiler stand-in: copies each positional file into every `--*_out`
    /// directory, fails on files containing `SYNTAX_ERROR` and sleeps on
    /// files containing `SLEEP`.
    const FAKE: &str = r#"#!/bin/sh
outs=""
files=""
for arg in "$@"; do
  case "$arg" in
    --*_out=*) dir="${arg#*=}"; dir="${dir#*:}"; outs="$outs $dir" ;;
    -*) ;;
    *) files="$files $arg" ;;
  esac
done
status=0
for f in $files; do
  if grep -q SYNTAX_ERROR "$f"; then echo "$f:1:1: Expected top-level statement." >&2; status=1; fi
  if grep -q SLEEP "$f"; then sleep 5; fi
done
[ $status -ne 0 ] && exit $status
for o in $outs; do
  for f in $files; do
    base=$(basename "$f" .proto)
    echo "// generated from $base" > "$o/$base.gen"
  done
done
echo "warning: fake compiler in use" >&2
exit 0
"#;

    fn setup(files: &[(&str, &str)]) -> (tempfile::TempDir, Compiler, GenerationTaskDescriptor) {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fakec");
        fs::write(&script, FAKE).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        for (name, body) in files {
            fs::write(src.join(name), body).unwrap();
        }
        let out = dir.path().join("build/generated/source/proto/main");
        let descriptor = GenerationTaskDescriptor {
            unit: "main".to_string(),
            include_roots: vec![Arc::new(ProtoRoot {
                path: src.clone(),
                origin: RootOrigin::Directory,
                declared: src.clone(),
                owner: "main".to_string(),
                include_only: false,
                digest: TreeDigest {
                    hash: ContentHash::from_bytes(b"src"),
                    files: vec![],
                },
            })],
            compiled_files: files
                .iter()
                .map(|(name, _)| CompiledFile {
                    root: src.clone(),
                    relative: PathBuf::from(name),
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
        };
        (dir, Compiler::with_version(script, "fake 1.0"), descriptor)
    }

    fn invoker(compiler: Compiler, settings: InvokerSettings) -> CompilerInvoker {
        CompilerInvoker::new(compiler, Arc::new(RenameOps), settings)
    }

    #[test]
    fn success_publishes_and_reports_files() {
        let (_dir, compiler, d) = setup(&[("a.proto", "message A {}"), ("b.proto", "message B {}")]);
        let run = invoker(compiler, InvokerSettings::default()).invoke(&d).unwrap();
        assert_eq!(run.exit_code, 0);
        assert_eq!(
            run.generated_files,
            vec![d.output_root.join("java/a.gen"), d.output_root.join("java/b.gen")]
        );
        assert!(d.output_root.join("java/a.gen").is_file());
        assert_eq!(run.diagnostics.len(), 1);
        assert_eq!(run.diagnostics[0].severity, Severity::Warning);
        assert_eq!(run.diagnostics[0].unit.as_deref(), Some("main"));

        let siblings: Vec<_> = fs::read_dir(d.output_root.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(siblings, vec![OsString::from("main")]);
    }

    #[test]
    fn failure_keeps_previous_output() {
        let (_dir, compiler, mut d) = setup(&[("a.proto", "message A {}")]);
        let inv = invoker(compiler, InvokerSettings::default());
        inv.invoke(&d).unwrap();
        let before = fs::read_to_string(d.output_root.join("java/a.gen")).unwrap();

        let bad_root = d.compiled_files[0].root.clone();
        fs::write(bad_root.join("bad.proto"), "SYNTAX_ERROR").unwrap();
        d.compiled_files.push(CompiledFile {
            root: bad_root,
            relative: PathBuf::from("bad.proto"),
        });
        let err = inv.invoke(&d).unwrap_err();
        match &err {
            InvokeError::Failed {
                exit_code,
                stderr,
                diagnostics,
                ..
            } => {
                assert_eq!(*exit_code, 1);
                assert!(stderr.contains("Expected top-level statement."));
                assert_eq!(diagnostics[0].severity, Severity::Error);
                assert_eq!(diagnostics[0].location.as_ref().unwrap().line, Some(1));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(fs::read_to_string(d.output_root.join("java/a.gen")).unwrap(), before);
        assert!(!d.output_root.join("java/bad.gen").exists());
    }

    #[test]
    fn batches_publish_together() {
        let (_dir, compiler, d) = setup(&[("a.proto", "A"), ("b.proto", "B")]);
        let mut first = d.clone();
        first.compiled_files.truncate(1);
        first.batches = 2;
        let mut second = d.clone();
        second.compiled_files.remove(0);
        second.batch = 1;
        second.batches = 2;

        let runs = invoker(compiler, InvokerSettings::default())
            .invoke_all(&[first, second])
            .unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].generated_files, vec![d.output_root.join("java/a.gen")]);
        assert_eq!(runs[1].generated_files, vec![d.output_root.join("java/b.gen")]);
        assert!(d.output_root.join("java/b.gen").is_file());
    }

    #[test]
    fn timeout_kills_compiler() {
        let (_dir, compiler, d) = setup(&[("slow.proto", "SLEEP")]);
        let settings = InvokerSettings {
            timeout: Some(Duration::from_millis(200)),
            ..InvokerSettings::default()
        };
        let started = Instant::now();
        let err = invoker(compiler, settings).invoke(&d).unwrap_err();
        assert!(matches!(err, InvokeError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!d.output_root.exists());
    }

    #[test]
    fn cancellation_kills_compiler() {
        let (_dir, compiler, d) = setup(&[("slow.proto", "SLEEP")]);
        let settings = InvokerSettings::default();
        let token = settings.cancel.clone();
        let inv = invoker(compiler, settings);
        let err = thread::scope(|s| {
            let handle = s.spawn(|| inv.invoke(&d));
            thread::sleep(Duration::from_millis(100));
            token.cancel();
            handle.join().unwrap()
        })
        .unwrap_err();
        assert!(matches!(err, InvokeError::Cancelled { .. }));
        assert!(!d.output_root.exists());
    }

    #[test]
    fn missing_compiler_is_spawn_error() {
        let (_dir, _compiler, d) = setup(&[("a.proto", "A")]);
        let compiler = Compiler::with_version("/nonexistent/protoc", "x");
        let err = invoker(compiler, InvokerSettings::default()).invoke(&d).unwrap_err();
        assert!(matches!(err, InvokeError::Spawn { .. }));
    }
}
