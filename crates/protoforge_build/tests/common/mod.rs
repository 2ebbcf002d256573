//! Shared fixtures for the pipeline tests: a project laid out on disk and a
//! stand-in schema compiler.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use protoforge_build::{Build, BuildOptions, BuildReport};
use protoforge_config::load_config;

/// Behaves like the schema compiler as far as the pipeline can tell.
///
/// Answers `--version`, logs every invocation, resolves each
/// `import "x.proto";` against the `-I` roots (failing the way the real
/// compiler reports missing imports) and writes one `<name>.gen` copy of
/// each positional file into every `--*_out` directory. A descriptor set
/// is the concatenation of the compiled files.
const FAKE_COMPILER: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "libprotoc 99.0-fake"
  exit 0
fi
here=$(dirname "$0")
echo "$*" >> "$here/invocations.log"
includes=""
outs=""
files=""
desc=""
for arg in "$@"; do
  case "$arg" in
    -I*) includes="$includes ${arg#-I}" ;;
    --plugin=*) ;;
    --descriptor_set_out=*) desc="${arg#*=}" ;;
    --*_out=*) dir="${arg#*=}"; outs="$outs ${dir##*:}" ;;
    -*) ;;
    *) files="$files $arg" ;;
  esac
done
status=0
for f in $files; do
  for imp in $(sed -n 's/^import "\(.*\)";.*/\1/p' "$f"); do
    found=0
    for inc in $includes; do
      if [ -f "$inc/$imp" ]; then found=1; fi
    done
    if [ $found -eq 0 ]; then
      echo "$imp: File not found." >&2
      echo "$f:1:1: Import \"$imp\" was not found or had errors." >&2
      status=1
    fi
  done
done
if [ $status -ne 0 ]; then exit $status; fi
for o in $outs; do
  for f in $files; do
    cp "$f" "$o/$(basename "$f" .proto).gen"
  done
done
if [ -n "$desc" ]; then cat $files > "$desc"; fi
exit 0
"#;

/// A throwaway project directory.
pub struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    /// Creates a project with the fake compiler installed under `tools/`.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let project = Self { dir };
        let script = project.path("tools/protoc");
        project.file("tools/protoc", FAKE_COMPILER);
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        project
    }

    /// Replaces the compiler with a script that runs `prelude` first and
    /// then hands over to the stand-in compiler.
    pub fn compiler_prelude(&self, prelude: &str) -> &Self {
        self.file("tools/protoc-real", FAKE_COMPILER);
        self.file(
            "tools/protoc",
            &format!("#!/bin/sh\nhere=$(dirname \"$0\")\n{prelude}\nexec \"$here/protoc-real\" \"$@\"\n"),
        );
        for tool in ["tools/protoc", "tools/protoc-real"] {
            fs::set_permissions(self.path(tool), fs::Permissions::from_mode(0o755)).unwrap();
        }
        self
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// An absolute path inside the project.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Writes a file, creating parent directories.
    pub fn file(&self, rel: &str, body: &str) -> &Self {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
        self
    }

    /// Writes a schema file declaring one message.
    pub fn proto(&self, rel: &str, message: &str) -> &Self {
        self.file(rel, &format!("syntax = \"proto3\";\nmessage {message} {{}}\n"))
    }

    /// Writes a schema file that imports another.
    pub fn proto_importing(&self, rel: &str, message: &str, import: &str) -> &Self {
        self.file(
            rel,
            &format!("syntax = \"proto3\";\nimport \"{import}\";\nmessage {message} {{}}\n"),
        )
    }

    /// Writes `protoforge.toml`: the given body plus the fake compiler.
    pub fn config(&self, body: &str) -> &Self {
        self.config_with(body, "")
    }

    /// Like [`config`](Self::config) with extra `[compiler]` settings.
    pub fn config_with(&self, body: &str, compiler: &str) -> &Self {
        self.file(
            "protoforge.toml",
            &format!("{body}\n[compiler]\npath = \"tools/protoc\"\n{compiler}\n"),
        )
    }

    /// Writes a gzip-compressed tarball.
    pub fn tar_gz(&self, rel: &str, members: &[(&str, &str)]) -> &Self {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = fs::File::create(&path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, body) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, body.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
        self
    }

    /// Runs a full build with the project's configuration.
    pub fn build(&self, options: BuildOptions) -> BuildReport {
        let config = load_config(self.root()).unwrap();
        Build::new(config, self.root(), options).unwrap().run()
    }

    /// Runs a build with default options.
    pub fn build_default(&self) -> BuildReport {
        self.build(BuildOptions::default())
    }

    /// Command lines the fake compiler was run with, excluding `--version`.
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.path("tools/invocations.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// The generated output root of `unit`.
    pub fn output(&self, unit: &str) -> PathBuf {
        self.path(&format!("build/generated/source/proto/{unit}"))
    }

    /// Sorted file names in a generated directory.
    pub fn generated(&self, unit: &str, subdir: &str) -> Vec<String> {
        let dir = self.output(unit).join(subdir);
        let mut names: Vec<String> = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}
