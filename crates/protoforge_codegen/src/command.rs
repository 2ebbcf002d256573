//! Compiler command lines.
//!
//! Argument order is fixed so identical descriptors always produce identical
//! command lines:
//!
//! ```text
//! protoc -I<root>...                                  include roots, in order
//!        --plugin=protoc-gen-<name>=<path>            external plugins only
//!        --<name>_out=[<opt>,<opt>:]<dir>             one per output
//!        --descriptor_set_out=<path> [--include_imports] [--include_source_info]
//!        <options>...                                 verbatim
//!        <file>...                                    compiled files, sorted
//! ```

use std::ffi::{OsStr, OsString};
use std::path::Path;

use protoforge_config::PluginKind;

use crate::compiler::Compiler;
use crate::descriptor::GenerationTaskDescriptor;

/// Builds the full argument vector (program first) for `descriptor`, with
/// every output redirected into `staging`.
pub fn build_command(
    compiler: &Compiler,
    descriptor: &GenerationTaskDescriptor,
    staging: &Path,
) -> Vec<OsString> {
    let mut argv = Vec::with_capacity(
        1 + descriptor.include_roots.len()
            + 2 * descriptor.outputs.len()
            + 3
            + descriptor.options.len()
            + descriptor.compiled_files.len(),
    );
    argv.push(compiler.path.clone().into_os_string());

    for root in &descriptor.include_roots {
        argv.push(concat("-I", root.path.as_os_str()));
    }

    for output in &descriptor.outputs {
        let plugin = &output.plugin;
        if let PluginKind::External { path } = &plugin.kind {
            argv.push(concat(
                &format!("--plugin=protoc-gen-{}=", plugin.name),
                path.as_os_str(),
            ));
        }
        let mut flag = format!("--{}_out=", plugin.name);
        if !plugin.options.is_empty() {
            flag.push_str(&plugin.options.join(","));
            flag.push(':');
        }
        let dir = descriptor.staged(&output.dir, staging);
        argv.push(concat(&flag, dir.as_os_str()));
    }

    if let Some(set) = &descriptor.descriptor_set {
        let path = descriptor.staged(&set.path, staging);
        argv.push(concat("--descriptor_set_out=", path.as_os_str()));
        if set.include_imports {
            argv.push("--include_imports".into());
        }
        if set.include_source_info {
            argv.push("--include_source_info".into());
        }
    }

    argv.extend(descriptor.options.iter().map(OsString::from));
    argv.extend(
        descriptor
            .compiled_files
            .iter()
            .map(|f| f.path().into_os_string()),
    );
    argv
}

/// Length of a command line as the OS sees it (arguments plus separators).
pub fn command_len(argv: &[OsString]) -> usize {
    argv.iter().map(|a| a.len() + 1).sum()
}

fn concat(prefix: &str, value: &OsStr) -> OsString {
    let mut s = OsString::with_capacity(prefix.len() + value.len());
    s.push(prefix);
    s.push(value);
    s
}
