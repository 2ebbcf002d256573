//! Parsing of the schema compiler's plain-text output.
//!
//! The compiler prints one problem per line in one of these shapes:
//!
//! ```text
//! foo.proto:12:5: Expected ";".
//! foo.proto:3:1: warning: Import bar.proto is unused.
//! foo.proto: File not found.
//! --grpc_out: protoc-gen-grpc: Plugin failed with status code 1.
//! [libprotobuf WARNING google/protobuf/compiler/parser.cc:648] No syntax specified.
//! ```
//!
//! Lines that match none of them are kept verbatim without a location.

use std::path::PathBuf;

use crate::diagnostic::{Diagnostic, Location};
use crate::severity::Severity;

/// Parses every non-empty line of compiler output into a diagnostic.
///
/// `default_severity` applies to lines without an explicit `warning:` or
/// `error:` marker; callers pass `Error` for failed invocations and `Warning`
/// for successful ones.
pub fn parse_compiler_output(output: &str, default_severity: Severity) -> Vec<Diagnostic> {
    output
        .lines()
        .filter_map(|line| parse_line(line, default_severity))
        .collect()
}

/// Parses one line of compiler output. Returns `None` for blank lines.
pub fn parse_line(line: &str, default_severity: Severity) -> Option<Diagnostic> {
    let line = line.trim_end();
    if line.trim().is_empty() {
        return None;
    }

    if line.starts_with("[libprotobuf WARNING") {
        return Some(Diagnostic::new(Severity::Warning, line));
    }
    if line.starts_with("[libprotobuf ERROR") || line.starts_with("[libprotobuf FATAL") {
        return Some(Diagnostic::new(Severity::Error, line));
    }

    let (severity, rest) = split_severity(line, default_severity);
    if rest.len() != line.len() {
        // Line began with a bare severity marker, so there is no location
        return Some(Diagnostic::new(severity, rest));
    }

    let Some((head, message)) = line.split_once(": ") else {
        return Some(Diagnostic::new(default_severity, line));
    };

    // Flag-scoped errors such as `--grpc_out: ...` have no file
    if head.starts_with("--") {
        return Some(Diagnostic::new(default_severity, line));
    }

    let Some(location) = parse_location(head) else {
        return Some(Diagnostic::new(default_severity, line));
    };

    let (severity, message) = split_severity(message, default_severity);
    Some(Diagnostic::new(severity, message).at(location))
}

/// Strips a leading `warning:` / `error:` marker.
fn split_severity(text: &str, default_severity: Severity) -> (Severity, &str) {
    if let Some(rest) = text.strip_prefix("warning:") {
        (Severity::Warning, rest.trim_start())
    } else if let Some(rest) = text.strip_prefix("error:") {
        (Severity::Error, rest.trim_start())
    } else {
        (default_severity, text)
    }
}

/// Parses `file`, `file:line` or `file:line:column`.
///
/// Splits from the right so drive-letter paths keep their colon.
fn parse_location(head: &str) -> Option<Location> {
    let mut parts = head.rsplitn(3, ':');
    let last = parts.next()?;
    let middle = parts.next();
    let first = parts.next();

    match (first, middle, last.parse::<u32>().ok()) {
        (Some(file), Some(line), Some(column)) if line.parse::<u32>().is_ok() => Some(Location {
            file: PathBuf::from(file),
            line: line.parse().ok(),
            column: Some(column),
        }),
        (_, Some(_), Some(line)) => {
            let file = head.rsplit_once(':').map(|(f, _)| f)?;
            Some(Location {
                file: PathBuf::from(file),
                line: Some(line),
                column: None,
            })
        }
        _ if looks_like_path(head) => Some(Location {
            file: PathBuf::from(head),
            line: None,
            column: None,
        }),
        _ => None,
    }
}

fn looks_like_path(s: &str) -> bool {
    !s.contains(' ') && (s.contains('/') || s.contains('\\') || s.contains('.'))
}
