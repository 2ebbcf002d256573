//! Error types for archive extraction.

use std::path::PathBuf;

/// Errors raised while extracting one archive.
///
/// Errors are `Clone` so a single failed extraction can be reported to every
/// caller waiting on the same archive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// The archive file could not be read.
    #[error("cannot read archive {archive}: {reason}")]
    Unreadable {
        /// The archive path.
        archive: PathBuf,
        /// The underlying I/O failure.
        reason: String,
    },

    /// The archive's file name does not match a supported container format.
    #[error("unsupported archive format: {archive}")]
    UnsupportedFormat {
        /// The archive path.
        archive: PathBuf,
    },

    /// The archive could be read but its content is damaged.
    #[error("corrupt archive {archive}: {reason}")]
    Corrupt {
        /// The archive path.
        archive: PathBuf,
        /// What the decoder reported.
        reason: String,
    },

    /// A member would be written outside the extraction directory.
    #[error("archive {archive} contains unsafe entry '{entry}'")]
    UnsafeEntry {
        /// The archive path.
        archive: PathBuf,
        /// The offending member name.
        entry: String,
    },

    /// Writing the extracted tree failed.
    #[error("I/O error at {path}: {reason}")]
    Io {
        /// The path being written.
        path: PathBuf,
        /// The underlying I/O failure.
        reason: String,
    },
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        ExtractError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// The archive this error is about, if it names one.
    pub fn archive(&self) -> Option<&std::path::Path> {
        match self {
            ExtractError::Unreadable { archive, .. }
            | ExtractError::UnsupportedFormat { archive }
            | ExtractError::Corrupt { archive, .. }
            | ExtractError::UnsafeEntry { archive, .. } => Some(archive),
            ExtractError::Io { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_display_names_archive() {
        let err = ExtractError::Corrupt {
            archive: PathBuf::from("libs/protos.tar.gz"),
            reason: "invalid gzip header".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("libs/protos.tar.gz"));
        assert!(msg.contains("invalid gzip header"));
        assert_eq!(err.archive(), Some(std::path::Path::new("libs/protos.tar.gz")));
    }

    #[test]
    fn unsafe_entry_display() {
        let err = ExtractError::UnsafeEntry {
            archive: PathBuf::from("a.zip"),
            entry: "../evil.proto".to_string(),
        };
        assert_eq!(err.to_string(), "archive a.zip contains unsafe entry '../evil.proto'");
    }

    #[test]
    fn io_has_no_archive() {
        let err = ExtractError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.archive().is_none());
        assert!(err.to_string().contains("denied"));
    }
}
