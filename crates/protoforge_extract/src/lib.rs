//! Archive extraction for schema sources.
//!
//! Archives (tar, gzip-compressed tar, zip and jar) are unpacked into
//! content-addressed directories under a private extraction root. Each
//! distinct archive content is unpacked at most once, no matter how many
//! units or threads ask for it. Filesystem work goes through the
//! [`FileOps`] capability so the copy and rename strategies are
//! interchangeable.

#![warn(missing_docs)]

pub mod error;
pub mod extractor;
pub mod format;
pub mod ops;

pub use error::ExtractError;
pub use extractor::ArchiveExtractor;
pub use format::{ArchiveFormat, ArchiveRef};
pub use ops::{select_file_ops, sweep_scratch, CopyOps, FileOps, RenameOps};
