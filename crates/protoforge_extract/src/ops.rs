//! Filesystem strategies for unpacking archives and publishing output.
//!
//! Two interchangeable strategies implement [`FileOps`]:
//!
//! - [`RenameOps`] streams archive members straight from disk and publishes a
//!   staged directory with renames. It needs staging and destination on the
//!   same filesystem.
//! - [`CopyOps`] reads the whole archive into memory first and publishes by
//!   copying into a sibling of the destination before the final rename, so it
//!   works across filesystems.
//!
//! One strategy is picked at start-up with [`select_file_ops`] and handed to
//! the components that need it.

use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read, Seek};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use protoforge_config::FileOpsKind;

use crate::error::ExtractError;
use crate::format::ArchiveFormat;

/// Filesystem capability used by the extractor and the compiler invoker.
pub trait FileOps: Send + Sync + std::fmt::Debug {
    /// Unpacks the members of `archive` accepted by `accept` into `dest`,
    /// preserving their relative paths. Returns the number of files written.
    fn unpack(
        &self,
        archive: &Path,
        format: ArchiveFormat,
        dest: &Path,
        accept: &dyn Fn(&Path) -> bool,
    ) -> Result<usize, ExtractError>;

    /// Makes the staged directory visible at `dest`, replacing any previous
    /// content. Readers observe either the old or the new tree.
    fn publish(&self, staged: &Path, dest: &Path) -> io::Result<()>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Streaming unpack, rename-based publish.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenameOps;

/// Buffered unpack, copy-based publish.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyOps;

impl FileOps for RenameOps {
    fn unpack(
        &self,
        archive: &Path,
        format: ArchiveFormat,
        dest: &Path,
        accept: &dyn Fn(&Path) -> bool,
    ) -> Result<usize, ExtractError> {
        let file = File::open(archive).map_err(|e| ExtractError::Unreadable {
            archive: archive.to_path_buf(),
            reason: e.to_string(),
        })?;
        unpack_from(BufReader::new(file), archive, format, dest, accept)
    }

    fn publish(&self, staged: &Path, dest: &Path) -> io::Result<()> {
        swap_into_place(staged, dest)
    }

    fn name(&self) -> &'static str {
        "rename"
    }
}

impl FileOps for CopyOps {
    fn unpack(
        &self,
        archive: &Path,
        format: ArchiveFormat,
        dest: &Path,
        accept: &dyn Fn(&Path) -> bool,
    ) -> Result<usize, ExtractError> {
        let bytes = fs::read(archive).map_err(|e| ExtractError::Unreadable {
            archive: archive.to_path_buf(),
            reason: e.to_string(),
        })?;
        unpack_from(Cursor::new(bytes), archive, format, dest, accept)
    }

    fn publish(&self, staged: &Path, dest: &Path) -> io::Result<()> {
        let parent = parent_dir(dest)?;
        fs::create_dir_all(parent)?;
        let scratch = tempfile::Builder::new()
            .prefix(".publish-")
            .tempdir_in(parent)?;
        let copied = scratch.path().join("tree");
        copy_tree(staged, &copied)?;
        swap_into_place(&copied, dest)
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}

/// Picks the strategy for `kind`.
///
/// `Auto` compares the devices of `staging` and `output` once and uses
/// renames when they match.
pub fn select_file_ops(kind: FileOpsKind, staging: &Path, output: &Path) -> Arc<dyn FileOps> {
    let ops: Arc<dyn FileOps> = match kind {
        FileOpsKind::Rename => Arc::new(RenameOps),
        FileOpsKind::Copy => Arc::new(CopyOps),
        FileOpsKind::Auto => {
            if same_device(staging, output) {
                Arc::new(RenameOps)
            } else {
                Arc::new(CopyOps)
            }
        }
    };
    tracing::debug!("using {} file operations", ops.name());
    ops
}

#[cfg(unix)]
fn same_device(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (existing_ancestor(a), existing_ancestor(b)) {
        (Some(a), Some(b)) => match (fs::metadata(a), fs::metadata(b)) {
            (Ok(a), Ok(b)) => a.dev() == b.dev(),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_device(a: &Path, b: &Path) -> bool {
    existing_ancestor(a).is_some() && existing_ancestor(b).is_some()
}

fn existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| !p.as_os_str().is_empty() && p.exists())
}

fn parent_dir(path: &Path) -> io::Result<&Path> {
    path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        )
    })
}

/// Removes scratch directories a killed process left in `dir`: extraction
/// and publish staging (`.extract-*`, `.publish-*`), displaced trees
/// (`.old-*`) and unit staging (`.<unit>.staging-*`).
///
/// Returns how many were removed. A missing `dir` is not an error.
pub fn sweep_scratch(dir: &Path) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let scratch = name.starts_with(".extract-")
            || name.starts_with(".publish-")
            || name.starts_with(".old-")
            || (name.starts_with('.') && name.contains(".staging-"));
        if scratch && entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Renames `src` to `dest`, moving an existing `dest` aside first and
/// deleting it afterwards. On failure the old tree is restored.
fn swap_into_place(src: &Path, dest: &Path) -> io::Result<()> {
    let parent = parent_dir(dest)?;
    fs::create_dir_all(parent)?;

    if !dest.exists() {
        return fs::rename(src, dest);
    }

    let graveyard = tempfile::Builder::new().prefix(".old-").tempdir_in(parent)?;
    let old = graveyard.path().join("tree");
    fs::rename(dest, &old)?;
    if let Err(e) = fs::rename(src, dest) {
        let _ = fs::rename(&old, dest);
        return Err(e);
    }
    // graveyard drops here and takes the old tree with it
    Ok(())
}

fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn unpack_from<R: Read + Seek>(
    reader: R,
    archive: &Path,
    format: ArchiveFormat,
    dest: &Path,
    accept: &dyn Fn(&Path) -> bool,
) -> Result<usize, ExtractError> {
    match format {
        ArchiveFormat::Tar => unpack_tar(reader, archive, dest, accept),
        ArchiveFormat::TarGz => {
            unpack_tar(flate2::read::GzDecoder::new(reader), archive, dest, accept)
        }
        ArchiveFormat::Zip => unpack_zip(reader, archive, dest, accept),
    }
}

fn unpack_tar<R: Read>(
    reader: R,
    archive: &Path,
    dest: &Path,
    accept: &dyn Fn(&Path) -> bool,
) -> Result<usize, ExtractError> {
    let corrupt = |e: io::Error| ExtractError::Corrupt {
        archive: archive.to_path_buf(),
        reason: e.to_string(),
    };

    let mut tar = tar::Archive::new(reader);
    let mut written = 0;
    for entry in tar.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path().map_err(corrupt)?.into_owned();
        let Some(relative) = safe_relative(&name) else {
            return Err(ExtractError::UnsafeEntry {
                archive: archive.to_path_buf(),
                entry: name.display().to_string(),
            });
        };
        if !accept(&relative) {
            continue;
        }
        let target = dest.join(&relative);
        create_parent(&target)?;
        let mut out = File::create(&target).map_err(|e| ExtractError::io(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(corrupt)?;
        written += 1;
    }
    Ok(written)
}

fn unpack_zip<R: Read + Seek>(
    reader: R,
    archive: &Path,
    dest: &Path,
    accept: &dyn Fn(&Path) -> bool,
) -> Result<usize, ExtractError> {
    let corrupt = |reason: String| ExtractError::Corrupt {
        archive: archive.to_path_buf(),
        reason,
    };

    let mut zip = zip::ZipArchive::new(reader).map_err(|e| corrupt(e.to_string()))?;
    let mut written = 0;
    for i in 0..zip.len() {
        let mut member = zip.by_index(i).map_err(|e| corrupt(e.to_string()))?;
        if member.is_dir() {
            continue;
        }
        let Some(relative) = member.enclosed_name().as_deref().and_then(safe_relative) else {
            return Err(ExtractError::UnsafeEntry {
                archive: archive.to_path_buf(),
                entry: member.name().to_string(),
            });
        };
        if !accept(&relative) {
            continue;
        }
        let target = dest.join(&relative);
        create_parent(&target)?;
        let mut out = File::create(&target).map_err(|e| ExtractError::io(&target, e))?;
        io::copy(&mut member, &mut out).map_err(|e| corrupt(e.to_string()))?;
        written += 1;
    }
    Ok(written)
}

/// Returns the member path if it consists only of normal components.
fn safe_relative(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

fn create_parent(target: &Path) -> Result<(), ExtractError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| ExtractError::io(parent, e))?;
    }
    Ok(())
}
