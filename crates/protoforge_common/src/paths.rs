//! Path helpers shared by discovery, resolution and output layout.

use std::path::{Component, Path, PathBuf};

/// Lexically normalizes a path, resolving it against `base` when relative.
///
/// Removes `.` components and folds `..` into the preceding component. Does
/// not touch the filesystem, so it works for paths that do not exist yet.
pub fn normalize_path(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `/..` stays at `/`
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Returns `true` if `path` has the given extension (without the dot).
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_joined_to_base() {
        let p = normalize_path(Path::new("/proj"), Path::new("src/main/proto"));
        assert_eq!(p, PathBuf::from("/proj/src/main/proto"));
    }

    #[test]
    fn absolute_ignores_base() {
        let p = normalize_path(Path::new("/proj"), Path::new("/other/protos"));
        assert_eq!(p, PathBuf::from("/other/protos"));
    }

    #[test]
    fn dots_are_folded() {
        let p = normalize_path(Path::new("/proj"), Path::new("./src/../src/./proto/"));
        assert_eq!(p, PathBuf::from("/proj/src/proto"));
    }

    #[test]
    fn same_dir_spelled_differently_normalizes_equal() {
        let a = normalize_path(Path::new("/proj"), Path::new("src/main/proto"));
        let b = normalize_path(Path::new("/proj/src"), Path::new("../src/main/./proto"));
        assert_eq!(a, b);
    }

    #[test]
    fn extension_match() {
        assert!(has_extension(Path::new("a/b/foo.proto"), "proto"));
        assert!(!has_extension(Path::new("a/b/foo.proto.bak"), "proto"));
        assert!(!has_extension(Path::new("a/b/proto"), "proto"));
    }
}
