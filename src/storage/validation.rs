//! Path validation
//!
//! Resolves client supplied names against the working directory into
//! virtual full paths and maps those onto the host file system.

use std::path::{Path, PathBuf};

/// Longest virtual path accepted.
pub const MAX_PATH_LENGTH: usize = 255;

/// Resolves `name` against `working_directory`.
///
/// Surrounding double quotes are removed, `.` and `..` components are
/// resolved and the result never ends in `/` (except the root itself).
/// Returns `None` when `..` would climb above `/` or the path gets too long.
pub fn make_full_path(name: &str, working_directory: &str) -> Option<String> {
    let name = strip_quotes(name);
    let joined = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("{}/{}", working_directory, name)
    };

    let mut components: Vec<&str> = Vec::new();
    for component in joined.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop()?;
            }
            component => components.push(component),
        }
    }

    let full_path = format!("/{}", components.join("/"));
    if full_path.len() > MAX_PATH_LENGTH {
        return None;
    }
    Some(full_path)
}

fn strip_quotes(name: &str) -> &str {
    if name.len() > 1 && name.starts_with('"') && name.ends_with('"') {
        &name[1..name.len() - 1]
    } else {
        name
    }
}

/// Maps a virtual full path onto the host directory tree under `root`.
pub fn virtual_to_real_path(root: &Path, full_path: &str) -> PathBuf {
    let relative = full_path.trim_start_matches('/');
    if relative.is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

/// Last component of a virtual path, `/` for the root.
pub fn file_name(full_path: &str) -> &str {
    match full_path.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name,
        _ => full_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_full_path_relative_and_absolute() {
        assert_eq!(make_full_path("docs", "/home/joe").as_deref(), Some("/home/joe/docs"));
        assert_eq!(make_full_path("/etc", "/home/joe").as_deref(), Some("/etc"));
        assert_eq!(make_full_path("", "/home/joe").as_deref(), Some("/home/joe"));
        assert_eq!(make_full_path("docs/", "/").as_deref(), Some("/docs"));
        assert_eq!(
            make_full_path("\"my file.txt\"", "/home").as_deref(),
            Some("/home/my file.txt")
        );
    }

    #[test]
    fn test_make_full_path_resolves_dots() {
        assert_eq!(make_full_path("./a/../b", "/home").as_deref(), Some("/home/b"));
        assert_eq!(make_full_path("..", "/home/joe").as_deref(), Some("/home"));
        assert_eq!(make_full_path("..", "/home").as_deref(), Some("/"));
        assert_eq!(make_full_path("../..", "/home"), None);
        assert_eq!(make_full_path("/..", "/"), None);
    }

    #[test]
    fn test_make_full_path_rejects_long_paths() {
        let long = "x".repeat(MAX_PATH_LENGTH);
        assert_eq!(make_full_path(&long, "/"), None);
    }

    #[test]
    fn test_virtual_to_real_path() {
        let root = Path::new("/srv/ftp");
        assert_eq!(virtual_to_real_path(root, "/"), PathBuf::from("/srv/ftp"));
        assert_eq!(
            virtual_to_real_path(root, "/home/joe"),
            PathBuf::from("/srv/ftp/home/joe")
        );
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/home/joe/a.txt"), "a.txt");
        assert_eq!(file_name("/"), "/");
    }
}
