//! Filesystem helpers shared by the parsers.

use std::path::Path;

use walkdir::WalkDir;

use crate::ConfigError;

/// Names of the subdirectories of `path`, sorted.
///
/// A missing root yields an empty list.
pub fn list_directories(path: &Path) -> Result<Vec<String>, ConfigError> {
    if !path.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(path).map_err(|e| ConfigError::io(path, e))? {
        let entry = entry.map_err(|e| ConfigError::io(path, e))?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Names of every entry in `path`, sorted. Fails if `path` is not a directory.
pub fn list_contents(path: &Path) -> Result<Vec<String>, ConfigError> {
    let mut names = std::fs::read_dir(path)
        .map_err(|e| ConfigError::io(path, e))?
        .map(|entry| {
            entry
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .map_err(|e| ConfigError::io(path, e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    names.sort();
    Ok(names)
}

/// Number of files named `name` anywhere below `root`.
///
/// A missing root counts as zero files.
pub fn count_files_with_name(root: &Path, name: &str) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == name)
        .count()
}

/// Read a file to a string, attaching the path to any error.
pub fn read_text(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_directories_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("zeta")).unwrap();
        std::fs::create_dir(dir.path().join("alpha")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        assert_eq!(list_directories(dir.path()).unwrap(), vec!["alpha", "zeta"]);
        assert_eq!(
            list_contents(dir.path()).unwrap(),
            vec!["alpha", "notes.txt", "zeta"]
        );
    }

    #[test]
    fn missing_root_is_empty_for_directories_but_an_error_for_contents() {
        let missing = Path::new("/nonexistent/instcheck/root");
        assert!(list_directories(missing).unwrap().is_empty());
        assert!(matches!(list_contents(missing), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn counts_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("globals.txt"), "").unwrap();
        std::fs::write(dir.path().join("a/b/globals.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("a/globals.txt")).unwrap();
        assert_eq!(count_files_with_name(dir.path(), "globals.txt"), 2);
        assert_eq!(count_files_with_name(Path::new("/nonexistent/x"), "globals.txt"), 0);
    }
}
