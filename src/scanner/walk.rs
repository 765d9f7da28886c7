use crate::error::Error;
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use walkdir::WalkDir;

/// Lowercase an extension and strip any leading dots (`".MP4"` → `"mp4"`).
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Basename without its final extension; the pairing key for a file.
pub fn file_key(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// Which files a walk yields: accepted extensions, glob ignore patterns, depth.
#[derive(Debug, Clone)]
pub struct ScanFilter {
    extensions: Vec<String>,
    ignore_patterns: Vec<Pattern>,
    recursive: bool,
}

impl ScanFilter {
    pub fn new<S: AsRef<str>>(extensions: &[S], ignore_globs: &[String], recursive: bool) -> Self {
        let ignore_patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        Self {
            extensions: extensions
                .iter()
                .map(|e| normalize_extension(e.as_ref()))
                .collect(),
            ignore_patterns,
            recursive,
        }
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    /// Case-insensitive extension test.
    pub fn accepts_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| normalize_extension(&e.to_string_lossy()))
            .map(|e| self.extensions.iter().any(|accepted| *accepted == e))
            .unwrap_or(false)
    }

    /// Globs see the path relative to the walk root, so a root's own
    /// ancestors never cause its files to be ignored.
    fn is_ignored(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative))
    }
}

/// List files under `root` accepted by `filter`, sorted by path.
///
/// An unreadable root is a `Discovery` error. Unreadable subdirectories in a
/// recursive walk are logged and skipped.
pub fn list_files(root: &Path, filter: &ScanFilter) -> Result<Vec<PathBuf>, Error> {
    if !root.is_dir() {
        return Err(Error::discovery(root, "not a directory"));
    }

    let max_depth = if filter.recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !filter.is_ignored(root, entry.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.depth() == 0 {
                    return Err(Error::discovery(root, err));
                }
                let at = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                error!("Skipping unreadable entry {}: {}", at, err);
                continue;
            }
        };

        if entry.file_type().is_file() && filter.accepts_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    debug!("{} matching files under {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension(".MP4"), "mp4");
        assert_eq!(normalize_extension("json"), "json");
    }

    #[test]
    fn test_file_key_strips_only_last_extension() {
        assert_eq!(file_key(Path::new("/a/clip.final.mp4")).unwrap(), "clip.final");
        assert_eq!(file_key(Path::new("video1.json")).unwrap(), "video1");
    }

    #[test]
    fn test_list_files_filters_and_sorts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("a.JSON"), "{}").unwrap();
        fs::write(dir.path().join("c.txt"), "").unwrap();
        fs::write(dir.path().join("a_backup_20250101_000000.json"), "{}").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("d.json"), "{}").unwrap();

        let flat = ScanFilter::new(&["json"], &["*_backup_*".to_string()], false);
        let files = list_files(dir.path(), &flat).unwrap();
        assert_eq!(names(&files), vec!["a.JSON", "b.json"]);

        let deep = ScanFilter::new(&["json"], &["*_backup_*".to_string()], true);
        let files = list_files(dir.path(), &deep).unwrap();
        assert_eq!(names(&files), vec!["a.JSON", "b.json", "d.json"]);
    }

    #[test]
    fn test_list_files_missing_root_is_discovery_error() {
        let dir = tempdir().unwrap();
        let filter = ScanFilter::new(&["json"], &[], false);
        let result = list_files(&dir.path().join("gone"), &filter);
        assert!(matches!(result, Err(Error::Discovery { .. })));
    }

    #[test]
    fn test_ignore_globs_skip_root_ancestors() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("restore_backup_2024").join("upload_001");
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("a.json"), "{}").unwrap();
        fs::write(root.join("a_backup_20250101_000000.json"), "{}").unwrap();
        fs::write(root.join("nested").join("b_backup_x.json"), "{}").unwrap();
        fs::write(root.join("nested").join("b.json"), "{}").unwrap();

        let filter = ScanFilter::new(&["json"], &["*_backup_*".to_string()], true);
        let files = list_files(&root, &filter).unwrap();
        assert_eq!(names(&files), vec!["a.json", "b.json"]);
    }
}
