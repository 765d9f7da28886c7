mod walk;

pub use walk::{file_key, list_files, normalize_extension, ScanFilter};

use crate::progress::ProgressReporter;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::error;

/// A root that could not be enumerated; excluded from every aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErroredFolder {
    pub root: PathBuf,
    pub message: String,
}

/// Enumerate every root, collecting files from the readable ones and an
/// `ErroredFolder` for each root that failed.
pub fn collect_files(
    roots: &[PathBuf],
    filter: &ScanFilter,
    reporter: &dyn ProgressReporter,
) -> (Vec<PathBuf>, Vec<ErroredFolder>) {
    let mut files = Vec::new();
    let mut errored = Vec::new();

    for root in roots {
        match list_files(root, filter) {
            Ok(found) => files.extend(found),
            Err(err) => {
                error!("Folder {} excluded: {}", root.display(), err);
                reporter.on_folder_error(root, &err.to_string());
                errored.push(ErroredFolder {
                    root: root.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    (files, errored)
}

/// Display form of `path` used as a stable identifier in logs and reports.
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
