//! Bulk find/replace of one field across many documents.
//!
//! Ordering per document: read raw bytes → match → write backup from those
//! same bytes → mutate → atomic write. A document is never rewritten unless
//! its backup (when enabled) is already on disk.

use crate::document::{canonical_string, Document, DocumentSink, FieldPath};
use crate::error::Error;
use crate::progress::{Pass, ProgressReporter};
use crate::scanner::{self, file_label, ErroredFolder, ScanFilter};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Operator-supplied correction: every document whose `field` canonically
/// equals one of `find_values` gets `replace_value`.
#[derive(Debug, Clone)]
pub struct RemediationRequest {
    field: FieldPath,
    find_values: BTreeSet<String>,
    replace_value: String,
    backup: bool,
    dry_run: bool,
}

impl RemediationRequest {
    pub fn new<I, S>(field: FieldPath, find_values: I, replace_value: &str) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let find_values: BTreeSet<String> = find_values.into_iter().map(Into::into).collect();
        if find_values.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one find value is required".to_string(),
            ));
        }
        if find_values.contains(replace_value) {
            return Err(Error::InvalidRequest(format!(
                "replace value '{}' is also a find value",
                replace_value
            )));
        }
        Ok(Self {
            field,
            find_values,
            replace_value: replace_value.to_string(),
            backup: true,
            dry_run: false,
        })
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn matches(&self, value: &Value) -> Option<String> {
        canonical_string(value).filter(|s| self.find_values.contains(s))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RemediationAction {
    pub file_path: PathBuf,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    pub backup_path: Option<PathBuf>,
    pub applied: bool,
    pub dry_run: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// `scanned == staged + skipped + unreadable`; outside dry-run
/// `staged == applied + failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemediationCounts {
    pub scanned: usize,
    pub staged: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub unreadable: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadableDocument {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemediationOutcome {
    pub field: String,
    pub find_values: Vec<String>,
    pub replace_value: String,
    pub backup: bool,
    pub dry_run: bool,
    pub run_stamp: String,
    pub counts: RemediationCounts,
    pub errored_folders: Vec<ErroredFolder>,
    pub unreadable: Vec<UnreadableDocument>,
    pub actions: Vec<RemediationAction>,
}

/// Result of looking at one document.
#[derive(Debug)]
pub enum DocumentOutcome {
    Skipped,
    Unreadable(Error),
    Staged(RemediationAction),
}

/// `{stem}_backup_{stamp}.{ext}` beside the document, with `_{n}` appended
/// when that name is taken.
pub fn backup_path_for(path: &Path, stamp: &str, attempt: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let name = match attempt {
        0 => format!("{}_backup_{}{}", stem, stamp, ext),
        n => format!("{}_backup_{}_{}{}", stem, stamp, n, ext),
    };
    path.with_file_name(name)
}

/// Write `original` to a fresh backup file. Never overwrites an existing file.
fn write_backup(path: &Path, original: &[u8], stamp: &str) -> Result<PathBuf, Error> {
    for attempt in 0..1000 {
        let candidate = backup_path_for(path, stamp, attempt);
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        };
        if let Err(err) = file.write_all(original).and_then(|_| file.sync_all()) {
            // a partial backup is worse than none
            let _ = fs::remove_file(&candidate);
            return Err(err.into());
        }
        return Ok(candidate);
    }
    Err(Error::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free backup name for {}", path.display()),
    )))
}

/// Keep a numeric field numeric when the replacement is itself a number.
fn replacement_value(old: &Value, replace: &str) -> Value {
    if old.is_number() {
        if let Ok(number @ Value::Number(_)) = serde_json::from_str::<Value>(replace) {
            return number;
        }
    }
    Value::String(replace.to_string())
}

/// Inspect and, unless dry-running, correct one document through `sink`.
pub fn remediate_document(
    path: &Path,
    request: &RemediationRequest,
    stamp: &str,
    sink: &dyn DocumentSink,
) -> DocumentOutcome {
    let original = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => return DocumentOutcome::Unreadable(err.into()),
    };
    let mut document = match Document::from_bytes(path, &original) {
        Ok(document) => document,
        Err(err) => return DocumentOutcome::Unreadable(err),
    };

    let (old_value, new_value) = match document.get(&request.field) {
        Some(current) => match request.matches(current) {
            Some(old) => (old, replacement_value(current, &request.replace_value)),
            None => return DocumentOutcome::Skipped,
        },
        None => return DocumentOutcome::Skipped,
    };

    let mut action = RemediationAction {
        file_path: path.to_path_buf(),
        field: request.field.to_string(),
        old_value,
        new_value: request.replace_value.clone(),
        backup_path: None,
        applied: false,
        dry_run: request.dry_run,
        error: None,
        timestamp: Utc::now(),
    };

    if request.dry_run {
        debug!(
            "[dry-run] {}: {} -> {}",
            path.display(),
            action.old_value,
            action.new_value
        );
        return DocumentOutcome::Staged(action);
    }

    if request.backup {
        match write_backup(path, &original, stamp) {
            Ok(backup) => action.backup_path = Some(backup),
            Err(err) => {
                warn!("Backup failed for {}, left untouched: {}", file_label(path), err);
                action.error = Some(format!("backup failed: {}", err));
                return DocumentOutcome::Staged(action);
            }
        }
    }

    let result = document
        .set(&request.field, new_value)
        .and_then(|_| sink.persist(&document, path));
    action.timestamp = Utc::now();
    match result {
        Ok(()) => {
            action.applied = true;
            debug!(
                "{}: {} -> {}",
                path.display(),
                action.old_value,
                action.new_value
            );
        }
        Err(err) => {
            warn!("Write failed for {}: {}", file_label(path), err);
            action.error = Some(format!("write failed: {}", err));
        }
    }

    DocumentOutcome::Staged(action)
}

/// Run `request` over every document under `roots`, one file at a time.
/// `stamp` names this run's backups.
pub fn remediate_folders(
    roots: &[PathBuf],
    request: &RemediationRequest,
    filter: &ScanFilter,
    stamp: &str,
    sink: &dyn DocumentSink,
    reporter: &dyn ProgressReporter,
) -> RemediationOutcome {
    let started = Instant::now();
    let (files, errored_folders) = scanner::collect_files(roots, filter, reporter);
    reporter.on_pass_start(Pass::Remediate, files.len());
    info!(
        "{}Replacing [{}] with '{}' in field '{}' across {} document(s)",
        if request.dry_run { "[DRY-RUN] " } else { "" },
        request
            .find_values
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
        request.replace_value,
        request.field,
        files.len()
    );

    let mut counts = RemediationCounts::default();
    let mut unreadable = Vec::new();
    let mut actions = Vec::new();

    for (idx, path) in files.iter().enumerate() {
        counts.scanned += 1;
        match remediate_document(path, request, stamp, sink) {
            DocumentOutcome::Skipped => counts.skipped += 1,
            DocumentOutcome::Unreadable(err) => {
                warn!("Skipping unreadable document: {}", err);
                counts.unreadable += 1;
                unreadable.push(UnreadableDocument {
                    path: path.clone(),
                    message: err.to_string(),
                });
            }
            DocumentOutcome::Staged(action) => {
                counts.staged += 1;
                if action.applied {
                    counts.applied += 1;
                } else if action.error.is_some() {
                    counts.failed += 1;
                }
                actions.push(action);
            }
        }
        reporter.on_item(idx + 1, files.len(), path);
    }

    info!(
        "Remediation finished: {} scanned, {} staged, {} applied, {} skipped, {} failed, {} unreadable",
        counts.scanned,
        counts.staged,
        counts.applied,
        counts.skipped,
        counts.failed,
        counts.unreadable
    );
    reporter.on_pass_complete(Pass::Remediate, files.len(), started.elapsed().as_secs_f64());

    RemediationOutcome {
        field: request.field.to_string(),
        find_values: request.find_values.iter().cloned().collect(),
        replace_value: request.replace_value.clone(),
        backup: request.backup,
        dry_run: request.dry_run,
        run_stamp: stamp.to_string(),
        counts,
        errored_folders,
        unreadable,
        actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::AtomicSink;
    use serde_json::json;
    use tempfile::tempdir;

    fn request(find: &[&str], replace: &str) -> RemediationRequest {
        RemediationRequest::new(
            FieldPath::parse("program_broadcasted_at").unwrap(),
            find.iter().copied(),
            replace,
        )
        .unwrap()
    }

    #[test]
    fn test_request_rejects_replace_in_find_set() {
        let field = FieldPath::parse("date").unwrap();
        assert!(RemediationRequest::new(field.clone(), ["a", "b"], "b").is_err());
        assert!(RemediationRequest::new(field, Vec::<String>::new(), "b").is_err());
    }

    #[test]
    fn test_backup_path_for() {
        let p = Path::new("/d/clip.json");
        assert_eq!(
            backup_path_for(p, "20250106_143022", 0),
            PathBuf::from("/d/clip_backup_20250106_143022.json")
        );
        assert_eq!(
            backup_path_for(p, "20250106_143022", 2),
            PathBuf::from("/d/clip_backup_20250106_143022_2.json")
        );
    }

    #[test]
    fn test_replacement_keeps_numeric_type() {
        assert_eq!(replacement_value(&json!(20169715), "20160715"), json!(20160715));
        assert_eq!(
            replacement_value(&json!("20169715"), "20160715"),
            json!("20160715")
        );
        assert_eq!(
            replacement_value(&json!(20169715), "2016-07-15"),
            json!("2016-07-15")
        );
    }

    #[test]
    fn test_backup_never_overwrites() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("a.json");
        fs::write(&doc, "{}").unwrap();
        let taken = backup_path_for(&doc, "S", 0);
        fs::write(&taken, "keep me").unwrap();

        let backup = write_backup(&doc, b"{}", "S").unwrap();
        assert_eq!(backup, backup_path_for(&doc, "S", 1));
        assert_eq!(fs::read_to_string(&taken).unwrap(), "keep me");
    }

    #[test]
    fn test_remediate_document_applies_with_backup() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("clip.json");
        let original = r#"{"title": "news", "program_broadcasted_at": "20169715"}"#;
        fs::write(&doc, original).unwrap();

        let req = request(&["20169715"], "20160715");
        let action = match remediate_document(&doc, &req, "S", &AtomicSink) {
            DocumentOutcome::Staged(action) => action,
            other => panic!("expected staged action, got {:?}", other),
        };
        assert!(action.applied);
        assert_eq!(action.old_value, "20169715");
        let backup = action.backup_path.unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), original);

        let fixed = Document::read(&doc).unwrap();
        assert_eq!(
            fixed.get(&FieldPath::parse("program_broadcasted_at").unwrap()),
            Some(&json!("20160715"))
        );
    }

    #[test]
    fn test_remediate_document_skips_non_matching_and_missing() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("ok.json");
        fs::write(&doc, r#"{"program_broadcasted_at": "20160715"}"#).unwrap();
        let other = dir.path().join("none.json");
        fs::write(&other, r#"{"title": "x"}"#).unwrap();

        let req = request(&["20169715"], "20160715");
        assert!(matches!(remediate_document(&doc, &req, "S", &AtomicSink), DocumentOutcome::Skipped));
        assert!(matches!(remediate_document(&other, &req, "S", &AtomicSink), DocumentOutcome::Skipped));
    }
}
