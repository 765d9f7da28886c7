use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use media_integrity::document::canonical_string;
use media_integrity::remediate::RemediationRequest;
use media_integrity::{
    AppConfig, AuditEngine, AuditRun, Document, DocumentSink, Error, FieldPath, Report,
    SilentReporter,
};

const FIELD: &str = "program_broadcasted_at";

fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    for entry in fs::read_dir(dir).unwrap().flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(snapshot(&path));
        } else {
            files.insert(path.clone(), fs::read(&path).unwrap());
        }
    }
    files
}

/// Layout:
///   meta/
///     bad_1.json   (field = "0")
///     bad_2.json   (field = "00000000")
///     good.json    (field = "20240101")
///     nested.json  (field absent)
fn create_batch(root: &Path) -> PathBuf {
    let folder = root.join("meta");
    fs::create_dir_all(&folder).unwrap();
    fs::write(
        folder.join("bad_1.json"),
        format!(r#"{{"title": "Évening news", "{}": "0", "duration": 30}}"#, FIELD),
    )
    .unwrap();
    fs::write(
        folder.join("bad_2.json"),
        format!(r#"{{"{}": "00000000"}}"#, FIELD),
    )
    .unwrap();
    fs::write(
        folder.join("good.json"),
        format!(r#"{{"{}": "20240101"}}"#, FIELD),
    )
    .unwrap();
    fs::write(folder.join("nested.json"), r#"{"program": {"id": 7}}"#).unwrap();
    folder
}

fn engine(output_dir: &Path, stamp: &str) -> AuditEngine {
    let config = AppConfig {
        output_dir: output_dir.to_string_lossy().into_owned(),
        ..AppConfig::default()
    };
    let mut run = AuditRun::start();
    run.stamp = stamp.to_string();
    AuditEngine::new(config).with_run(run)
}

fn request() -> RemediationRequest {
    RemediationRequest::new(
        FieldPath::parse(FIELD).unwrap(),
        ["0", "00000000"],
        "20240101",
    )
    .unwrap()
}

#[test]
fn test_dry_run_changes_nothing() {
    let tmp = tempdir().unwrap();
    let folder = create_batch(tmp.path());
    let before = snapshot(&folder);

    let out = tempdir().unwrap();
    let outcome = engine(out.path(), "20250101_000000").remediate(
        &[folder.clone()],
        &request().with_dry_run(true),
        &SilentReporter,
    );

    assert_eq!(snapshot(&folder), before);
    assert_eq!(outcome.counts.scanned, 4);
    assert_eq!(outcome.counts.staged, 2);
    assert_eq!(outcome.counts.applied, 0);
    assert_eq!(outcome.actions.len(), 2);
    assert!(outcome.actions.iter().all(|a| !a.applied && a.dry_run));
    assert!(outcome.actions.iter().all(|a| a.backup_path.is_none()));
}

#[test]
fn test_apply_writes_backup_holding_old_value() {
    let tmp = tempdir().unwrap();
    let folder = create_batch(tmp.path());
    let field = FieldPath::parse(FIELD).unwrap();

    let out = tempdir().unwrap();
    let outcome = engine(out.path(), "20250101_000000").remediate(
        &[folder.clone()],
        &request(),
        &SilentReporter,
    );

    assert_eq!(outcome.counts.applied, 2);
    assert_eq!(outcome.counts.skipped, 2);
    assert_eq!(outcome.counts.failed, 0);
    assert_eq!(
        outcome.counts.scanned,
        outcome.counts.staged + outcome.counts.skipped + outcome.counts.unreadable
    );

    for action in &outcome.actions {
        assert!(action.applied);
        let backup = action.backup_path.as_ref().unwrap();
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("_backup_20250101_000000"));
        let saved = Document::read(backup).unwrap();
        assert_eq!(
            saved.get(&field).and_then(canonical_string).as_deref(),
            Some(action.old_value.as_str())
        );

        let fixed = Document::read(&action.file_path).unwrap();
        assert_eq!(
            fixed.get(&field).and_then(canonical_string).as_deref(),
            Some("20240101")
        );
    }

    // untouched keys and their order survive the rewrite
    let text = fs::read_to_string(folder.join("bad_1.json")).unwrap();
    let title = text.find("\"title\"").unwrap();
    let aired = text.find(FIELD).unwrap();
    let duration = text.find("\"duration\"").unwrap();
    assert!(title < aired && aired < duration);
    assert!(text.contains("Évening news"));
}

#[test]
fn test_rerun_is_idempotent() {
    let tmp = tempdir().unwrap();
    let folder = create_batch(tmp.path());
    let out = tempdir().unwrap();

    let first = engine(out.path(), "20250101_000000").remediate(
        &[folder.clone()],
        &request(),
        &SilentReporter,
    );
    assert_eq!(first.counts.applied, 2);
    let after_first = snapshot(&folder);

    let second = engine(out.path(), "20250101_000001").remediate(
        &[folder.clone()],
        &request(),
        &SilentReporter,
    );
    assert_eq!(second.counts.applied, 0);
    assert!(second.actions.is_empty());
    // backups from the first run are not scanned as documents
    assert_eq!(second.counts.scanned, 4);
    assert_eq!(snapshot(&folder), after_first);
}

#[test]
fn test_without_backup_no_extra_files() {
    let tmp = tempdir().unwrap();
    let folder = create_batch(tmp.path());
    let count_before = snapshot(&folder).len();

    let out = tempdir().unwrap();
    let outcome = engine(out.path(), "20250101_000000").remediate(
        &[folder.clone()],
        &request().with_backup(false),
        &SilentReporter,
    );

    assert_eq!(outcome.counts.applied, 2);
    assert!(outcome.actions.iter().all(|a| a.backup_path.is_none()));
    assert_eq!(snapshot(&folder).len(), count_before);
}

#[test]
fn test_malformed_document_is_isolated() {
    let tmp = tempdir().unwrap();
    let folder = create_batch(tmp.path());
    fs::write(folder.join("broken.json"), "{\"program_broadcasted_at\": ").unwrap();

    let out = tempdir().unwrap();
    let outcome = engine(out.path(), "20250101_000000").remediate(
        &[folder.clone()],
        &request(),
        &SilentReporter,
    );

    assert_eq!(outcome.counts.scanned, 5);
    assert_eq!(outcome.counts.unreadable, 1);
    assert_eq!(outcome.counts.applied, 2);
    assert_eq!(outcome.unreadable[0].path, folder.join("broken.json"));
    assert_eq!(
        fs::read_to_string(folder.join("broken.json")).unwrap(),
        "{\"program_broadcasted_at\": "
    );
}

#[test]
fn test_numeric_values_stay_numeric() {
    let tmp = tempdir().unwrap();
    let folder = tmp.path().join("meta");
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join("n.json"), r#"{"year": 0}"#).unwrap();

    let out = tempdir().unwrap();
    let request = RemediationRequest::new(FieldPath::parse("year").unwrap(), ["0"], "1999").unwrap();
    let outcome = engine(out.path(), "20250101_000000").remediate(&[folder.clone()], &request, &SilentReporter);

    assert_eq!(outcome.counts.applied, 1);
    let doc = Document::read(&folder.join("n.json")).unwrap();
    assert_eq!(doc.get(&FieldPath::parse("year").unwrap()), Some(&serde_json::json!(1999)));
}

#[test]
fn test_replace_value_among_find_values_is_rejected() {
    let result = RemediationRequest::new(FieldPath::parse(FIELD).unwrap(), ["0", "1"], "1");
    assert!(result.is_err());
}

#[test]
fn test_fix_log_is_written() {
    let tmp = tempdir().unwrap();
    let folder = create_batch(tmp.path());

    let out = tempdir().unwrap();
    let engine = engine(out.path(), "20250101_000000");
    let outcome = engine.remediate(&[folder], &request().with_dry_run(true), &SilentReporter);
    let report = Report::from_remediation(outcome);
    let paths = engine.write_report(&report).unwrap();

    assert!(paths
        .json
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("fix_log_"));
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
    let records = json["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["record_type"] == "remediation"));
    assert!(records.iter().all(|r| r["applied"] == false));
}

/// Writes like the default sink except for one file name, which always fails.
struct FailingSink {
    fail_on: &'static str,
}

impl DocumentSink for FailingSink {
    fn persist(&self, document: &Document, path: &Path) -> Result<(), Error> {
        if path.file_name().map_or(false, |n| n == self.fail_on) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "disk refused the write",
            )));
        }
        document.write(path)
    }
}

#[test]
fn test_write_failure_keeps_backup_and_continues() {
    let tmp = tempdir().unwrap();
    let folder = create_batch(tmp.path());
    let original = fs::read(folder.join("bad_2.json")).unwrap();

    let out = tempdir().unwrap();
    let outcome = engine(out.path(), "20250101_000000")
        .with_sink(FailingSink { fail_on: "bad_2.json" })
        .remediate(&[folder.clone()], &request(), &SilentReporter);

    assert_eq!(outcome.counts.staged, 2);
    assert_eq!(outcome.counts.applied, 1);
    assert_eq!(outcome.counts.failed, 1);
    assert_eq!(
        outcome.counts.staged,
        outcome.counts.applied + outcome.counts.failed
    );

    let failed = outcome
        .actions
        .iter()
        .find(|a| a.file_path == folder.join("bad_2.json"))
        .unwrap();
    assert!(!failed.applied);
    assert!(failed.error.as_deref().unwrap().starts_with("write failed"));
    let backup = failed.backup_path.as_ref().unwrap();
    assert_eq!(fs::read(backup).unwrap(), original);
    assert_eq!(fs::read(folder.join("bad_2.json")).unwrap(), original);

    let applied = outcome
        .actions
        .iter()
        .find(|a| a.file_path == folder.join("bad_1.json"))
        .unwrap();
    assert!(applied.applied);
}

#[cfg(unix)]
#[test]
fn test_backup_failure_leaves_document_untouched() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempdir().unwrap();
    let folder = create_batch(tmp.path());
    let before = snapshot(&folder);
    fs::set_permissions(&folder, fs::Permissions::from_mode(0o555)).unwrap();

    // privileged users ignore directory modes
    let writable_check = folder.join("writable_check");
    if fs::File::create(&writable_check).is_ok() {
        fs::remove_file(&writable_check).unwrap();
        fs::set_permissions(&folder, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let out = tempdir().unwrap();
    let outcome = engine(out.path(), "20250101_000000").remediate(
        &[folder.clone()],
        &request(),
        &SilentReporter,
    );
    fs::set_permissions(&folder, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(outcome.counts.staged, 2);
    assert_eq!(outcome.counts.applied, 0);
    assert_eq!(outcome.counts.failed, 2);
    for action in &outcome.actions {
        assert!(!action.applied);
        assert!(action.backup_path.is_none());
        assert!(action.error.as_deref().unwrap().starts_with("backup failed"));
    }
    assert_eq!(snapshot(&folder), before);
}

#[cfg(unix)]
#[test]
fn test_fixed_document_keeps_its_mode() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempdir().unwrap();
    let folder = create_batch(tmp.path());
    let target = folder.join("bad_1.json");
    fs::set_permissions(&target, fs::Permissions::from_mode(0o644)).unwrap();

    let out = tempdir().unwrap();
    let outcome = engine(out.path(), "20250101_000000").remediate(
        &[folder.clone()],
        &request(),
        &SilentReporter,
    );

    assert_eq!(outcome.counts.applied, 2);
    let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o644);
}
