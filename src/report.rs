//! Text, JSON and CSV artifacts for a finished pass.

use crate::error::Error;
use crate::progress::Pass;
use crate::reconcile::{FolderState, PairCounts, PairRecord, PairStatus, ReconcileOutcome};
use crate::remediate::{RemediationAction, RemediationCounts, RemediationOutcome, UnreadableDocument};
use crate::scanner::ErroredFolder;
use crate::validate::{FieldRecord, FieldStatus, StatusCounts, ValidationOutcome};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum ReportRecord {
    Pair(PairRecord),
    Field(FieldRecord),
    Remediation(RemediationAction),
}

impl ReportRecord {
    pub fn path(&self) -> PathBuf {
        match self {
            ReportRecord::Pair(r) => r.display_path(),
            ReportRecord::Field(r) => r.file_path.clone(),
            ReportRecord::Remediation(r) => r.file_path.clone(),
        }
    }

    /// Secondary sort key: the field name, or the pairing key for pair records.
    pub fn field(&self) -> &str {
        match self {
            ReportRecord::Pair(r) => &r.key,
            ReportRecord::Field(r) => &r.field,
            ReportRecord::Remediation(r) => &r.field,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderSummary {
    pub root: PathBuf,
    pub metadata_root: PathBuf,
    #[serde(flatten)]
    pub state: FolderState,
    pub counts: PairCounts,
    pub match_rate_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Summary {
    Reconcile {
        totals: PairCounts,
        unique_keys: usize,
        match_rate_percent: f64,
        folders: Vec<FolderSummary>,
    },
    Validate {
        fields: Vec<String>,
        files_scanned: usize,
        counts: BTreeMap<String, StatusCounts>,
        errored_folders: Vec<ErroredFolder>,
    },
    Remediate {
        field: String,
        find_values: Vec<String>,
        replace_value: String,
        backup: bool,
        dry_run: bool,
        run_stamp: String,
        counts: RemediationCounts,
        errored_folders: Vec<ErroredFolder>,
        unreadable: Vec<UnreadableDocument>,
    },
}

/// Paths of the three artifacts written for one report.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub text: PathBuf,
    pub json: PathBuf,
    pub csv: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Local>,
    pub pass: Pass,
    pub summary: Summary,
    pub records: Vec<ReportRecord>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Report {
    fn new(pass: Pass, summary: Summary, mut records: Vec<ReportRecord>) -> Self {
        records.sort_by(|a, b| {
            a.path()
                .cmp(&b.path())
                .then_with(|| a.field().cmp(b.field()))
        });
        Self {
            generated_at: Local::now(),
            pass,
            summary,
            records,
        }
    }

    pub fn from_reconciliation(outcome: ReconcileOutcome) -> Self {
        let mut records = Vec::new();
        let mut folders = Vec::with_capacity(outcome.folders.len());
        for folder in outcome.folders {
            folders.push(FolderSummary {
                root: folder.root,
                metadata_root: folder.metadata_root,
                state: folder.state,
                counts: folder.counts,
                match_rate_percent: round2(folder.counts.match_rate()),
            });
            records.extend(folder.records.into_iter().map(ReportRecord::Pair));
        }
        let summary = Summary::Reconcile {
            unique_keys: outcome.totals.unique_keys(),
            match_rate_percent: round2(outcome.totals.match_rate()),
            totals: outcome.totals,
            folders,
        };
        Self::new(Pass::Reconcile, summary, records)
    }

    pub fn from_validation(outcome: ValidationOutcome) -> Self {
        let records = outcome.records.into_iter().map(ReportRecord::Field).collect();
        let summary = Summary::Validate {
            fields: outcome.fields,
            files_scanned: outcome.files_scanned,
            counts: outcome.counts,
            errored_folders: outcome.errored_folders,
        };
        Self::new(Pass::Validate, summary, records)
    }

    pub fn from_remediation(outcome: RemediationOutcome) -> Self {
        let records = outcome
            .actions
            .into_iter()
            .map(ReportRecord::Remediation)
            .collect();
        let summary = Summary::Remediate {
            field: outcome.field,
            find_values: outcome.find_values,
            replace_value: outcome.replace_value,
            backup: outcome.backup,
            dry_run: outcome.dry_run,
            run_stamp: outcome.run_stamp,
            counts: outcome.counts,
            errored_folders: outcome.errored_folders,
            unreadable: outcome.unreadable,
        };
        Self::new(Pass::Remediate, summary, records)
    }

    pub fn with_generated_at(mut self, generated_at: DateTime<Local>) -> Self {
        self.generated_at = generated_at;
        self
    }

    pub fn default_prefix(&self) -> &'static str {
        match self.pass {
            Pass::Reconcile => "file_pair_report",
            Pass::Validate => "date_validation",
            Pass::Remediate => "fix_log",
        }
    }

    pub fn pair_records(&self) -> impl Iterator<Item = &PairRecord> {
        self.records.iter().filter_map(|r| match r {
            ReportRecord::Pair(p) => Some(p),
            _ => None,
        })
    }

    pub fn field_records(&self) -> impl Iterator<Item = &FieldRecord> {
        self.records.iter().filter_map(|r| match r {
            ReportRecord::Field(f) => Some(f),
            _ => None,
        })
    }

    pub fn actions(&self) -> impl Iterator<Item = &RemediationAction> {
        self.records.iter().filter_map(|r| match r {
            ReportRecord::Remediation(a) => Some(a),
            _ => None,
        })
    }

    /// Human-readable summary. Every listing is cut to `sample_limit` lines.
    pub fn render_text(&self, sample_limit: usize) -> String {
        let mut lines = vec![
            RULE.to_string(),
            format!("{} report", self.pass),
            format!("Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S")),
            RULE.to_string(),
        ];

        match &self.summary {
            Summary::Reconcile {
                totals,
                unique_keys,
                match_rate_percent,
                folders,
            } => {
                for folder in folders {
                    match &folder.state {
                        FolderState::Scanned => lines.push(format!(
                            "Folder {} ({} keys, {:.2}% matched)",
                            folder.root.display(),
                            folder.counts.unique_keys(),
                            folder.match_rate_percent
                        )),
                        FolderState::Errored { message } => lines.push(format!(
                            "Folder {} ERRORED: {}",
                            folder.root.display(),
                            message
                        )),
                    }
                }
                lines.push(String::new());
                lines.push(format!("Media files:      {}", totals.media_files));
                lines.push(format!("Metadata files:   {}", totals.metadata_files));
                lines.push(format!("Matched:          {}", totals.matched));
                lines.push(format!("Missing media:    {}", totals.missing_media));
                lines.push(format!("Missing metadata: {}", totals.missing_metadata));
                lines.push(format!("Duplicate:        {}", totals.duplicate));
                lines.push(format!("Unique keys:      {}", unique_keys));
                lines.push(format!("Match rate:       {:.2}%", match_rate_percent));

                for status in [
                    PairStatus::MissingMedia,
                    PairStatus::MissingMetadata,
                    PairStatus::Duplicate,
                ] {
                    let entries: Vec<String> = self
                        .pair_records()
                        .filter(|r| r.status == status)
                        .map(|r| format!("{} ({})", r.key, r.display_path().display()))
                        .collect();
                    push_samples(&mut lines, status.as_str(), entries, sample_limit);
                }
            }
            Summary::Validate {
                fields,
                files_scanned,
                counts,
                errored_folders,
            } => {
                lines.push(format!("Documents scanned: {}", files_scanned));
                for folder in errored_folders {
                    lines.push(format!(
                        "Folder {} ERRORED: {}",
                        folder.root.display(),
                        folder.message
                    ));
                }
                for field in fields {
                    let c = counts.get(field).copied().unwrap_or_default();
                    lines.push(String::new());
                    lines.push(format!("[{}]", field));
                    lines.push(format!("  total:          {}", c.total()));
                    for status in FieldStatus::ALL {
                        lines.push(format!("  {:<15} {}", format!("{}:", status.as_str()), c.get(status)));
                    }
                    for status in FieldStatus::ALL.into_iter().filter(|s| *s != FieldStatus::Valid) {
                        let entries: Vec<String> = self
                            .field_records()
                            .filter(|r| &r.field == field && r.status == status)
                            .map(|r| {
                                format!(
                                    "{}: {}",
                                    r.file_path.display(),
                                    r.raw_value
                                        .as_deref()
                                        .or(r.reason.as_deref())
                                        .unwrap_or("-")
                                )
                            })
                            .collect();
                        push_samples(
                            &mut lines,
                            &format!("{} {}", field, status.as_str()),
                            entries,
                            sample_limit,
                        );
                    }
                }
            }
            Summary::Remediate {
                field,
                find_values,
                replace_value,
                backup,
                dry_run,
                counts,
                errored_folders,
                unreadable,
                ..
            } => {
                lines.push(format!("Field:    {}", field));
                lines.push(format!("Find:     {}", find_values.join(", ")));
                lines.push(format!("Replace:  {}", replace_value));
                lines.push(format!("Backup:   {}", if *backup { "yes" } else { "no" }));
                lines.push(format!("Dry-run:  {}", if *dry_run { "yes" } else { "no" }));
                lines.push(String::new());
                lines.push(format!("Scanned:    {}", counts.scanned));
                lines.push(format!("Staged:     {}", counts.staged));
                lines.push(format!("Applied:    {}", counts.applied));
                lines.push(format!("Skipped:    {}", counts.skipped));
                lines.push(format!("Failed:     {}", counts.failed));
                lines.push(format!("Unreadable: {}", counts.unreadable));
                for folder in errored_folders {
                    lines.push(format!(
                        "Folder {} ERRORED: {}",
                        folder.root.display(),
                        folder.message
                    ));
                }

                let staged: Vec<String> = self
                    .actions()
                    .filter(|a| a.error.is_none())
                    .map(|a| {
                        let mut line = format!(
                            "{}: {} -> {}",
                            a.file_path.display(),
                            a.old_value,
                            a.new_value
                        );
                        if let Some(backup) = &a.backup_path {
                            line.push_str(&format!(" (backup {})", backup.display()));
                        }
                        line
                    })
                    .collect();
                let title = if *dry_run { "would change" } else { "changed" };
                push_samples(&mut lines, title, staged, sample_limit);

                let failed: Vec<String> = self
                    .actions()
                    .filter_map(|a| {
                        a.error
                            .as_ref()
                            .map(|e| format!("{}: {}", a.file_path.display(), e))
                    })
                    .collect();
                push_samples(&mut lines, "failed", failed, sample_limit);

                let unreadable: Vec<String> = unreadable
                    .iter()
                    .map(|u| format!("{}: {}", u.path.display(), u.message))
                    .collect();
                push_samples(&mut lines, "unreadable", unreadable, sample_limit);
            }
        }

        lines.push(String::new());
        lines.join("\n")
    }

    pub fn render_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One CSV row per record; the header is written even when there are no rows.
    pub fn render_csv(&self) -> Result<String, Error> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        match self.pass {
            Pass::Reconcile => {
                wtr.write_record(PairRow::HEADERS)?;
                for r in self.pair_records() {
                    wtr.serialize(PairRow::from(r))?;
                }
            }
            Pass::Validate => {
                wtr.write_record(FieldRow::HEADERS)?;
                for r in self.field_records() {
                    wtr.serialize(FieldRow::from(r))?;
                }
            }
            Pass::Remediate => {
                wtr.write_record(ActionRow::HEADERS)?;
                for a in self.actions() {
                    wtr.serialize(ActionRow::from(a))?;
                }
            }
        }

        let bytes = wtr
            .into_inner()
            .map_err(|e| Error::Io(io::Error::new(e.error().kind(), e.error().to_string())))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Write `{prefix}_{timestamp}.txt|.json|.csv` into `output_dir`.
    /// Existing reports are never overwritten; a taken name gets `_{n}`.
    pub fn write_artifacts(
        &self,
        output_dir: &Path,
        prefix: &str,
        sample_limit: usize,
    ) -> Result<ArtifactPaths, Error> {
        fs::create_dir_all(output_dir)?;
        let stamp = self.generated_at.format("%Y%m%d_%H%M%S").to_string();
        let text = self.render_text(sample_limit);
        let json = self.render_json()?;
        let csv = self.render_csv()?;

        for attempt in 0..1000 {
            let base = match attempt {
                0 => format!("{}_{}", prefix, stamp),
                n => format!("{}_{}_{}", prefix, stamp, n),
            };
            let paths = ArtifactPaths {
                text: output_dir.join(format!("{}.txt", base)),
                json: output_dir.join(format!("{}.json", base)),
                csv: output_dir.join(format!("{}.csv", base)),
            };
            if paths.json.exists() || paths.csv.exists() {
                continue;
            }
            match create_new(&paths.text, text.as_bytes()) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
            create_new(&paths.json, json.as_bytes())?;
            create_new(&paths.csv, csv.as_bytes())?;

            info!(
                "Report written: {}, {}, {}",
                paths.text.display(),
                paths.json.display(),
                paths.csv.display()
            );
            return Ok(paths);
        }

        Err(Error::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free report name for {} in {}", prefix, output_dir.display()),
        )))
    }
}

fn create_new(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(contents)
}

fn push_samples(lines: &mut Vec<String>, title: &str, entries: Vec<String>, limit: usize) {
    if entries.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push(format!("{} ({}):", title, entries.len()));
    lines.push(THIN_RULE.to_string());
    let total = entries.len();
    lines.extend(
        entries
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, e)| format!("  {:>4}. {}", i + 1, e)),
    );
    if total > limit {
        lines.push(format!("  ... and {} more", total - limit));
    }
}

fn path_cell(path: Option<&PathBuf>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_default()
}

#[derive(Serialize)]
struct PairRow {
    folder: String,
    key: String,
    status: &'static str,
    has_media: bool,
    has_metadata: bool,
    media_path: String,
    metadata_path: String,
    media_bytes: Option<u64>,
    metadata_bytes: Option<u64>,
    extra_paths: String,
}

impl PairRow {
    const HEADERS: [&'static str; 10] = [
        "folder",
        "key",
        "status",
        "has_media",
        "has_metadata",
        "media_path",
        "metadata_path",
        "media_bytes",
        "metadata_bytes",
        "extra_paths",
    ];
}

impl From<&PairRecord> for PairRow {
    fn from(r: &PairRecord) -> Self {
        Self {
            folder: r.folder.display().to_string(),
            key: r.key.clone(),
            status: r.status.as_str(),
            has_media: r.has_media,
            has_metadata: r.has_metadata,
            media_path: path_cell(r.media_path.as_ref()),
            metadata_path: path_cell(r.metadata_path.as_ref()),
            media_bytes: r.media_bytes,
            metadata_bytes: r.metadata_bytes,
            extra_paths: r
                .extra_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(";"),
        }
    }
}

#[derive(Serialize)]
struct FieldRow {
    file_path: String,
    field: String,
    status: &'static str,
    raw_value: Option<String>,
    parsed_value: Option<String>,
    matched_format: Option<String>,
    reason: Option<String>,
}

impl FieldRow {
    const HEADERS: [&'static str; 7] = [
        "file_path",
        "field",
        "status",
        "raw_value",
        "parsed_value",
        "matched_format",
        "reason",
    ];
}

impl From<&FieldRecord> for FieldRow {
    fn from(r: &FieldRecord) -> Self {
        Self {
            file_path: r.file_path.display().to_string(),
            field: r.field.clone(),
            status: r.status.as_str(),
            raw_value: r.raw_value.clone(),
            parsed_value: r.parsed_value.map(|d| d.format("%Y-%m-%d").to_string()),
            matched_format: r.matched_format.clone(),
            reason: r.reason.clone(),
        }
    }
}

#[derive(Serialize)]
struct ActionRow {
    file_path: String,
    field: String,
    old_value: String,
    new_value: String,
    applied: bool,
    dry_run: bool,
    backup_path: String,
    error: Option<String>,
    timestamp: String,
}

impl ActionRow {
    const HEADERS: [&'static str; 9] = [
        "file_path",
        "field",
        "old_value",
        "new_value",
        "applied",
        "dry_run",
        "backup_path",
        "error",
        "timestamp",
    ];
}

impl From<&RemediationAction> for ActionRow {
    fn from(a: &RemediationAction) -> Self {
        Self {
            file_path: a.file_path.display().to_string(),
            field: a.field.clone(),
            old_value: a.old_value.clone(),
            new_value: a.new_value.clone(),
            applied: a.applied,
            dry_run: a.dry_run,
            backup_path: path_cell(a.backup_path.as_ref()),
            error: a.error.clone(),
            timestamp: a.timestamp.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{FolderReconciliation, PairRecord};

    fn pair(key: &str, status: PairStatus) -> PairRecord {
        PairRecord {
            folder: PathBuf::from("/d"),
            key: key.to_string(),
            has_media: status != PairStatus::MissingMedia,
            has_metadata: status != PairStatus::MissingMetadata,
            status,
            media_path: None,
            metadata_path: Some(PathBuf::from(format!("/d/{}.json", key))),
            extra_paths: Vec::new(),
            media_bytes: None,
            metadata_bytes: None,
        }
    }

    fn reconcile_report(records: Vec<PairRecord>) -> Report {
        let counts = PairCounts {
            missing_media: records.len(),
            ..Default::default()
        };
        Report::from_reconciliation(ReconcileOutcome {
            folders: vec![FolderReconciliation {
                root: PathBuf::from("/d"),
                metadata_root: PathBuf::from("/d"),
                state: FolderState::Scanned,
                counts,
                records,
            }],
            totals: counts,
        })
    }

    #[test]
    fn test_records_are_sorted_by_path() {
        let report = reconcile_report(vec![
            pair("c", PairStatus::MissingMedia),
            pair("a", PairStatus::MissingMedia),
            pair("b", PairStatus::MissingMedia),
        ]);
        let keys: Vec<&str> = report.pair_records().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_text_samples_are_truncated() {
        let records = (0..30)
            .map(|i| pair(&format!("video{:02}", i), PairStatus::MissingMedia))
            .collect();
        let text = reconcile_report(records).render_text(5);
        assert!(text.contains("missing_media (30):"));
        assert!(text.contains("video04"));
        assert!(!text.contains("video05 "));
        assert!(text.contains("... and 25 more"));
    }

    #[test]
    fn test_csv_has_header_and_one_row_per_record() {
        let report = reconcile_report(vec![
            pair("a", PairStatus::MissingMedia),
            pair("b", PairStatus::MissingMedia),
        ]);
        let csv_text = report.render_csv().unwrap();
        let lines: Vec<&str> = csv_text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("folder,key,status"));
        assert!(lines[1].contains("missing_media"));

        let empty = reconcile_report(Vec::new()).render_csv().unwrap();
        assert_eq!(empty.lines().count(), 1);
    }

    #[test]
    fn test_json_tags_record_types() {
        let report = reconcile_report(vec![pair("a", PairStatus::MissingMedia)]);
        let value: serde_json::Value = serde_json::from_str(&report.render_json().unwrap()).unwrap();
        assert_eq!(value["pass"], "reconcile");
        assert_eq!(value["records"][0]["record_type"], "pair");
        assert_eq!(value["summary"]["totals"]["missing_media"], 1);
    }

    #[test]
    fn test_same_second_reports_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let at = Local::now();
        let first = reconcile_report(vec![pair("a", PairStatus::MissingMedia)]).with_generated_at(at);
        let second = reconcile_report(vec![
            pair("a", PairStatus::MissingMedia),
            pair("b", PairStatus::MissingMedia),
        ])
        .with_generated_at(at);

        let first_paths = first.write_artifacts(dir.path(), "file_pair_report", 20).unwrap();
        let second_paths = second.write_artifacts(dir.path(), "file_pair_report", 20).unwrap();

        assert_ne!(first_paths.csv, second_paths.csv);
        let stem = second_paths.csv.file_stem().unwrap().to_string_lossy().into_owned();
        assert!(stem.ends_with("_1"));
        assert_eq!(fs::read_to_string(&first_paths.csv).unwrap().lines().count(), 2);
        assert_eq!(fs::read_to_string(&second_paths.csv).unwrap().lines().count(), 3);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 6);
    }
}
