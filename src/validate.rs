//! Date field classification.

use crate::config::{AppConfig, YearRange};
use crate::document::{canonical_string, Document, FieldPath};
use crate::error::Error;
use crate::progress::{Pass, ProgressReporter};
use crate::scanner::{self, ErroredFolder, ScanFilter};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    Valid,
    InvalidFormat,
    Missing,
    OutOfRange,
    ParseError,
}

impl FieldStatus {
    pub const ALL: [FieldStatus; 5] = [
        FieldStatus::Valid,
        FieldStatus::InvalidFormat,
        FieldStatus::Missing,
        FieldStatus::OutOfRange,
        FieldStatus::ParseError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldStatus::Valid => "valid",
            FieldStatus::InvalidFormat => "invalid_format",
            FieldStatus::Missing => "missing",
            FieldStatus::OutOfRange => "out_of_range",
            FieldStatus::ParseError => "parse_error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldRecord {
    pub file_path: PathBuf,
    pub field: String,
    pub raw_value: Option<String>,
    pub parsed_value: Option<NaiveDate>,
    pub matched_format: Option<String>,
    pub status: FieldStatus,
    pub reason: Option<String>,
}

/// Outcome of classifying one value, before it is tied to a file.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub status: FieldStatus,
    pub raw_value: Option<String>,
    pub parsed_value: Option<NaiveDate>,
    pub matched_format: Option<String>,
    pub reason: Option<String>,
}

impl Classification {
    fn rejected(status: FieldStatus, raw_value: Option<String>, reason: String) -> Self {
        Self {
            status,
            raw_value,
            parsed_value: None,
            matched_format: None,
            reason: Some(reason),
        }
    }
}

const DAY_SPECS: [&str; 6] = ["%d", "%e", "%j", "%F", "%D", "%x"];
const MONTH_SPECS: [&str; 8] = ["%m", "%b", "%B", "%h", "%j", "%F", "%D", "%x"];

/// Retry a partial format (`%Y%m`, `%Y`) with the missing parts set to `01`.
fn parse_with_defaults(value: &str, format: &str) -> Option<NaiveDate> {
    let has_day = DAY_SPECS.iter().any(|spec| format.contains(spec));
    if has_day {
        return None;
    }
    let has_month = MONTH_SPECS.iter().any(|spec| format.contains(spec));

    let mut padded_format = format.to_string();
    let mut padded_value = value.to_string();
    if !has_month {
        padded_format.push_str("|%m");
        padded_value.push_str("|01");
    }
    padded_format.push_str("|%d");
    padded_value.push_str("|01");
    NaiveDate::parse_from_str(&padded_value, &padded_format).ok()
}

/// Accepted date formats, tried in order, and an optional inclusive year range.
#[derive(Debug, Clone)]
pub struct DateRules {
    formats: Vec<String>,
    year_range: Option<YearRange>,
}

impl DateRules {
    pub fn new(formats: Vec<String>, year_range: Option<YearRange>) -> Result<Self, Error> {
        if formats.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one date format is required".to_string(),
            ));
        }
        if let Some(range) = year_range {
            if range.min > range.max {
                return Err(Error::InvalidRequest(format!(
                    "year range {}..{} is empty",
                    range.min, range.max
                )));
            }
        }
        Ok(Self {
            formats,
            year_range,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::new(config.date_formats.clone(), config.year_range)
    }

    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    /// First format that parses wins; the date part of a date-time is kept.
    /// A format without a day (or month) defaults it to the first.
    pub fn parse<'a>(&'a self, value: &str) -> Option<(NaiveDate, &'a str)> {
        self.formats.iter().find_map(|format| {
            NaiveDateTime::parse_from_str(value, format)
                .map(|dt| dt.date())
                .or_else(|_| NaiveDate::parse_from_str(value, format))
                .ok()
                .or_else(|| parse_with_defaults(value, format))
                .map(|date| (date, format.as_str()))
        })
    }

    pub fn classify(&self, value: Option<&Value>) -> Classification {
        let text = match value {
            None | Some(Value::Null) => {
                return Classification::rejected(
                    FieldStatus::Missing,
                    None,
                    "field absent".to_string(),
                )
            }
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
            Some(other) => {
                return Classification::rejected(
                    FieldStatus::InvalidFormat,
                    canonical_string(other),
                    "not a date value".to_string(),
                )
            }
        };

        if text.is_empty() {
            return Classification::rejected(
                FieldStatus::InvalidFormat,
                Some(text),
                "empty value".to_string(),
            );
        }

        let (date, format) = match self.parse(&text) {
            Some(parsed) => parsed,
            None => {
                let reason = format!("matches none of {}", self.formats.join(", "));
                return Classification::rejected(FieldStatus::InvalidFormat, Some(text), reason);
            }
        };

        let (status, reason) = match self.year_range {
            Some(range) if !range.contains(date.year()) => (
                FieldStatus::OutOfRange,
                Some(format!(
                    "year {} outside {}..={}",
                    date.year(),
                    range.min,
                    range.max
                )),
            ),
            _ => (FieldStatus::Valid, None),
        };

        Classification {
            status,
            raw_value: Some(text),
            parsed_value: Some(date),
            matched_format: Some(format.to_string()),
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub valid: usize,
    pub invalid_format: usize,
    pub missing: usize,
    pub out_of_range: usize,
    pub parse_error: usize,
}

impl StatusCounts {
    fn record(&mut self, status: FieldStatus) {
        match status {
            FieldStatus::Valid => self.valid += 1,
            FieldStatus::InvalidFormat => self.invalid_format += 1,
            FieldStatus::Missing => self.missing += 1,
            FieldStatus::OutOfRange => self.out_of_range += 1,
            FieldStatus::ParseError => self.parse_error += 1,
        }
    }

    pub fn get(&self, status: FieldStatus) -> usize {
        match status {
            FieldStatus::Valid => self.valid,
            FieldStatus::InvalidFormat => self.invalid_format,
            FieldStatus::Missing => self.missing,
            FieldStatus::OutOfRange => self.out_of_range,
            FieldStatus::ParseError => self.parse_error,
        }
    }

    pub fn total(&self) -> usize {
        FieldStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub fields: Vec<String>,
    pub files_scanned: usize,
    pub counts: BTreeMap<String, StatusCounts>,
    pub errored_folders: Vec<ErroredFolder>,
    pub records: Vec<FieldRecord>,
}

impl ValidationOutcome {
    pub fn counts_for(&self, field: &str) -> StatusCounts {
        self.counts.get(field).copied().unwrap_or_default()
    }

    pub fn records_with(&self, status: FieldStatus) -> impl Iterator<Item = &FieldRecord> {
        self.records.iter().filter(move |r| r.status == status)
    }
}

fn parse_error_records(path: &Path, fields: &[FieldPath], err: &Error) -> Vec<FieldRecord> {
    fields
        .iter()
        .map(|field| FieldRecord {
            file_path: path.to_path_buf(),
            field: field.to_string(),
            raw_value: None,
            parsed_value: None,
            matched_format: None,
            status: FieldStatus::ParseError,
            reason: Some(err.to_string()),
        })
        .collect()
}

/// Classify `fields` of one document. An unreadable or malformed document
/// yields one `parse_error` record per field.
pub fn check_document(path: &Path, fields: &[FieldPath], rules: &DateRules) -> Vec<FieldRecord> {
    let document = match Document::read(path) {
        Ok(document) => document,
        Err(err) => {
            warn!("{}", err);
            return parse_error_records(path, fields, &err);
        }
    };

    fields
        .iter()
        .map(|field| {
            let c = rules.classify(document.get(field));
            FieldRecord {
                file_path: path.to_path_buf(),
                field: field.to_string(),
                raw_value: c.raw_value,
                parsed_value: c.parsed_value,
                matched_format: c.matched_format,
                status: c.status,
                reason: c.reason,
            }
        })
        .collect()
}

/// Validate every document under `roots`. Never aborts on a single file or folder.
pub fn validate_folders(
    roots: &[PathBuf],
    fields: &[FieldPath],
    rules: &DateRules,
    filter: &ScanFilter,
    reporter: &dyn ProgressReporter,
) -> ValidationOutcome {
    let started = Instant::now();
    let (files, errored_folders) = scanner::collect_files(roots, filter, reporter);
    reporter.on_pass_start(Pass::Validate, files.len());
    info!(
        "Validating {} over {} document(s) with formats [{}]",
        fields
            .iter()
            .map(FieldPath::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        files.len(),
        rules.formats().join(", ")
    );

    let mut counts: BTreeMap<String, StatusCounts> = fields
        .iter()
        .map(|f| (f.to_string(), StatusCounts::default()))
        .collect();
    let mut records = Vec::with_capacity(files.len() * fields.len());

    for (idx, path) in files.iter().enumerate() {
        for record in check_document(path, fields, rules) {
            debug!(
                "{} [{}] {}",
                path.display(),
                record.field,
                record.status.as_str()
            );
            counts
                .entry(record.field.clone())
                .or_default()
                .record(record.status);
            records.push(record);
        }
        reporter.on_item(idx + 1, files.len(), path);
    }

    for (field, c) in &counts {
        info!(
            "[{}] valid: {}, invalid format: {}, missing: {}, out of range: {}, parse errors: {}",
            field, c.valid, c.invalid_format, c.missing, c.out_of_range, c.parse_error
        );
    }
    reporter.on_pass_complete(Pass::Validate, files.len(), started.elapsed().as_secs_f64());

    ValidationOutcome {
        fields: fields.iter().map(FieldPath::to_string).collect(),
        files_scanned: files.len(),
        counts,
        errored_folders,
        records,
    }
}
