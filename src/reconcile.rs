//! Media ↔ metadata pairing by shared basename key.

use crate::config::AppConfig;
use crate::error::Error;
use crate::progress::{Pass, ProgressReporter};
use crate::scanner::{self, ScanFilter};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Media,
    Metadata,
}

/// One enumerated file, consumed immediately by the index.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub kind: FileKind,
    pub key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    Matched,
    MissingMedia,
    MissingMetadata,
    Duplicate,
}

impl PairStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairStatus::Matched => "matched",
            PairStatus::MissingMedia => "missing_media",
            PairStatus::MissingMetadata => "missing_metadata",
            PairStatus::Duplicate => "duplicate",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PairRecord {
    pub folder: PathBuf,
    pub key: String,
    pub has_media: bool,
    pub has_metadata: bool,
    pub status: PairStatus,
    /// First-seen media file for the key.
    pub media_path: Option<PathBuf>,
    pub metadata_path: Option<PathBuf>,
    /// Every further file sharing the key, in enumeration order.
    pub extra_paths: Vec<PathBuf>,
    pub media_bytes: Option<u64>,
    pub metadata_bytes: Option<u64>,
}

impl PairRecord {
    /// The path a report sorts and lists this record by.
    pub fn display_path(&self) -> PathBuf {
        self.metadata_path
            .clone()
            .or_else(|| self.media_path.clone())
            .unwrap_or_else(|| self.folder.join(&self.key))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PairCounts {
    pub matched: usize,
    pub missing_media: usize,
    pub missing_metadata: usize,
    pub duplicate: usize,
    pub media_files: usize,
    pub metadata_files: usize,
}

impl PairCounts {
    fn record(&mut self, status: PairStatus) {
        match status {
            PairStatus::Matched => self.matched += 1,
            PairStatus::MissingMedia => self.missing_media += 1,
            PairStatus::MissingMetadata => self.missing_metadata += 1,
            PairStatus::Duplicate => self.duplicate += 1,
        }
    }

    pub fn get(&self, status: PairStatus) -> usize {
        match status {
            PairStatus::Matched => self.matched,
            PairStatus::MissingMedia => self.missing_media,
            PairStatus::MissingMetadata => self.missing_metadata,
            PairStatus::Duplicate => self.duplicate,
        }
    }

    pub fn unique_keys(&self) -> usize {
        self.matched + self.missing_media + self.missing_metadata + self.duplicate
    }

    /// Matched keys as a percentage of unique keys.
    pub fn match_rate(&self) -> f64 {
        match self.unique_keys() {
            0 => 0.0,
            n => self.matched as f64 / n as f64 * 100.0,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.matched == self.unique_keys()
    }

    fn add(&mut self, other: &PairCounts) {
        self.matched += other.matched;
        self.missing_media += other.missing_media;
        self.missing_metadata += other.missing_metadata;
        self.duplicate += other.duplicate;
        self.media_files += other.media_files;
        self.metadata_files += other.metadata_files;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FolderState {
    Scanned,
    Errored { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderReconciliation {
    pub root: PathBuf,
    pub metadata_root: PathBuf,
    pub state: FolderState,
    pub counts: PairCounts,
    pub records: Vec<PairRecord>,
}

impl FolderReconciliation {
    fn errored(root: &Path, metadata_root: &Path, err: &Error) -> Self {
        Self {
            root: root.to_path_buf(),
            metadata_root: metadata_root.to_path_buf(),
            state: FolderState::Errored {
                message: err.to_string(),
            },
            counts: PairCounts::default(),
            records: Vec::new(),
        }
    }

    pub fn is_errored(&self) -> bool {
        matches!(self.state, FolderState::Errored { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub folders: Vec<FolderReconciliation>,
    /// Totals over scanned folders only; errored folders are excluded.
    pub totals: PairCounts,
}

impl ReconcileOutcome {
    pub fn errored_folders(&self) -> usize {
        self.folders.iter().filter(|f| f.is_errored()).count()
    }
}

/// How media and metadata files are recognised and where they live.
#[derive(Debug, Clone)]
pub struct PairingRules {
    pub media_extensions: Vec<String>,
    pub metadata_extension: String,
    pub metadata_subdir: Option<String>,
    pub ignore_patterns: Vec<String>,
    pub recursive: bool,
}

impl PairingRules {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            media_extensions: config.media_extensions.clone(),
            metadata_extension: config.metadata_extension.clone(),
            metadata_subdir: config.metadata_subdir.clone(),
            ignore_patterns: config.ignore_patterns.clone(),
            recursive: config.recursive,
        }
    }

    fn media_filter(&self) -> ScanFilter {
        ScanFilter::new(
            self.media_extensions.as_slice(),
            &self.ignore_patterns,
            self.recursive,
        )
    }

    fn metadata_filter(&self) -> ScanFilter {
        ScanFilter::new(
            &[self.metadata_extension.as_str()],
            &self.ignore_patterns,
            self.recursive,
        )
    }

    fn metadata_root(&self, root: &Path) -> PathBuf {
        match &self.metadata_subdir {
            Some(subdir) => root.join(subdir),
            None => root.to_path_buf(),
        }
    }
}

#[derive(Debug, Default)]
struct KeySlot {
    media: Vec<PathBuf>,
    metadata: Vec<PathBuf>,
}

fn enumerate(root: &Path, filter: &ScanFilter, kind: FileKind) -> Result<Vec<FileEntry>, Error> {
    Ok(scanner::list_files(root, filter)?
        .into_iter()
        .filter_map(|path| {
            scanner::file_key(&path).map(|key| FileEntry { path, kind, key })
        })
        .collect())
}

/// Classify every key in `entries`. Entries must be in enumeration order;
/// the first file seen for a key becomes the primary.
pub fn classify(folder: &Path, entries: Vec<FileEntry>) -> (Vec<PairRecord>, PairCounts) {
    let mut counts = PairCounts::default();
    let mut index: BTreeMap<String, KeySlot> = BTreeMap::new();

    for entry in entries {
        let slot = index.entry(entry.key).or_default();
        match entry.kind {
            FileKind::Media => {
                counts.media_files += 1;
                slot.media.push(entry.path);
            }
            FileKind::Metadata => {
                counts.metadata_files += 1;
                slot.metadata.push(entry.path);
            }
        }
    }

    let records = index
        .into_iter()
        .map(|(key, slot)| {
            let has_media = !slot.media.is_empty();
            let has_metadata = !slot.metadata.is_empty();
            let status = if slot.media.len() > 1 || slot.metadata.len() > 1 {
                PairStatus::Duplicate
            } else if has_media && has_metadata {
                PairStatus::Matched
            } else if has_metadata {
                PairStatus::MissingMedia
            } else {
                PairStatus::MissingMetadata
            };
            counts.record(status);

            let mut media = slot.media.into_iter();
            let mut metadata = slot.metadata.into_iter();
            let media_path = media.next();
            let metadata_path = metadata.next();
            let extra_paths: Vec<PathBuf> = media.chain(metadata).collect();
            if status == PairStatus::Duplicate {
                debug!("Duplicate key '{}': {} extra file(s)", key, extra_paths.len());
            }

            PairRecord {
                folder: folder.to_path_buf(),
                media_bytes: media_path.as_deref().and_then(file_size),
                metadata_bytes: metadata_path.as_deref().and_then(file_size),
                key,
                has_media,
                has_metadata,
                status,
                media_path,
                metadata_path,
                extra_paths,
            }
        })
        .collect();

    (records, counts)
}

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

fn reconcile_roots(
    root: &Path,
    metadata_root: &Path,
    rules: &PairingRules,
) -> Result<FolderReconciliation, Error> {
    let mut entries = enumerate(root, &rules.media_filter(), FileKind::Media)?;
    entries.extend(enumerate(
        metadata_root,
        &rules.metadata_filter(),
        FileKind::Metadata,
    )?);

    let (records, counts) = classify(root, entries);
    Ok(FolderReconciliation {
        root: root.to_path_buf(),
        metadata_root: metadata_root.to_path_buf(),
        state: FolderState::Scanned,
        counts,
        records,
    })
}

/// Reconcile one folder, with metadata side by side or in `metadata_subdir`.
pub fn reconcile_folder(root: &Path, rules: &PairingRules) -> Result<FolderReconciliation, Error> {
    reconcile_roots(root, &rules.metadata_root(root), rules)
}

fn finish(
    folders: Vec<FolderReconciliation>,
    reporter: &dyn ProgressReporter,
    started: Instant,
) -> ReconcileOutcome {
    let mut totals = PairCounts::default();
    for folder in folders.iter().filter(|f| !f.is_errored()) {
        totals.add(&folder.counts);
    }

    info!(
        "Reconciled {} folder(s): {} matched, {} missing media, {} missing metadata, {} duplicate ({:.2}% match)",
        folders.len(),
        totals.matched,
        totals.missing_media,
        totals.missing_metadata,
        totals.duplicate,
        totals.match_rate(),
    );
    reporter.on_pass_complete(Pass::Reconcile, folders.len(), started.elapsed().as_secs_f64());

    ReconcileOutcome { folders, totals }
}

fn record_folder(
    result: Result<FolderReconciliation, Error>,
    root: &Path,
    metadata_root: &Path,
    reporter: &dyn ProgressReporter,
) -> FolderReconciliation {
    match result {
        Ok(folder) => folder,
        Err(err) => {
            error!("Folder {} excluded from totals: {}", root.display(), err);
            reporter.on_folder_error(root, &err.to_string());
            FolderReconciliation::errored(root, metadata_root, &err)
        }
    }
}

/// Reconcile each root independently. A folder that cannot be read is
/// marked errored and the remaining folders are still processed.
pub fn reconcile_folders(
    roots: &[PathBuf],
    rules: &PairingRules,
    reporter: &dyn ProgressReporter,
) -> ReconcileOutcome {
    let started = Instant::now();
    reporter.on_pass_start(Pass::Reconcile, roots.len());

    let mut folders = Vec::with_capacity(roots.len());
    for (idx, root) in roots.iter().enumerate() {
        info!("Reconciling {}", root.display());
        let result = reconcile_folder(root, rules);
        folders.push(record_folder(result, root, &rules.metadata_root(root), reporter));
        reporter.on_item(idx + 1, roots.len(), root);
    }

    finish(folders, reporter, started)
}

/// Media files under `media_root`, metadata documents under `metadata_root`.
pub fn reconcile_dual(
    media_root: &Path,
    metadata_root: &Path,
    rules: &PairingRules,
    reporter: &dyn ProgressReporter,
) -> ReconcileOutcome {
    let started = Instant::now();
    reporter.on_pass_start(Pass::Reconcile, 1);
    info!(
        "Reconciling {} against {}",
        media_root.display(),
        metadata_root.display()
    );

    let result = reconcile_roots(media_root, metadata_root, rules);
    let folder = record_folder(result, media_root, metadata_root, reporter);
    reporter.on_item(1, 1, media_root);

    finish(vec![folder], reporter, started)
}
