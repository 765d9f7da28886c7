use crate::config::{self, AppConfig};
use crate::document::{AtomicSink, DocumentSink, FieldPath};
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::reconcile::{self, PairingRules, ReconcileOutcome};
use crate::remediate::{self, RemediationOutcome, RemediationRequest};
use crate::report::{ArtifactPaths, Report};
use crate::scanner::ScanFilter;
use crate::validate::{self, DateRules, ValidationOutcome};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Identity of one invocation. Its stamp names backups and report files.
#[derive(Debug, Clone)]
pub struct AuditRun {
    pub started_at: DateTime<Local>,
    pub stamp: String,
}

impl AuditRun {
    pub fn start() -> Self {
        let started_at = Local::now();
        Self {
            stamp: started_at.format("%Y%m%d_%H%M%S").to_string(),
            started_at,
        }
    }
}

pub struct AuditEngine {
    config: AppConfig,
    run: AuditRun,
    sink: Box<dyn DocumentSink>,
}

impl AuditEngine {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            run: AuditRun::start(),
            sink: Box::new(AtomicSink),
        }
    }

    pub fn with_run(mut self, run: AuditRun) -> Self {
        self.run = run;
        self
    }

    /// Persist remediated documents through `sink` instead of in place.
    pub fn with_sink(mut self, sink: impl DocumentSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn run(&self) -> &AuditRun {
        &self.run
    }

    /// Nested roots would be walked twice in a recursive pass.
    fn roots(&self, roots: &[PathBuf]) -> Vec<PathBuf> {
        if !self.config.recursive {
            return roots.to_vec();
        }
        let collapsed = config::non_overlapping_directories(roots.to_vec());
        if collapsed.len() != roots.len() {
            info!("Processing directories: {:?}", collapsed);
        }
        collapsed
    }

    fn document_filter(&self) -> ScanFilter {
        ScanFilter::new(
            &[self.config.metadata_extension.as_str()],
            &self.config.ignore_patterns,
            self.config.recursive,
        )
    }

    pub fn reconcile(&self, roots: &[PathBuf], reporter: &dyn ProgressReporter) -> ReconcileOutcome {
        let rules = PairingRules::from_config(&self.config);
        debug!("Pairing rules: {:?}", rules);
        reconcile::reconcile_folders(&self.roots(roots), &rules, reporter)
    }

    pub fn reconcile_dual(
        &self,
        media_root: &Path,
        metadata_root: &Path,
        reporter: &dyn ProgressReporter,
    ) -> ReconcileOutcome {
        let rules = PairingRules::from_config(&self.config);
        reconcile::reconcile_dual(media_root, metadata_root, &rules, reporter)
    }

    pub fn validate(
        &self,
        roots: &[PathBuf],
        fields: &[FieldPath],
        reporter: &dyn ProgressReporter,
    ) -> Result<ValidationOutcome, Error> {
        if fields.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one field is required".to_string(),
            ));
        }
        let rules = DateRules::from_config(&self.config)?;
        Ok(validate::validate_folders(
            &self.roots(roots),
            fields,
            &rules,
            &self.document_filter(),
            reporter,
        ))
    }

    pub fn remediate(
        &self,
        roots: &[PathBuf],
        request: &RemediationRequest,
        reporter: &dyn ProgressReporter,
    ) -> RemediationOutcome {
        remediate::remediate_folders(
            &self.roots(roots),
            request,
            &self.document_filter(),
            &self.run.stamp,
            self.sink.as_ref(),
            reporter,
        )
    }

    /// Persist `report` under the configured output directory.
    pub fn write_report(&self, report: &Report) -> Result<ArtifactPaths, Error> {
        report.write_artifacts(
            Path::new(&self.config.output_dir),
            report.default_prefix(),
            self.config.sample_limit,
        )
    }
}
