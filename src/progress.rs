use serde::Serialize;
use std::fmt;
use std::path::Path;

/// The three passes a run can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    Reconcile,
    Validate,
    Remediate,
}

impl Pass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pass::Reconcile => "reconcile",
            Pass::Validate => "validate",
            Pass::Remediate => "remediate",
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for reporting pass progress.
///
/// The CLI implements it with indicatif bars. All methods have default no-op
/// implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_pass_start(&self, _pass: Pass, _total_items: usize) {}
    fn on_item(&self, _done: usize, _total: usize, _path: &Path) {}
    fn on_folder_error(&self, _folder: &Path, _message: &str) {}
    fn on_pass_complete(&self, _pass: Pass, _processed: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
