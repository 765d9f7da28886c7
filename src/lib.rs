pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod progress;
pub mod reconcile;
pub mod remediate;
pub mod report;
pub mod scanner;
pub mod validate;

pub use config::AppConfig;
pub use document::{AtomicSink, Document, DocumentSink, FieldPath};
pub use engine::{AuditEngine, AuditRun};
pub use error::Error;
pub use progress::{Pass, ProgressReporter, SilentReporter};
pub use report::Report;
