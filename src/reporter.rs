use indicatif::{ProgressBar, ProgressStyle};
use media_integrity::{Pass, ProgressReporter};
use std::path::Path;
use std::sync::Mutex;

/// CLI progress reporter using an indicatif bar per pass.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_pass_start(&self, pass: Pass, total_items: usize) {
        let pb = ProgressBar::new(total_items as u64);
        let template = format!(
            "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} ({{eta}} remaining)",
            pass
        );
        if let Ok(style) = ProgressStyle::with_template(&template) {
            pb.set_style(
                style
                    .progress_chars("━╸─")
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            );
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_item(&self, done: usize, _total: usize, _path: &Path) {
        self.with_bar(|pb| pb.set_position(done as u64));
    }

    fn on_folder_error(&self, folder: &Path, message: &str) {
        self.with_bar(|pb| {
            pb.println(format!(
                "  \x1b[31m✗\x1b[0m {}: {}",
                folder.display(),
                message
            ))
        });
    }

    fn on_pass_complete(&self, pass: Pass, processed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m {} complete: {} items in {:.2}s",
            pass, processed, duration_secs
        );
    }
}
