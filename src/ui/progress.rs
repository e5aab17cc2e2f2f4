//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    /// Create a new spinner (shows once started in interactive mode)
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            // Plain output for CI
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            println!("{} {}", style("✓").green(), message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if self.interactive {
            println!("{} {}", style("✗").red(), message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }

    /// Clear the spinner without any message
    pub fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.clear();
        }
    }
}

/// Per-file progress for uploads and restores.
///
/// Shows an indicatif bar in interactive mode and one line per file in CI.
/// Clones share the same bar, so concurrent workers can each report their
/// own file.
#[derive(Clone)]
pub struct TransferProgress {
    bar: Option<ProgressBar>,
}

impl TransferProgress {
    /// Create a progress indicator for `total` files
    pub fn new(ctx: &UiContext, label: &str, total: u64) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.cyan} {prefix}  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                    .progress_chars("━╸─"),
            );
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            println!("{} ({} files)...", label, total);
            None
        };
        Self { bar }
    }

    /// A file finished successfully
    pub fn file_done(&self, path: &str) {
        if let Some(ref bar) = self.bar {
            bar.inc(1);
            bar.set_message(shorten(path));
        } else {
            println!("  {} {}", style("[OK]").green(), path);
        }
    }

    /// A file failed; the failure stays visible above the bar
    pub fn file_failed(&self, path: &str, reason: &str) {
        if let Some(ref bar) = self.bar {
            bar.inc(1);
            bar.println(format!("  {} {}: {}", style("✗").red(), path, reason));
        } else {
            println!("  {} {}: {}", style("[FAIL]").red(), path, reason);
        }
    }

    /// Finish and clear the progress bar.
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// Keep bar messages on one line
fn shorten(path: &str) -> String {
    let count = path.chars().count();
    if count > 60 {
        let tail: String = path.chars().skip(count - 57).collect();
        format!("...{}", tail)
    } else {
        path.to_string()
    }
}
