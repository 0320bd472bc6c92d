//! Progress reporting utilities using indicatif.
//!
//! The [`ProgressCallback`] trait is the observation seam for the scan
//! pipeline; [`Progress`] implements it with terminal progress bars for
//! the CLI. Background hosts can substitute their own implementation.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress callback for the scan pipeline phases.
///
/// Implement this trait to receive progress updates while a scan runs.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g., "enumerating", "hashing")
    /// * `total` - Total number of items to process (0 when unknown)
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed within the current phase.
    ///
    /// # Arguments
    ///
    /// * `current` - Current item number (1-based)
    /// * `detail` - Item being processed (locator or display name)
    fn on_progress(&self, current: usize, detail: &str);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Overall scan percentage, 0 to 100. Guaranteed monotonic within
    /// one scan.
    fn on_percentage(&self, _percentage: u8) {}
}

/// No-op callback for headless callers.
#[derive(Debug, Default)]
pub struct SilentProgress;

impl ProgressCallback for SilentProgress {
    fn on_phase_start(&self, _phase: &str, _total: usize) {}
    fn on_progress(&self, _current: usize, _detail: &str) {}
    fn on_phase_end(&self, _phase: &str) {}
}

/// Terminal progress reporter using indicatif.
///
/// Shows a spinner while enumerating the catalog and a bar while hashing;
/// the short persist and group phases render as messages.
pub struct Progress {
    multi: MultiProgress,
    active: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            active: Mutex::new(None),
            quiet,
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        // One bar at a time; the pipeline phases are sequential.
        if let Some(prev) = self.active.lock().unwrap().take() {
            prev.finish_and_clear();
        }

        let pb = match phase {
            "enumerating" => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::spinner_style());
                pb.set_message("Enumerating media catalog");
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            }
            "hashing" => {
                let pb = self.multi.add(ProgressBar::new(total as u64));
                pb.set_style(Self::bar_style());
                pb.set_message("Fingerprinting");
                pb
            }
            _ => {
                let pb = self.multi.add(ProgressBar::new(total.max(1) as u64));
                pb.set_style(Self::bar_style());
                pb.set_message(phase.to_string());
                pb
            }
        };

        *self.active.lock().unwrap() = Some(pb);
    }

    fn on_progress(&self, current: usize, detail: &str) {
        if self.quiet {
            return;
        }
        if let Some(ref pb) = *self.active.lock().unwrap() {
            pb.set_position(current as u64);
            pb.set_message(truncate_detail(detail, 30));
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.active.lock().unwrap().take() {
            pb.finish_with_message(format!("{phase} complete"));
        }
    }
}

/// Truncate a locator for display in the progress bar.
///
/// Counts characters, not bytes, so multibyte filenames never split
/// mid-character.
fn truncate_detail(detail: &str, max_len: usize) -> String {
    if detail.chars().count() <= max_len {
        return detail.to_string();
    }

    let tail = detail.rsplit(['/', '\\']).next().unwrap_or(detail);
    let tail_chars = tail.chars().count();
    if tail_chars >= max_len {
        let keep = max_len.saturating_sub(3);
        let suffix: String = tail.chars().skip(tail_chars - keep).collect();
        format!("...{suffix}")
    } else {
        format!(".../{tail}")
    }
}
