//! Progress display for the two build stages
//!
//! One bar counts finished steps across both stages, and a spinner shows the
//! running step together with the latest line of build output.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::command_logger::LogCallback;
use super::driver::{StageKind, StageStep};

/// Steps in a full run: configure, build and install for each stage
const TOTAL_STEPS: u64 = 6;

/// Progress display for a build run
#[derive(Clone)]
pub struct StageProgress {
    main_bar: ProgressBar,
    step_bar: ProgressBar,
}

impl StageProgress {
    /// Create the display inside an existing multi-progress container
    pub fn new_with_multi_progress(multi: &MultiProgress) -> Self {
        let main_bar = multi.add(ProgressBar::new(TOTAL_STEPS));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} steps")
        {
            main_bar.set_style(style.progress_chars("#>-"));
        }
        main_bar.enable_steady_tick(Duration::from_millis(100));

        let step_bar = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.yellow} {msg}") {
            step_bar.set_style(style);
        }
        step_bar.enable_steady_tick(Duration::from_millis(100));

        Self { main_bar, step_bar }
    }

    /// Create a display that draws nothing
    pub fn hidden() -> Self {
        Self {
            main_bar: ProgressBar::hidden(),
            step_bar: ProgressBar::hidden(),
        }
    }

    pub fn start_step(&self, stage: StageKind, step: StageStep) {
        self.step_bar.set_prefix(format!("{} {}", stage, step));
        self.step_bar.set_message(format!("{} {}", stage, step));
    }

    pub fn finish_step(&self) {
        self.main_bar.inc(1);
    }

    pub fn fail_step(&self, stage: StageKind, step: StageStep, error: &str) {
        self.step_bar
            .abandon_with_message(format!("{} {}: FAILED - {}", stage, step, error));
        self.main_bar.abandon();
    }

    pub fn finish(&self) {
        self.step_bar.finish_and_clear();
        self.main_bar.finish_with_message("Build complete");
    }

    /// Callback that mirrors build output lines into the spinner message
    pub fn log_callback(&self) -> LogCallback {
        let bar = self.step_bar.clone();
        Arc::new(move |line: &str| {
            bar.set_message(format!("{}: {}", bar.prefix(), line));
        })
    }

    /// Number of steps completed so far
    pub fn completed_steps(&self) -> u64 {
        self.main_bar.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress_counts_steps() {
        let progress = StageProgress::hidden();
        progress.start_step(StageKind::Vendor, StageStep::Configure);
        progress.finish_step();
        progress.start_step(StageKind::Vendor, StageStep::Build);
        progress.finish_step();

        assert_eq!(progress.completed_steps(), 2);
    }
}
