//! Terminal progress display for pipeline runs.

use crate::pipeline::graph::{RunObserver, TraceEntry};
use crate::pipeline::StageId;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A spinner showing the stage currently executing.
pub struct StageSpinner {
    bar: ProgressBar,
}

impl StageSpinner {
    pub fn new(show: bool) -> Self {
        let bar = if show {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] step {pos}: {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    #[cfg(test)]
    fn message(&self) -> String {
        self.bar.message()
    }

    #[cfg(test)]
    fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl RunObserver for StageSpinner {
    fn stage_started(&self, stage: StageId, step: usize) {
        self.bar.set_position(step as u64);
        self.bar.set_message(format!("{}...", stage));
    }

    fn stage_finished(&self, entry: &TraceEntry) {
        if entry.warnings > 0 {
            self.bar.println(format!(
                "   ⚠️  {} finished with {} degraded analyses",
                entry.stage, entry.warnings
            ));
        }
        self.bar.set_message(format!("{} done ({}ms)", entry.stage, entry.duration_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::router::Target;

    #[test]
    fn test_spinner_tracks_current_stage() {
        let spinner = StageSpinner::new(false);
        spinner.stage_started(StageId::Investigate, 5);
        assert_eq!(spinner.position(), 5);
        assert_eq!(spinner.message(), "investigate...");

        spinner.stage_finished(&TraceEntry {
            step: 5,
            stage: StageId::Investigate,
            duration_ms: 40,
            warnings: 0,
            next: Target::Stage(StageId::Align),
        });
        assert_eq!(spinner.message(), "investigate done (40ms)");
        spinner.finish();
    }
}
