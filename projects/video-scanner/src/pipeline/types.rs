use crate::run_context::MarkerPolicy;
use serde::Serialize;
use std::path::PathBuf;

/// Knobs for a dispatch run
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of worker threads; values below 1 are treated as 1
    pub workers: usize,
    pub marker_policy: MarkerPolicy,
    /// Remove leftover `<output>/<stem>` entries of pending videos before
    /// processing them again
    pub clean_partial: bool,
    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            marker_policy: MarkerPolicy::default(),
            clean_partial: false,
            show_progress: true,
        }
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Outcome of one video, sent from a worker back to the dispatcher
#[derive(Debug)]
pub struct VideoOutcome {
    pub video: PathBuf,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedVideo {
    pub video: PathBuf,
    pub error: String,
}

/// Aggregated result of a dispatch run. Lists are sorted by path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchSummary {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<FailedVideo>,
    /// Videos already processed by an earlier run
    pub skipped: Vec<PathBuf>,
}

impl DispatchSummary {
    pub fn submitted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub(crate) fn record(&mut self, outcome: VideoOutcome) {
        match outcome.error {
            None => self.succeeded.push(outcome.video),
            Some(error) => self.failed.push(FailedVideo {
                video: outcome.video,
                error,
            }),
        }
    }

    pub(crate) fn sort(&mut self) {
        self.succeeded.sort();
        self.failed.sort_by(|a, b| a.video.cmp(&b.video));
        self.skipped.sort();
    }
}
