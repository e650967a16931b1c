//! Throttled progress reporting with ETA estimation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// A progress update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub description: String,
    pub current: u64,
    pub total: u64,
    /// The total is unknown or meaningless
    pub indeterminate: bool,
}

/// Receives progress from a running operation.
///
/// Called from the worker thread; implementations do their own marshaling.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: &Progress);
}

/// Discards all progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_progress(&self, _progress: &Progress) {}
}

/// Logs progress with an ETA through `tracing`.
///
/// Elapsed time is measured per phase: a report at zero or with a new
/// description restarts the clock.
#[derive(Debug)]
pub struct LogProgress {
    phase: Mutex<Phase>,
}

#[derive(Debug)]
struct Phase {
    description: String,
    started: Instant,
}

impl LogProgress {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(Phase {
                description: String::new(),
                started: Instant::now(),
            }),
        }
    }

    /// Seconds since the phase `progress` belongs to began
    fn phase_elapsed(&self, progress: &Progress) -> f64 {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if progress.current == 0 || phase.description != progress.description {
            phase.description = progress.description.clone();
            phase.started = Instant::now();
        }
        phase.started.elapsed().as_secs_f64()
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for LogProgress {
    fn on_progress(&self, progress: &Progress) {
        let elapsed_secs = self.phase_elapsed(progress);
        let Progress {
            description,
            current,
            total,
            indeterminate,
        } = progress;

        if *indeterminate {
            tracing::info!("{description}...");
        } else if *current > 0 && current < total {
            let rate = *current as f64 / elapsed_secs.max(f64::EPSILON);
            let remaining = (total - current) as f64 / rate;
            tracing::info!(
                "{} {}/{} ({:.1}%) - elapsed: {} - ETA: {}",
                description,
                current,
                total,
                *current as f64 / *total as f64 * 100.0,
                format_duration(elapsed_secs),
                format_duration(remaining),
            );
        } else if current == total {
            tracing::info!(
                "{} {}/{} (100.0%) - completed in {}",
                description,
                current,
                total,
                format_duration(elapsed_secs),
            );
        }
    }
}

impl ProgressSink for Sender<Progress> {
    fn on_progress(&self, progress: &Progress) {
        // The receiving side may have hung up; progress is advisory
        let _ = self.send(progress.clone());
    }
}

/// Forwards progress to a sink every `interval` units, always delivering the final value
pub struct ProgressReporter {
    description: String,
    total: u64,
    processed: AtomicU64,
    interval: u64,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    /// Creates a reporter for `total` units of work
    pub fn new(description: &str, total: u64, interval: u64, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            description: description.to_string(),
            total,
            processed: AtomicU64::new(0),
            interval: interval.max(1),
            sink,
        }
    }

    /// A reporter that discards everything
    pub fn silent() -> Self {
        Self::new("", 0, 1, Arc::new(NullProgress))
    }

    /// Starts a new phase with its own description and total
    pub fn restart(&mut self, description: &str, total: u64) {
        self.description = description.to_string();
        self.total = total;
        self.processed.store(0, Ordering::Relaxed);
        self.emit(0, false);
    }

    /// Announces work whose size is unknown
    pub fn indeterminate(&mut self, description: &str) {
        self.description = description.to_string();
        self.total = 0;
        self.processed.store(0, Ordering::Relaxed);
        self.emit(0, true);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Increments the processed count by one and reports on interval boundaries
    pub fn increment_and_report(&self) {
        let current = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if current % self.interval == 0 || current == self.total {
            self.emit(current, false);
        }
    }

    /// Delivers the current count if the last increment was not already reported
    pub fn finish(&self) {
        let current = self.processed();
        if current % self.interval != 0 && current != self.total {
            self.emit(current, false);
        }
    }

    fn emit(&self, current: u64, indeterminate: bool) {
        self.sink.on_progress(&Progress {
            description: self.description.clone(),
            current,
            total: self.total,
            indeterminate,
        });
    }
}

/// Formats seconds into a human-readable duration string
fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining = secs - (mins as f64 * 60.0);
        format!("{}m {:.0}s", mins, remaining)
    } else {
        let hours = (secs / 3600.0).floor() as u64;
        let remaining = secs - (hours as f64 * 3600.0);
        let mins = (remaining / 60.0).floor() as u64;
        let remaining_secs = remaining - (mins as f64 * 60.0);
        format!("{}h {}m {:.0}s", hours, mins, remaining_secs)
    }
}
