//! Progress tracking with ETA estimation

use std::time::Instant;

/// Per-frame progress of one reader or writer
///
/// Calls an optional observer with the completed fraction after every frame
/// and logs a debug line with elapsed time and ETA every `report_interval`
/// frames.
pub struct ProgressTracker {
    total: u64,
    processed: u64,
    start_time: Instant,
    label: String,
    observer: Option<Box<dyn FnMut(f32) + Send>>,
}

impl ProgressTracker {
    /// Creates a new progress tracker; a `total` of zero means unknown
    pub fn new(total: u64, label: &str) -> Self {
        Self {
            total,
            processed: 0,
            start_time: Instant::now(),
            label: label.to_string(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl FnMut(f32) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Completed fraction clamped to [0, 1]; zero while the total is unknown
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.processed as f64 / self.total as f64).clamp(0.0, 1.0) as f32
    }

    /// Counts one frame, notifies the observer and logs every `report_interval` frames
    pub fn increment_and_report(&mut self, report_interval: u64) {
        self.processed += 1;
        let fraction = self.fraction();
        if let Some(observer) = self.observer.as_mut() {
            observer(fraction);
        }

        let current = self.processed;
        if current % report_interval.max(1) == 0 || current == self.total {
            self.log_progress(current);
        }
    }

    fn log_progress(&self, current: u64) {
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();

        if self.total == 0 {
            tracing::debug!(
                "{} {} frames - elapsed: {}",
                self.label,
                current,
                format_duration(elapsed_secs)
            );
        } else if current < self.total {
            let rate = current as f64 / elapsed_secs.max(f64::EPSILON);
            let remaining = (self.total - current) as f64 / rate;
            tracing::debug!(
                "{} {}/{} ({:.1}%) - elapsed: {} - ETA: {}",
                self.label,
                current,
                self.total,
                f64::from(self.fraction()) * 100.0,
                format_duration(elapsed_secs),
                format_duration(remaining),
            );
        } else {
            tracing::debug!(
                "{} {}/{} (100.0%) - completed in {}",
                self.label,
                current,
                self.total,
                format_duration(elapsed_secs),
            );
        }
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("label", &self.label)
            .field("processed", &self.processed)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

/// Formats seconds into a human-readable duration string
pub fn format_duration(secs: f64) -> String {
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
