//! Rescaling of per-command progress into overall pipeline progress

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::progress::{PolicyUpdate, MAX_PROGRESS};

/// Slice of the overall 0-100% progress owned by one stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressRange {
    min: f64,
    max: f64,
}

impl ProgressRange {
    /// Create a range; bounds are clamped into [0, 100] and ordered
    pub fn new(min: f64, max: f64) -> Self {
        let min = min.clamp(0.0, MAX_PROGRESS);
        let max = max.clamp(0.0, MAX_PROGRESS);
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Map local progress in [0, 100] into this range
    pub fn scale(&self, local: f64) -> f64 {
        self.min + (self.max - self.min) * (local / MAX_PROGRESS)
    }

    /// Split into `parts` contiguous ranges of equal width
    pub fn split(&self, parts: usize) -> Vec<ProgressRange> {
        let parts = parts.max(1);
        let width = (self.max - self.min) / parts as f64;
        (0..parts)
            .map(|i| {
                let min = self.min + width * i as f64;
                let max = if i + 1 == parts { self.max } else { self.min + width * (i + 1) as f64 };
                Self { min, max }
            })
            .collect()
    }
}

impl Default for ProgressRange {
    fn default() -> Self {
        Self { min: 0.0, max: MAX_PROGRESS }
    }
}

/// Overall progress and the text that goes with it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub progress: f64,
    pub message: String,
}

impl StatusUpdate {
    pub fn new(progress: f64, message: impl Into<String>) -> Self {
        Self { progress, message: message.into() }
    }
}

/// Forwards policy updates to an outer sink, rescaled into the active stage range
///
/// A dropped receiver is not an error: the build keeps going and updates are
/// discarded.
#[derive(Debug)]
pub struct RangeCompositor {
    range: ProgressRange,
    sink: UnboundedSender<StatusUpdate>,
}

impl RangeCompositor {
    pub fn new(sink: UnboundedSender<StatusUpdate>) -> Self {
        Self { range: ProgressRange::default(), sink }
    }

    /// Currently active range
    pub fn range(&self) -> ProgressRange {
        self.range
    }

    /// Enter a new stage and announce it at the bottom of its range
    pub fn set_range(&mut self, min: f64, max: f64, label: impl Into<String>) {
        self.enter(ProgressRange::new(min, max), label);
    }

    /// Same as [`set_range`](Self::set_range) with a prepared range
    pub fn enter(&mut self, range: ProgressRange, label: impl Into<String>) {
        self.range = range;
        self.emit(StatusUpdate::new(range.min, label));
    }

    /// Forward an output update; narration from the policy is dropped
    pub fn on_policy_update(&self, update: PolicyUpdate) {
        if update.event.is_status() {
            return;
        }
        self.emit(StatusUpdate::new(self.range.scale(update.progress), update.event.text));
    }

    fn emit(&self, update: StatusUpdate) {
        if self.sink.send(update).is_err() {
            debug!("Status receiver dropped, discarding update");
        }
    }
}
