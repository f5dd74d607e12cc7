//! Build outcome tracking

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timing and outcome of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Operation id of the job
    pub op_id: String,

    /// Build status
    pub status: BuildStatus,

    /// Start time
    pub start_time: DateTime<Utc>,

    /// End time
    pub end_time: DateTime<Utc>,

    /// Duration in seconds
    pub duration_secs: f64,

    /// Produced artifact paths
    pub artifacts: Vec<PathBuf>,

    /// Error message if failed
    pub error: Option<String>,
}

/// Build status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Build is queued
    Queued,

    /// Build is in progress
    InProgress,

    /// Build succeeded
    Success,

    /// Build failed
    Failed,
}

impl BuildRecord {
    /// Create a new record
    pub fn new(op_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            op_id: op_id.into(),
            status: BuildStatus::Queued,
            start_time: now,
            end_time: now,
            duration_secs: 0.0,
            artifacts: Vec::new(),
            error: None,
        }
    }

    /// Mark build as started
    pub fn start(&mut self) {
        self.status = BuildStatus::InProgress;
        self.start_time = Utc::now();
    }

    /// Mark build as completed successfully
    pub fn succeed(&mut self, artifacts: Vec<PathBuf>) {
        self.status = BuildStatus::Success;
        self.finish();
        self.artifacts = artifacts;
    }

    /// Mark build as failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = BuildStatus::Failed;
        self.finish();
        self.error = Some(error.into());
    }

    fn finish(&mut self) {
        self.end_time = Utc::now();
        self.duration_secs = (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0;
    }
}

impl BuildStatus {
    /// Check if the build is complete
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Check if the build was successful
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
