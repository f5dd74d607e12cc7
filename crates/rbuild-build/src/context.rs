//! Build stage tracking

use std::fmt;

use chrono::{DateTime, Utc};
use rbuild_core::BuildRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::compositor::ProgressRange;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    /// Validating the request and preparing the build directory
    Init,
    /// Running the project generator
    Configure,
    /// Running the build driver
    Compile,
    /// Reading the package file name
    LocateArtifact,
    /// Producing packages
    Package,
    /// Finished successfully
    Done,
    /// Stopped at the first failure
    Aborted,
}

impl BuildStage {
    /// Share of overall progress owned by the stage
    pub fn range(&self) -> Option<ProgressRange> {
        let (min, max) = match self {
            Self::Init => (0.0, 9.0),
            Self::Configure => (10.0, 19.0),
            Self::Compile => (20.0, 79.0),
            Self::LocateArtifact => (80.0, 84.0),
            Self::Package => (85.0, 99.0),
            Self::Done => (100.0, 100.0),
            Self::Aborted => return None,
        };
        Some(ProgressRange::new(min, max))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    /// Stage that follows this one on success
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Configure),
            Self::Configure => Some(Self::Compile),
            Self::Compile => Some(Self::LocateArtifact),
            Self::LocateArtifact => Some(Self::Package),
            Self::Package => Some(Self::Done),
            Self::Done | Self::Aborted => None,
        }
    }

    /// Whether moving to `next` is a legal transition
    pub fn can_advance_to(&self, next: Self) -> bool {
        match next {
            Self::Aborted => !self.is_terminal(),
            _ => self.next() == Some(next),
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Configure => "configure",
            Self::Compile => "compile",
            Self::LocateArtifact => "locate-artifact",
            Self::Package => "package",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// State of one pipeline run
#[derive(Debug, Clone)]
pub struct BuildContext {
    stage: BuildStage,
    transitions: Vec<(BuildStage, DateTime<Utc>)>,
    record: BuildRecord,
}

impl BuildContext {
    /// Start tracking a run at [`BuildStage::Init`]
    pub fn new(op_id: impl Into<String>) -> Self {
        let mut record = BuildRecord::new(op_id);
        record.start();
        Self { stage: BuildStage::Init, transitions: vec![(BuildStage::Init, Utc::now())], record }
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    /// Stages visited so far with the time they were entered
    pub fn transitions(&self) -> &[(BuildStage, DateTime<Utc>)] {
        &self.transitions
    }

    pub fn record(&self) -> &BuildRecord {
        &self.record
    }

    /// Move to `stage`; illegal transitions are ignored
    pub fn advance(&mut self, stage: BuildStage) -> bool {
        if !self.stage.can_advance_to(stage) {
            warn!("Ignoring stage transition {} -> {}", self.stage, stage);
            return false;
        }

        debug!("Stage {} -> {}", self.stage, stage);
        self.stage = stage;
        self.transitions.push((stage, Utc::now()));
        true
    }

    /// Record success and enter [`BuildStage::Done`]
    pub fn complete(&mut self, artifacts: Vec<std::path::PathBuf>) {
        if self.advance(BuildStage::Done) {
            self.record.succeed(artifacts);
        }
    }

    /// Record the failure and enter [`BuildStage::Aborted`]
    pub fn abort(&mut self, error: impl fmt::Display) {
        if self.advance(BuildStage::Aborted) {
            self.record.fail(error.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use rbuild_core::BuildStatus;

    use super::*;

    #[test]
    fn test_ranges_are_contiguous() {
        let mut stage = BuildStage::Init;
        let mut previous = stage.range().unwrap();
        while let Some(next) = stage.next() {
            let range = next.range().unwrap();
            assert!(range.min() > previous.max());
            previous = range;
            stage = next;
        }
        assert_eq!(stage, BuildStage::Done);
        assert!(BuildStage::Aborted.range().is_none());
    }

    #[test]
    fn test_full_run() {
        let mut context = BuildContext::new("op");
        for stage in [
            BuildStage::Configure,
            BuildStage::Compile,
            BuildStage::LocateArtifact,
            BuildStage::Package,
        ] {
            assert!(context.advance(stage));
        }
        context.complete(vec!["app.deb".into()]);

        assert_eq!(context.stage(), BuildStage::Done);
        assert_eq!(context.transitions().len(), 6);
        assert_eq!(context.record().status, BuildStatus::Success);
    }

    #[test]
    fn test_abort_from_any_running_stage() {
        let mut context = BuildContext::new("op");
        assert!(context.advance(BuildStage::Configure));
        context.abort("cmake failed");

        assert_eq!(context.stage(), BuildStage::Aborted);
        assert_eq!(context.record().status, BuildStatus::Failed);

        // Terminal stages stay terminal
        assert!(!context.advance(BuildStage::Compile));
        assert!(!context.advance(BuildStage::Aborted));
    }

    #[test]
    fn test_skipping_stages_is_rejected() {
        let mut context = BuildContext::new("op");
        assert!(!context.advance(BuildStage::Package));
        assert_eq!(context.stage(), BuildStage::Init);
    }
}
