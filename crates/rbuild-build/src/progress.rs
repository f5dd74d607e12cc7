//! Progress extraction from build tool output
//!
//! A [`Policy`] turns one [`ProgressEvent`] at a time into an optional
//! [`PolicyUpdate`]. Each external tool speaks its own [`Dialect`]: the
//! generator prints one line per configured item, make prefixes lines with a
//! percentage and ninja with an edge counter.

use std::sync::OnceLock;

use rbuild_core::BuildSystemKind;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Progress added per generator output line
pub const CONFIGURE_STEP: f64 = 1.0;

/// Upper bound of local progress
pub const MAX_PROGRESS: f64 = 100.0;

/// What a progress event carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Narration written by the orchestrator
    Status,
    /// Raw line of tool output
    OutputLine,
}

/// One event in the output of a command, in emission order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: EventKind,
    pub text: String,
}

impl ProgressEvent {
    /// Narration event
    pub fn status(text: impl Into<String>) -> Self {
        Self { kind: EventKind::Status, text: text.into() }
    }

    /// Tool output event
    pub fn output(text: impl Into<String>) -> Self {
        Self { kind: EventKind::OutputLine, text: text.into() }
    }

    /// Whether this is orchestrator narration
    pub fn is_status(&self) -> bool {
        self.kind == EventKind::Status
    }
}

/// Progress forwarded by a policy together with the event that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyUpdate {
    /// Local progress in [0, 100]
    pub progress: f64,
    pub event: ProgressEvent,
}

/// Output dialect of a build tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// CMake generator: every line is one step forward
    Configure,
    /// GNU make: `[ 42%] ...`
    Make,
    /// Ninja: `[7/10] ...`
    Ninja,
    /// Forward every line without touching progress
    Passthrough,
}

impl Dialect {
    /// Dialect spoken by a build driver
    pub fn for_build_system(kind: BuildSystemKind) -> Self {
        match kind {
            BuildSystemKind::Ninja => Self::Ninja,
            BuildSystemKind::Make => Self::Make,
        }
    }

    /// Progress reported by a line, or `None` when the line carries none
    fn parse(&self, line: &str, current: f64) -> Option<f64> {
        match self {
            Self::Configure => Some((current + CONFIGURE_STEP).min(MAX_PROGRESS)),
            Self::Make => {
                let caps = make_pattern().captures(line)?;
                caps[1].parse::<f64>().ok().map(|percent| percent.min(MAX_PROGRESS))
            }
            Self::Ninja => {
                let caps = ninja_pattern().captures(line)?;
                let done = caps[1].parse::<f64>().ok()?;
                let total = caps[2].parse::<f64>().ok()?;
                if total == 0.0 {
                    return None;
                }
                Some((done / total * MAX_PROGRESS).min(MAX_PROGRESS))
            }
            Self::Passthrough => Some(current),
        }
    }
}

fn make_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\[\s*(\d+)%\]").expect("Invalid regex"))
}

fn ninja_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\[(\d+)/(\d+)\]").expect("Invalid regex"))
}

/// Per-command progress state
///
/// A policy is moved into the command runner for one invocation and dropped
/// with it. Regressions reported by the tool are forwarded unchanged.
#[derive(Debug, Clone)]
pub struct Policy {
    dialect: Dialect,
    current_progress: f64,
}

impl Policy {
    /// Fresh policy at 0%
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect, current_progress: 0.0 }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn current_progress(&self) -> f64 {
        self.current_progress
    }

    /// Consume one event and return the update to forward, if any
    pub fn process(&mut self, event: ProgressEvent) -> Option<PolicyUpdate> {
        if event.is_status() {
            return Some(PolicyUpdate { progress: self.current_progress, event });
        }

        let progress = self.dialect.parse(&event.text, self.current_progress)?;
        self.current_progress = progress;
        Some(PolicyUpdate { progress, event })
    }
}
