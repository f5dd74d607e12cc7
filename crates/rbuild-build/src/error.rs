//! Error types for the build pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Build-specific error types
#[derive(Error, Debug)]
pub enum BuildError {
    /// Program could not be found on the search path
    #[error("Command not found: {program}")]
    CommandNotFound { program: String },

    /// Process ran and exited unsuccessfully
    #[error("Command `{}` failed: {}", .argv.join(" "), describe_exit(.exit_code))]
    CommandFailed { argv: Vec<String>, exit_code: Option<i32> },

    /// Process could not be started
    #[error("Failed to launch {program}: {reason}")]
    LaunchFailed { program: String, reason: String },

    /// Package metadata did not name the package file
    #[error("Package file name not found in {}", .path.display())]
    ArtifactNameNotFound { path: PathBuf },

    /// Post-install step rejected or lost the artifact
    #[error("Artifact hand-off failed: {reason}")]
    ArtifactHandoffFailed { reason: String },

    /// Project root is missing or not a directory
    #[error("Invalid project root: {}", .path.display())]
    InvalidProjectRoot { path: PathBuf },

    /// Core library error
    #[error("{0}")]
    Core(#[from] rbuild_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for build operations
pub type Result<T> = std::result::Result<T, BuildError>;

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl BuildError {
    /// Create a launch failure
    pub fn launch_failed(program: impl Into<String>, reason: impl ToString) -> Self {
        Self::LaunchFailed { program: program.into(), reason: reason.to_string() }
    }

    /// Create an artifact hand-off failure
    pub fn handoff(reason: impl ToString) -> Self {
        Self::ArtifactHandoffFailed { reason: reason.to_string() }
    }

    /// Exit code of a failed command, if it exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}
