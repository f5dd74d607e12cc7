//! Progress-observable build pipeline for rbuild
//!
//! Turns the output of the generator, build driver and packager into a
//! single overall progress stream while driving a project from configure
//! to packaged artifacts.

pub mod artifact;
pub mod compositor;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod progress_ui;
pub mod runner;

pub use artifact::{handoff_from_config, ArtifactHandoff, CopyHandoff, KeepHandoff};
pub use compositor::{ProgressRange, RangeCompositor, StatusUpdate};
pub use context::{BuildContext, BuildStage};
pub use error::{BuildError, Result};
pub use orchestrator::{BuildDirGuard, BuildOptions, BuildPipeline, Orchestrator};
pub use progress::{Dialect, EventKind, Policy, PolicyUpdate, ProgressEvent};
pub use progress_ui::{
    render_updates, IndicatifProgressUI, LineProgressUI, NoOpProgressUI, ProgressUI,
    ProgressUIFactory,
};
pub use runner::CommandRunner;
