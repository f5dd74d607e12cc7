//! CLI command implementations

use std::path::Path;

use color_eyre::eyre::{Context, Result};
use rbuild_config::Config;
use tracing::debug;

pub mod build;
pub mod clean;
pub mod init;
pub mod request;
pub mod serve;
pub mod validate;

pub use build::BuildCommand;
pub use clean::CleanCommand;
pub use init::InitCommand;
pub use request::RequestCommand;
pub use serve::ServeCommand;
pub use validate::ValidateCommand;

/// Load the configuration file, using defaults when it does not exist
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!("No configuration at {}, using defaults", path.display());
    }
    Config::load_or_default(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
