//! Build command implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use rbuild_build::{render_updates, BuildOptions, BuildPipeline, Orchestrator, ProgressUIFactory};
use rbuild_core::{BuildRecord, BuildSystemKind, Catalog};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::load_config;

/// Build command implementation
pub struct BuildCommand {
    pub config_path: PathBuf,
    pub project_root: PathBuf,
    pub branding_file: Option<PathBuf>,
    pub platform: Option<String>,
    pub arch: Option<String>,
    pub build_system: Option<String>,
    pub packages: Vec<String>,
    pub output: Option<PathBuf>,
}

impl BuildCommand {
    pub async fn execute(&self) -> Result<()> {
        info!("Starting local build of {}", self.project_root.display());

        let config = load_config(&self.config_path)?;

        let platform =
            self.platform.clone().unwrap_or_else(|| Catalog::host_platform().to_string());
        let arch = self.arch.clone().unwrap_or_else(|| Catalog::host_architecture().to_string());

        let build_system = match &self.build_system {
            Some(name) => name.parse::<BuildSystemKind>().context("Invalid --build-system")?,
            None => config.project.build_system,
        };

        let branding_options = match &self.branding_file {
            Some(path) => read_branding_file(path)?,
            None => Vec::new(),
        };

        let build_dir = self.output.clone().unwrap_or_else(|| {
            config.project.build_root.join(format!("build_{platform}_{arch}"))
        });
        info!("Build directory: {}", build_dir.display());

        let options = BuildOptions::new(platform, arch, build_dir)
            .with_build_system(build_system)
            .with_branding_options(branding_options)
            .with_package_types(self.packages.clone());

        let orchestrator = Orchestrator::new(config, Arc::new(Catalog::standard()))
            .with_project_root(self.project_root.clone());

        let ui = ProgressUIFactory::create(true);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut record = BuildRecord::new(options.op_id.clone());
        record.start();

        let (result, ()) =
            tokio::join!(orchestrator.build(&options, tx), render_updates(rx, ui.as_ref()));

        match result {
            Ok(artifacts) => {
                ui.finish("Build completed");
                for artifact in &artifacts {
                    println!("{}", artifact.display());
                }
                record.succeed(artifacts);
                info!("Build finished in {:.1}s", record.duration_secs);
                debug!("Build record: {:?}", record);
                Ok(())
            }
            Err(e) => {
                ui.abandon(&format!("Build failed: {e}"));
                record.fail(e.to_string());
                debug!("Build record: {:?}", record);
                Err(e).context("Build failed")
            }
        }
    }
}

/// Read generator arguments, one per non-empty line
fn read_branding_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read branding file {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
