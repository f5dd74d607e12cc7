//! Clean command implementation

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use tracing::info;
use walkdir::WalkDir;

use super::load_config;

/// Prefix of every directory the pipeline builds in
const BUILD_DIR_PREFIX: &str = "build_";

/// Clean command implementation
pub struct CleanCommand {
    config_path: PathBuf,
    dry_run: bool,
}

impl CleanCommand {
    pub fn new(config_path: PathBuf, dry_run: bool) -> Self {
        Self { config_path, dry_run }
    }

    pub async fn execute(&self) -> Result<()> {
        let config = load_config(&self.config_path)?;
        let build_root = &config.project.build_root;
        info!("Cleaning build directories under {}", build_root.display());

        if !build_root.is_dir() {
            info!("Build root does not exist, nothing to clean: {}", build_root.display());
            return Ok(());
        }

        let build_dirs = find_build_dirs(build_root)?;
        if build_dirs.is_empty() {
            println!("  No build directories found");
        }

        for dir in &build_dirs {
            if self.dry_run {
                println!("  Would remove {}", dir.display());
                continue;
            }
            std::fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to remove directory: {}", dir.display()))?;
            println!("  Removed {}", dir.display());
        }

        println!("✓ Cleanup completed");
        Ok(())
    }
}

/// Direct subdirectories of `root` named `build_*`
fn find_build_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to read {}", root.display()))?;
        let is_build_dir = entry.file_type().is_dir()
            && entry.file_name().to_str().is_some_and(|name| name.starts_with(BUILD_DIR_PREFIX));
        if is_build_dir {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}
