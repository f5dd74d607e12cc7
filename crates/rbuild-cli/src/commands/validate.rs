//! Validate command implementation

use std::path::PathBuf;

use color_eyre::eyre::{eyre, Result};
use rbuild_core::Catalog;
use tracing::{error, info, warn};

use super::load_config;

/// Validate command implementation
pub struct ValidateCommand {
    config_path: PathBuf,
}

impl ValidateCommand {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub async fn execute(&self) -> Result<()> {
        info!("Validating configuration and toolchain");

        let config = load_config(&self.config_path)?;
        println!("✓ Configuration loaded successfully");
        println!(
            "  Broker: {}:{} (exchange {})",
            config.broker.host, config.broker.port, config.broker.exchange
        );

        // Check the project root
        let root = &config.project.root;
        if !root.is_dir() {
            error!("Project root does not exist: {}", root.display());
            return Err(eyre!("Project root does not exist"));
        }
        if root.join("CMakeLists.txt").is_file() {
            println!("✓ Project root: {}", root.display());
        } else {
            warn!("No CMakeLists.txt in project root {}", root.display());
        }

        // Check the toolchain programs
        let selected = config.build_system(config.project.build_system);
        let mut required = vec![config.toolchain.cmake.as_str(), config.toolchain.cpack.as_str()];
        required.extend(selected.command_line.first().map(String::as_str));

        let mut missing = Vec::new();
        for program in required {
            match which::which(program) {
                Ok(path) => println!("✓ {} found at {}", program, path.display()),
                Err(e) => {
                    error!("{} not found: {}", program, e);
                    missing.push(program.to_string());
                }
            }
        }
        if !missing.is_empty() {
            return Err(eyre!("Missing toolchain programs: {}", missing.join(", ")));
        }

        // Check the host can be served
        let catalog = Catalog::standard();
        let host = Catalog::host_platform();
        match catalog.lookup(host).and_then(|p| p.architecture(Catalog::host_architecture())) {
            Ok(arch) => println!(
                "✓ Host target {}/{} installs to {}",
                host,
                arch.name,
                arch.default_install_prefix.display()
            ),
            Err(e) => warn!("Host cannot build for itself: {}", e),
        }

        println!("\n✓ All validation checks passed!");
        Ok(())
    }
}
