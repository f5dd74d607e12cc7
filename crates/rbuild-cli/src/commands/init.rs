//! Init command implementation

use std::path::PathBuf;

use color_eyre::eyre::{Context, Result};
use rbuild_config::Config;
use serde_yaml::{Mapping, Value};
use tracing::info;

/// Init command implementation
pub struct InitCommand {
    output_path: PathBuf,
    force: bool,
}

impl InitCommand {
    pub fn new(output_path: PathBuf, force: bool) -> Self {
        Self { output_path, force }
    }

    pub async fn execute(&self) -> Result<()> {
        info!("Initializing configuration file at {}", self.output_path.display());

        // Check if file already exists
        if self.output_path.exists() && !self.force {
            return Err(color_eyre::eyre::eyre!(
                "Configuration file already exists: {}. Use --force to overwrite.",
                self.output_path.display()
            ));
        }

        let yaml_content = Self::render_default_config()?;
        std::fs::write(&self.output_path, yaml_content)
            .with_context(|| format!("Failed to write config to {}", self.output_path.display()))?;

        println!("✓ Created configuration file: {}", self.output_path.display());
        println!("\nNext steps:");
        println!("1. Point project.root at the directory holding your CMakeLists.txt");
        println!(
            "2. Run 'rbuild validate -c {}' to check the toolchain",
            self.output_path.display()
        );
        println!("3. Run 'rbuild serve -c {}' to start a worker", self.output_path.display());

        Ok(())
    }

    /// Default configuration, one commented section per top-level key
    fn render_default_config() -> Result<String> {
        let config = Config::default();
        let sections = [
            ("Message broker connection", "broker", serde_yaml::to_value(&config.broker)?),
            (
                "Project being built and where builds happen",
                "project",
                serde_yaml::to_value(&config.project)?,
            ),
            ("Native toolchain programs", "toolchain", serde_yaml::to_value(&config.toolchain)?),
            (
                "Request client; timeout_secs: null waits forever",
                "client",
                serde_yaml::to_value(&config.client)?,
            ),
            (
                "What happens to a finished package: copy or keep",
                "handoff",
                serde_yaml::to_value(&config.handoff)?,
            ),
        ];

        let mut content = String::from(
            "# rbuild configuration\n# Values may reference environment variables as ${VAR} or $VAR\n",
        );
        for (comment, key, value) in sections {
            let mut section = Mapping::new();
            section.insert(Value::from(key), value);

            content.push_str(&format!("\n# {comment}\n"));
            content.push_str(&serde_yaml::to_string(&section)?);
        }
        Ok(content)
    }
}
