//! Serve command implementation

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use rbuild_build::{handoff_from_config, Orchestrator};
use rbuild_core::Catalog;
use rbuild_rpc::{setup_signal_handlers, AmqpBroker, BuildRpcServer, ShutdownManager};
use tracing::info;

use super::load_config;

/// Serve command implementation
pub struct ServeCommand {
    config_path: PathBuf,
    platform: Option<String>,
    arch: Option<String>,
}

impl ServeCommand {
    pub fn new(config_path: PathBuf, platform: Option<String>, arch: Option<String>) -> Self {
        Self { config_path, platform, arch }
    }

    pub async fn execute(&self) -> Result<()> {
        let config = load_config(&self.config_path)?;
        let catalog = Arc::new(Catalog::standard());

        let platform =
            self.platform.clone().unwrap_or_else(|| Catalog::host_platform().to_string());
        let arch = self.arch.clone().unwrap_or_else(|| Catalog::host_architecture().to_string());

        // Reject unknown targets before touching the broker
        catalog
            .lookup(&platform)
            .and_then(|p| p.architecture(&arch).map(|_| ()))
            .with_context(|| format!("Cannot serve {platform}/{arch}"))?;

        let shutdown = Arc::new(ShutdownManager::new());
        setup_signal_handlers(Arc::clone(&shutdown)).context("Failed to install signal handlers")?;

        info!("Project root: {}", config.project.root.display());
        info!("Build root: {}", config.project.build_root.display());

        let pipeline = Arc::new(Orchestrator::new(config.clone(), Arc::clone(&catalog)));
        let handoff = handoff_from_config(&config.handoff);
        let broker = Arc::new(AmqpBroker::new(&config.broker));

        let server = BuildRpcServer::new(&config, broker, pipeline, handoff, platform, arch)
            .with_shutdown(shutdown);

        println!("✓ Serving build requests for {}", server.routing_key());
        server.run().await.context("Build server failed")?;
        println!("✓ Build server stopped");

        Ok(())
    }
}
