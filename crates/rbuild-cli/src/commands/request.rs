//! Request command implementation

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{eyre, Context, Result};
use rbuild_build::{ProgressUIFactory, StatusUpdate};
use rbuild_rpc::{AmqpBroker, BuildRequest, BuildRpcClient, ResponsePayload, StatusPayload};
use tokio::sync::mpsc;
use tracing::info;

use super::load_config;

/// Request command implementation
pub struct RequestCommand {
    pub config_path: PathBuf,
    pub op_id: Option<String>,
    pub platform: String,
    pub arch: String,
    pub branding: String,
    pub package_type: Option<String>,
    pub destination: String,
    pub timeout: Option<u64>,
}

impl RequestCommand {
    fn build_request(&self) -> BuildRequest {
        let mut request = BuildRequest::new(&self.platform, &self.arch)
            .with_branding_variables(&self.branding)
            .with_destination(&self.destination);
        if let Some(op_id) = &self.op_id {
            request = request.with_op_id(op_id);
        }
        if let Some(package_type) = &self.package_type {
            request = request.with_package_type(package_type);
        }
        request
    }

    pub async fn execute(&self) -> Result<()> {
        let config = load_config(&self.config_path)?;
        let broker = Arc::new(AmqpBroker::new(&config.broker));

        let mut client = BuildRpcClient::new(&config, broker);
        if let Some(secs) = self.timeout {
            client = client.with_timeout(Some(Duration::from_secs(secs)));
        }

        let request = self.build_request();
        info!("Requesting build from {}", request.routing_key());

        let ui = ProgressUIFactory::create(true);
        let (tx, mut rx) = mpsc::unbounded_channel::<StatusPayload>();
        let show = async {
            while let Some(status) = rx.recv().await {
                ui.update(&StatusUpdate::new(status.progress, status.status));
            }
        };
        let (reply, ()) = tokio::join!(client.request(&request, Some(tx)), show);

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                ui.abandon(&format!("Request failed: {e}"));
                return Err(e).context("Build request failed");
            }
        };

        match reply.response {
            ResponsePayload::Body(body) => {
                ui.finish(&format!("Build {} completed", reply.op_id));
                println!("{}", serde_json::to_string_pretty(&body)?);
                Ok(())
            }
            ResponsePayload::Error(message) => {
                ui.abandon(&format!("Build {} failed", reply.op_id));
                Err(eyre!("Build {} failed: {}", reply.op_id, message))
            }
        }
    }
}
