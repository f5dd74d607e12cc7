//! Broker-facing build service
//!
//! One task drives the connection state machine:
//!
//! ```text
//! Disconnected -> Connecting -> OpeningChannel -> DeclaringTopology -> Consuming
//!      ^              ^                                                   |
//!      |              +------------------ Reconnecting <------------------+
//!      +------------------------------- Closing <-------------------------+
//! ```
//!
//! Requests are handled one at a time inside the consume loop. With a
//! prefetch of one the broker holds the next request back until the current
//! one is acknowledged, which happens only after its response is published.
//! Delivery is therefore at-least-once: a worker that dies mid-build has the
//! request redelivered and rebuilt.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rbuild_build::{ArtifactHandoff, BuildError, BuildOptions, BuildPipeline, ProgressRange};
use rbuild_config::Config;
use rbuild_core::{routing_key, BuildRecord, BuildSystemKind};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::{Broker, BrokerChannel, BrokerConnection};
use crate::envelope::{InboundMessage, RequestPayload, ResponsePayload, RpcEnvelope};
use crate::error::{Result, RpcError};
use crate::reconnect::ReconnectPolicy;
use crate::shutdown::ShutdownManager;

/// Slice of the overall progress given to the pipeline itself
const PIPELINE_RANGE: (f64, f64) = (21.0, 79.0);

/// State of the broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    OpeningChannel,
    DeclaringTopology,
    Consuming,
    Closing,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::OpeningChannel => "opening-channel",
            Self::DeclaringTopology => "declaring-topology",
            Self::Consuming => "consuming",
            Self::Closing => "closing",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Why a consuming session ended
enum SessionEnd {
    Shutdown,
    Cancelled,
}

/// Build worker bound to one platform/architecture routing key
pub struct BuildRpcServer {
    broker: Arc<dyn Broker>,
    pipeline: Arc<dyn BuildPipeline>,
    handoff: Arc<dyn ArtifactHandoff>,
    shutdown: Arc<ShutdownManager>,
    platform: String,
    arch: String,
    routing_key: String,
    exchange: String,
    prefetch: u16,
    reconnect_delay: Duration,
    build_root: PathBuf,
    build_system: BuildSystemKind,
    state: watch::Sender<ConnectionState>,
}

impl BuildRpcServer {
    /// Create a worker for `platform`/`arch`
    pub fn new(
        config: &Config,
        broker: Arc<dyn Broker>,
        pipeline: Arc<dyn BuildPipeline>,
        handoff: Arc<dyn ArtifactHandoff>,
        platform: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        let platform = platform.into();
        let arch = arch.into();
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            broker,
            pipeline,
            handoff,
            shutdown: Arc::new(ShutdownManager::new()),
            routing_key: routing_key(&platform, &arch),
            platform,
            arch,
            exchange: config.broker.exchange.clone(),
            prefetch: config.broker.prefetch,
            reconnect_delay: config.broker.reconnect_delay(),
            build_root: config.project.build_root.clone(),
            build_system: config.project.build_system,
            state,
        }
    }

    /// Use an externally owned shutdown manager
    pub fn with_shutdown(mut self, shutdown: Arc<ShutdownManager>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Override the reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn shutdown_manager(&self) -> Arc<ShutdownManager> {
        Arc::clone(&self.shutdown)
    }

    /// Observe connection state changes
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Connection state {} -> {}", previous, state);
        }
    }

    /// Serve requests until shutdown is requested
    pub async fn run(&self) -> Result<()> {
        info!("Build server for {} started", self.routing_key);
        let mut reconnect = ReconnectPolicy::new(self.reconnect_delay);

        while !self.shutdown.is_shutdown_requested() {
            match self.session(&mut reconnect).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Cancelled) => warn!("Consumer cancelled by broker"),
                Err(e) => warn!("Broker session for {} failed: {}", self.routing_key, e),
            }

            if self.shutdown.is_shutdown_requested() {
                break;
            }

            self.set_state(ConnectionState::Reconnecting);
            let delay = reconnect.next_delay();
            info!("Reconnecting in {:?} (attempt {})", delay, reconnect.attempts());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        self.set_state(ConnectionState::Closing);
        self.set_state(ConnectionState::Disconnected);
        info!("Build server for {} stopped", self.routing_key);
        Ok(())
    }

    /// One connection lifetime, from connecting to losing or closing it
    async fn session(&self, reconnect: &mut ReconnectPolicy) -> Result<SessionEnd> {
        self.set_state(ConnectionState::Connecting);
        let connection = tokio::select! {
            connection = self.broker.connect() => connection?,
            _ = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
        };

        self.set_state(ConnectionState::OpeningChannel);
        let channel = match connection.open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                close_quietly(connection.as_ref(), None).await;
                return Err(e);
            }
        };

        let result = self.consume(channel.as_ref(), reconnect).await;
        close_quietly(connection.as_ref(), Some(channel.as_ref())).await;
        result
    }

    async fn consume(
        &self,
        channel: &dyn BrokerChannel,
        reconnect: &mut ReconnectPolicy,
    ) -> Result<SessionEnd> {
        self.set_state(ConnectionState::DeclaringTopology);
        channel.declare_exchange(&self.exchange).await?;
        let queue = channel.declare_queue(&self.routing_key, false).await?;
        channel.bind_queue(&queue, &self.exchange, &self.routing_key).await?;
        channel.set_prefetch(self.prefetch).await?;
        let mut deliveries = channel.consume(&queue, false).await?;

        self.set_state(ConnectionState::Consuming);
        reconnect.reset();
        info!("Awaiting RPC build requests on {}", queue);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.set_state(ConnectionState::Closing);
                    return Ok(SessionEnd::Shutdown);
                }
                delivery = deliveries.next() => match delivery {
                    Some(Ok(message)) => self.handle_delivery(channel, message).await?,
                    Some(Err(e)) => return Err(e),
                    None => return Ok(SessionEnd::Cancelled),
                },
            }
        }
    }

    /// Answer one request and acknowledge it
    async fn handle_delivery(&self, channel: &dyn BrokerChannel, message: InboundMessage) -> Result<()> {
        let Some(reply_to) = message.reply_to.clone().filter(|r| !r.is_empty()) else {
            warn!("Dropping request without reply_to (delivery {})", message.delivery_tag);
            return channel.ack(message.delivery_tag).await;
        };

        let op_id = match message.correlation_id.clone().filter(|id| !id.is_empty()) {
            Some(op_id) => op_id,
            None => {
                let op_id = Uuid::new_v4().to_string();
                warn!("Request without correlation id, using {}", op_id);
                op_id
            }
        };

        let publisher = StatusPublisher { channel, reply_to: &reply_to, correlation_id: &op_id };
        let mut record = BuildRecord::new(op_id.clone());
        record.start();

        publisher.status(0.0, "Prepare to build package").await;
        info!("Build started for: {}, platform: {}", op_id, self.routing_key);

        let response = match self.build_package(&publisher, &op_id, &message.body).await {
            Ok(body) => {
                info!("Build finished for: {}, platform: {}, response: {}", op_id, self.routing_key, body);
                record.succeed(Vec::new());
                ResponsePayload::Body(body)
            }
            Err(e) => {
                error!("Build finished for: {}, platform: {}, error: {}", op_id, self.routing_key, e);
                record.fail(e.to_string());
                ResponsePayload::Error(e.to_string())
            }
        };
        debug!("Build {} took {:.1}s", op_id, record.duration_secs);

        publisher.status(100.0, "Completed").await;
        publisher.response(&response).await;
        channel.ack(message.delivery_tag).await
    }

    async fn build_package(
        &self,
        publisher: &StatusPublisher<'_>,
        op_id: &str,
        body: &[u8],
    ) -> Result<Value> {
        let job = RequestPayload::decode(body)?.into_job(op_id, &self.platform, &self.arch)?;
        if !job.platform.eq_ignore_ascii_case(&self.platform)
            || !job.arch.eq_ignore_ascii_case(&self.arch)
        {
            return Err(RpcError::invalid_payload(format!(
                "request for {} delivered to worker {}",
                job.routing_key(),
                self.routing_key
            )));
        }

        publisher.status(20.0, "Building package").await;

        let options = BuildOptions::for_job(&job, &self.build_root, self.build_system)?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let build = self.pipeline.build(&options, tx);
        let forward = async {
            let range = ProgressRange::new(PIPELINE_RANGE.0, PIPELINE_RANGE.1);
            while let Some(update) = rx.recv().await {
                publisher.status(range.scale(update.progress), &update.message).await;
            }
        };
        let (artifacts, ()) = tokio::join!(build, forward);

        let artifacts = artifacts?;
        let artifact = artifacts
            .first()
            .ok_or_else(|| BuildError::handoff("build produced no package"))?;

        publisher.status(80.0, "Loading package to server").await;
        let result = self.handoff.post_install_step(artifact, &job.destination).await?;
        Ok(result)
    }
}

/// Publishes reply envelopes for one request
struct StatusPublisher<'a> {
    channel: &'a dyn BrokerChannel,
    reply_to: &'a str,
    correlation_id: &'a str,
}

impl StatusPublisher<'_> {
    async fn status(&self, progress: f64, message: &str) {
        debug!("{:.1}% {}", progress, message);
        let envelope = RpcEnvelope::status(self.correlation_id, self.reply_to, progress, message);
        self.publish(envelope).await;
    }

    async fn response(&self, response: &ResponsePayload) {
        let envelope = RpcEnvelope::response(self.correlation_id, self.reply_to, response);
        self.publish(envelope).await;
    }

    async fn publish(&self, envelope: Result<RpcEnvelope>) {
        let result = match envelope.and_then(RpcEnvelope::into_outbound) {
            Ok(message) => self.channel.publish(message).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Failed to publish reply for {}: {}", self.correlation_id, e);
        }
    }
}

async fn close_quietly(connection: &dyn BrokerConnection, channel: Option<&dyn BrokerChannel>) {
    if let Some(channel) = channel {
        if let Err(e) = channel.close().await {
            debug!("Closing channel failed: {}", e);
        }
    }
    if let Err(e) = connection.close().await {
        debug!("Closing connection failed: {}", e);
    }
}
