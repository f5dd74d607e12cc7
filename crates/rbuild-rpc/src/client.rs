//! Client side of the build RPC

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rbuild_config::Config;
use rbuild_core::routing_key;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{Broker, BrokerChannel, BrokerConnection, DeliveryStream};
use crate::envelope::{
    EnvelopeKind, OutboundMessage, RequestPayload, ResponsePayload, RpcEnvelope, StatusPayload,
};
use crate::error::{Result, RpcError};

/// A build request as issued by a caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    /// Correlation id; a random UUID when unset
    pub op_id: Option<String>,
    pub platform: String,
    pub arch: String,
    /// Generator arguments as one shell-quoted string
    pub branding_variables: String,
    pub package_type: Option<String>,
    pub destination: String,
}

impl BuildRequest {
    pub fn new(platform: impl Into<String>, arch: impl Into<String>) -> Self {
        Self { platform: platform.into(), arch: arch.into(), ..Self::default() }
    }

    pub fn with_op_id(mut self, op_id: impl Into<String>) -> Self {
        self.op_id = Some(op_id.into());
        self
    }

    pub fn with_branding_variables(mut self, branding: impl Into<String>) -> Self {
        self.branding_variables = branding.into();
        self
    }

    pub fn with_package_type(mut self, package_type: impl Into<String>) -> Self {
        self.package_type = Some(package_type.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Routing key of the worker that serves this request
    pub fn routing_key(&self) -> String {
        routing_key(&self.platform, &self.arch)
    }

    fn payload(&self) -> RequestPayload {
        RequestPayload {
            branding_variables: self.branding_variables.clone(),
            platform: Some(self.platform.clone()),
            arch: Some(self.arch.clone()),
            package_type: self.package_type.clone(),
            destination: self.destination.clone(),
        }
    }
}

/// Outcome of a request
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReply {
    /// Correlation id the request was sent with
    pub op_id: String,
    pub response: ResponsePayload,
}

impl BuildReply {
    /// The response body, or the worker's error as [`RpcError::Broker`]
    pub fn into_result(self) -> Result<Value> {
        self.response.into_result()
    }
}

/// Sends build requests and waits for their responses
pub struct BuildRpcClient {
    broker: Arc<dyn Broker>,
    exchange: String,
    timeout: Option<Duration>,
}

impl BuildRpcClient {
    pub fn new(config: &Config, broker: Arc<dyn Broker>) -> Self {
        Self { broker, exchange: config.broker.exchange.clone(), timeout: config.client.timeout() }
    }

    /// Override the response timeout; `None` waits forever
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `request` and wait for its response
    ///
    /// Status updates for the request are forwarded to `statuses` while
    /// waiting. Messages for other correlation ids are ignored.
    pub async fn request(
        &self,
        request: &BuildRequest,
        statuses: Option<UnboundedSender<StatusPayload>>,
    ) -> Result<BuildReply> {
        let op_id = request.op_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        let connection = self.broker.connect().await?;
        let channel = connection.open_channel().await?;
        let result = self.exchange_messages(channel.as_ref(), request, &op_id, statuses).await;

        close_quietly(connection.as_ref(), channel.as_ref()).await;
        let response = result?;
        Ok(BuildReply { op_id, response })
    }

    async fn exchange_messages(
        &self,
        channel: &dyn BrokerChannel,
        request: &BuildRequest,
        op_id: &str,
        statuses: Option<UnboundedSender<StatusPayload>>,
    ) -> Result<ResponsePayload> {
        channel.declare_exchange(&self.exchange).await?;
        let reply_queue = channel.declare_queue("", true).await?;
        let replies = channel.consume(&reply_queue, true).await?;

        let routing_key = request.routing_key();
        let message = OutboundMessage::request(
            &self.exchange,
            &routing_key,
            op_id,
            &reply_queue,
            &request.payload(),
        )?;
        channel.publish(message).await?;
        info!("Sent build request {} to {}", op_id, routing_key);

        let wait = wait_for_response(replies, op_id, statuses);
        match self.timeout {
            Some(timeout) => {
                tokio::time::timeout(timeout, wait).await.map_err(|_| RpcError::Timeout(timeout))?
            }
            None => wait.await,
        }
    }
}

async fn wait_for_response(
    mut replies: DeliveryStream,
    op_id: &str,
    statuses: Option<UnboundedSender<StatusPayload>>,
) -> Result<ResponsePayload> {
    while let Some(message) = replies.next().await {
        let message = message?;
        if message.correlation_id.as_deref() != Some(op_id) {
            debug!("Ignoring reply for {:?}", message.correlation_id);
            continue;
        }

        let envelope = match RpcEnvelope::from_inbound(&message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring malformed reply for {}: {}", op_id, e);
                continue;
            }
        };

        match envelope.kind {
            EnvelopeKind::Status => match envelope.status_payload() {
                Ok(status) => {
                    debug!("{:.1}% {}", status.progress, status.status);
                    if let Some(statuses) = &statuses {
                        let _ = statuses.send(status);
                    }
                }
                Err(e) => warn!("Ignoring malformed status for {}: {}", op_id, e),
            },
            EnvelopeKind::Response => return envelope.response_payload(),
        }
    }

    Err(RpcError::ConnectionClosed)
}

async fn close_quietly(connection: &dyn BrokerConnection, channel: &dyn BrokerChannel) {
    if let Err(e) = channel.close().await {
        debug!("Closing channel failed: {}", e);
    }
    if let Err(e) = connection.close().await {
        debug!("Closing connection failed: {}", e);
    }
}
