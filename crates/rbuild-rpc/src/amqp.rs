//! AMQP 0-9-1 broker backed by lapin

use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use rbuild_config::BrokerConfig;
use tracing::{debug, info};

use crate::broker::{Broker, BrokerChannel, BrokerConnection, DeliveryStream};
use crate::envelope::{EnvelopeKind, InboundMessage, OutboundMessage, CONTENT_TYPE, TYPE_HEADER};
use crate::error::{Result, RpcError};

const REPLY_SUCCESS: u16 = 200;

/// Connects to a RabbitMQ-compatible broker
#[derive(Debug, Clone)]
pub struct AmqpBroker {
    uri: String,
    host: String,
}

impl AmqpBroker {
    pub fn new(config: &BrokerConfig) -> Self {
        Self { uri: config.amqp_uri(), host: format!("{}:{}", config.host, config.port) }
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>> {
        debug!("Connecting to broker at {}", self.host);
        let connection = Connection::connect(&self.uri, ConnectionProperties::default()).await?;
        info!("Connected to broker at {}", self.host);
        Ok(Box::new(AmqpConnection { connection }))
    }
}

struct AmqpConnection {
    connection: Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>> {
        let channel = self.connection.create_channel().await?;
        Ok(Box::new(AmqpChannel { channel }))
    }

    async fn close(&self) -> Result<()> {
        if self.connection.status().connected() {
            self.connection.close(REPLY_SUCCESS, "Bye").await?;
        }
        Ok(())
    }
}

struct AmqpChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_exchange(&self, name: &str) -> Result<()> {
        self.channel
            .exchange_declare(
                name,
                ExchangeKind::Direct,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn declare_queue(&self, name: &str, exclusive: bool) -> Result<String> {
        let options = QueueDeclareOptions { exclusive, ..QueueDeclareOptions::default() };
        let queue = self.channel.queue_declare(name, options, FieldTable::default()).await?;
        Ok(queue.name().as_str().to_string())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> Result<()> {
        self.channel.basic_qos(count, BasicQosOptions::default()).await?;
        Ok(())
    }

    async fn consume(&self, queue: &str, auto_ack: bool) -> Result<DeliveryStream> {
        let options = BasicConsumeOptions { no_ack: auto_ack, ..BasicConsumeOptions::default() };
        let consumer = self
            .channel
            .basic_consume(queue, "", options, FieldTable::default())
            .await?;

        let deliveries = consumer.map(|delivery| {
            delivery.map(inbound_from_delivery).map_err(RpcError::from)
        });
        Ok(Box::pin(deliveries))
    }

    async fn publish(&self, message: OutboundMessage) -> Result<()> {
        let mut properties = BasicProperties::default()
            .with_content_type(ShortString::from(CONTENT_TYPE))
            .with_correlation_id(ShortString::from(message.correlation_id));

        if let Some(reply_to) = message.reply_to {
            properties = properties.with_reply_to(ShortString::from(reply_to));
        }

        if let Some(kind) = message.kind {
            let mut headers = FieldTable::default();
            headers.insert(
                ShortString::from(TYPE_HEADER),
                AMQPValue::LongString(LongString::from(kind.as_str())),
            );
            properties = properties.with_headers(headers);
        }

        self.channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.channel.basic_ack(delivery_tag, BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.channel.status().connected() {
            self.channel.close(REPLY_SUCCESS, "Bye").await?;
        }
        Ok(())
    }
}

fn inbound_from_delivery(delivery: Delivery) -> InboundMessage {
    let properties = &delivery.properties;
    let kind = properties
        .headers()
        .as_ref()
        .and_then(|headers| {
            headers.inner().iter().find(|(key, _)| key.as_str() == TYPE_HEADER).map(|(_, v)| v)
        })
        .and_then(|value| match value {
            AMQPValue::LongString(s) => String::from_utf8_lossy(s.as_bytes()).parse().ok(),
            AMQPValue::ShortString(s) => s.as_str().parse::<EnvelopeKind>().ok(),
            _ => None,
        });

    InboundMessage {
        delivery_tag: delivery.delivery_tag,
        correlation_id: properties.correlation_id().as_ref().map(|s| s.as_str().to_string()),
        reply_to: properties.reply_to().as_ref().map(|s| s.as_str().to_string()),
        kind,
        body: delivery.data,
    }
}
