//! Broker abstraction
//!
//! The service and the client only talk to the broker through these traits,
//! so the AMQP implementation can be swapped for an in-memory one.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::envelope::{InboundMessage, OutboundMessage};
use crate::error::Result;

/// Stream of deliveries from one consumer; ends when the broker cancels it
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<InboundMessage>> + Send>>;

/// Factory for broker connections
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a new connection
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>>;
}

/// One open broker connection
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Open a channel on this connection
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// One channel of a broker connection
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare a direct exchange
    async fn declare_exchange(&self, name: &str) -> Result<()>;

    /// Declare a queue and return its name; an empty name asks the broker to pick one
    async fn declare_queue(&self, name: &str, exclusive: bool) -> Result<String>;

    /// Bind `queue` to `exchange` under `routing_key`
    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    /// Limit unacknowledged deliveries
    async fn set_prefetch(&self, count: u16) -> Result<()>;

    /// Start consuming `queue`; with `auto_ack` deliveries need no acknowledgement
    async fn consume(&self, queue: &str, auto_ack: bool) -> Result<DeliveryStream>;

    /// Publish a message
    async fn publish(&self, message: OutboundMessage) -> Result<()>;

    /// Acknowledge a delivery
    async fn ack(&self, delivery_tag: u64) -> Result<()>;

    /// Close the channel
    async fn close(&self) -> Result<()>;
}
