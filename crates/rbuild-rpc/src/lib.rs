//! Message-broker front end for the rbuild pipeline
//!
//! Workers consume build requests from a direct exchange under the routing
//! key `<platform>_<arch>` and stream status envelopes back to the
//! requester's reply queue, finishing with exactly one response.

pub mod amqp;
pub mod broker;
pub mod client;
pub mod envelope;
pub mod error;
pub mod reconnect;
pub mod server;
pub mod shutdown;

pub use amqp::AmqpBroker;
pub use broker::{Broker, BrokerChannel, BrokerConnection, DeliveryStream};
pub use client::{BuildReply, BuildRequest, BuildRpcClient};
pub use envelope::{
    EnvelopeKind, InboundMessage, OutboundMessage, RequestPayload, ResponsePayload, RpcEnvelope,
    StatusPayload,
};
pub use error::{Result, RpcError};
pub use reconnect::ReconnectPolicy;
pub use server::{BuildRpcServer, ConnectionState};
pub use shutdown::{setup_signal_handlers, ShutdownManager, ShutdownReason, ShutdownSignal};
