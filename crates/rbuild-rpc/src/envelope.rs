//! Wire format of build requests, status updates and responses
//!
//! Every message is JSON with content type `application/json`. Status and
//! response messages carry a `type` header and the request's correlation id.

use std::fmt;
use std::str::FromStr;

use rbuild_core::BuildJob;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RpcError};

/// Content type of every message
pub const CONTENT_TYPE: &str = "application/json";

/// Header naming the envelope kind
pub const TYPE_HEADER: &str = "type";

/// Kind of a reply envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// Progress notification, fire-and-forget
    Status,
    /// Terminal result, exactly one per request
    Response,
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvelopeKind {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "status" => Ok(Self::Status),
            "response" => Ok(Self::Response),
            other => Err(RpcError::invalid_payload(format!("unknown envelope type {other:?}"))),
        }
    }
}

/// Body of a status envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub progress: f64,
    pub status: String,
}

/// Body of a response envelope: `{"body": ...}` or `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    Body(Value),
    Error(String),
}

impl ResponsePayload {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Convert into a result, mapping the error text to a broker error
    pub fn into_result(self) -> Result<Value> {
        match self {
            Self::Body(body) => Ok(body),
            Self::Error(message) => Err(RpcError::broker(message)),
        }
    }
}

/// Body of a build request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Generator arguments as one shell-quoted string
    #[serde(default)]
    pub branding_variables: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,

    /// Single package generator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,

    /// Opaque hand-off destination
    #[serde(default)]
    pub destination: String,
}

impl RequestPayload {
    /// Decode a request body
    pub fn decode(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(RpcError::invalid_payload)
    }

    /// Build the job, filling platform and arch from the worker when absent
    pub fn into_job(self, op_id: &str, worker_platform: &str, worker_arch: &str) -> Result<BuildJob> {
        let branding_options = shlex::split(&self.branding_variables).ok_or_else(|| {
            RpcError::invalid_payload(format!(
                "unbalanced quoting in branding variables: {}",
                self.branding_variables
            ))
        })?;

        let platform = self.platform.unwrap_or_else(|| worker_platform.to_string());
        let arch = self.arch.unwrap_or_else(|| worker_arch.to_string());

        let job = BuildJob::new(op_id, platform, arch, self.destination)
            .with_branding_options(branding_options)
            .with_package_types(self.package_type);
        job.validate().map_err(RpcError::invalid_payload)?;
        Ok(job)
    }
}

/// A message received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Tag used to acknowledge the delivery
    pub delivery_tag: u64,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    /// Value of the `type` header, if it names a known kind
    pub kind: Option<EnvelopeKind>,
    pub body: Vec<u8>,
}

/// A message to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Exchange, empty for the default exchange
    pub exchange: String,
    pub routing_key: String,
    pub correlation_id: String,
    pub reply_to: Option<String>,
    pub kind: Option<EnvelopeKind>,
    pub body: Vec<u8>,
}

impl OutboundMessage {
    /// A build request for the worker behind `routing_key`
    pub fn request(
        exchange: &str,
        routing_key: &str,
        correlation_id: &str,
        reply_to: &str,
        payload: &RequestPayload,
    ) -> Result<Self> {
        Ok(Self {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            correlation_id: correlation_id.to_string(),
            reply_to: Some(reply_to.to_string()),
            kind: None,
            body: serde_json::to_vec(payload)?,
        })
    }
}

/// A reply sent back to the requester through the default exchange
#[derive(Debug, Clone, PartialEq)]
pub struct RpcEnvelope {
    pub correlation_id: String,
    /// Reply queue of the requester
    pub routing_key: String,
    pub kind: EnvelopeKind,
    pub payload: Value,
}

impl RpcEnvelope {
    /// Status envelope; progress is rounded to one decimal
    pub fn status(
        correlation_id: &str,
        routing_key: &str,
        progress: f64,
        status: impl Into<String>,
    ) -> Result<Self> {
        let payload = StatusPayload { progress: round_progress(progress), status: status.into() };
        Ok(Self {
            correlation_id: correlation_id.to_string(),
            routing_key: routing_key.to_string(),
            kind: EnvelopeKind::Status,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Response envelope
    pub fn response(
        correlation_id: &str,
        routing_key: &str,
        response: &ResponsePayload,
    ) -> Result<Self> {
        Ok(Self {
            correlation_id: correlation_id.to_string(),
            routing_key: routing_key.to_string(),
            kind: EnvelopeKind::Response,
            payload: serde_json::to_value(response)?,
        })
    }

    /// Recover an envelope from a received message
    pub fn from_inbound(message: &InboundMessage) -> Result<Self> {
        let kind = message
            .kind
            .ok_or_else(|| RpcError::invalid_payload("message has no type header"))?;
        Ok(Self {
            correlation_id: message.correlation_id.clone().unwrap_or_default(),
            routing_key: String::new(),
            kind,
            payload: serde_json::from_slice(&message.body)?,
        })
    }

    /// Decode the payload of a status envelope
    pub fn status_payload(&self) -> Result<StatusPayload> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Decode the payload of a response envelope
    pub fn response_payload(&self) -> Result<ResponsePayload> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Message publishing this envelope on the default exchange
    pub fn into_outbound(self) -> Result<OutboundMessage> {
        Ok(OutboundMessage {
            exchange: String::new(),
            routing_key: self.routing_key,
            correlation_id: self.correlation_id,
            reply_to: None,
            kind: Some(self.kind),
            body: serde_json::to_vec(&self.payload)?,
        })
    }
}

/// Round progress to one decimal place
pub fn round_progress(progress: f64) -> f64 {
    (progress * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_into_job() {
        let payload = RequestPayload::decode(
            br#"{"branding_variables": "-DBRAND='Acme Corp' -DVERSION=2", "platform": "linux",
                 "arch": "x86_64", "package_type": "DEB", "destination": "/tmp"}"#,
        )
        .unwrap();

        let job = payload.into_job("abc", "windows", "i386").unwrap();
        assert_eq!(job.op_id, "abc");
        assert_eq!(job.routing_key(), "linux_x86_64");
        assert_eq!(job.branding_options, vec!["-DBRAND=Acme Corp", "-DVERSION=2"]);
        assert_eq!(job.package_types, vec!["DEB"]);
        assert_eq!(job.destination, "/tmp");
    }

    #[test]
    fn test_request_defaults_to_worker_target() {
        let job = RequestPayload::decode(br#"{"destination": "/srv"}"#)
            .unwrap()
            .into_job("op", "linux", "x86_64")
            .unwrap();
        assert_eq!(job.routing_key(), "linux_x86_64");
        assert!(job.branding_options.is_empty());
        assert!(job.package_types.is_empty());
    }

    #[test]
    fn test_invalid_requests() {
        assert!(matches!(RequestPayload::decode(b"not json"), Err(RpcError::InvalidPayload { .. })));

        let unbalanced = RequestPayload { branding_variables: "-DX='open".into(), ..Default::default() };
        assert!(matches!(
            unbalanced.into_job("op", "linux", "x86_64"),
            Err(RpcError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_request_names_must_stay_in_build_root() {
        let escaping_op = RequestPayload::default().into_job("x/../../victim", "linux", "x86_64");
        match escaping_op {
            Err(err @ RpcError::InvalidPayload { .. }) => {
                assert!(err.to_string().contains("invalid op_id"), "{err}")
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let hidden_arch = RequestPayload { arch: Some("..".into()), ..Default::default() };
        assert!(matches!(
            hidden_arch.into_job("op", "linux", "x86_64"),
            Err(RpcError::InvalidPayload { .. })
        ));

        let nested_platform = RequestPayload { platform: Some("linux/x".into()), ..Default::default() };
        assert!(matches!(
            nested_platform.into_job("op", "linux", "x86_64"),
            Err(RpcError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_response_wire_format() {
        let body = ResponsePayload::Body(json!({"path": "/tmp/app.deb"}));
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"body": {"path": "/tmp/app.deb"}}));

        let error = ResponsePayload::Error("invalid platform: plan9".into());
        assert_eq!(serde_json::to_value(&error).unwrap(), json!({"error": "invalid platform: plan9"}));

        let decoded: ResponsePayload = serde_json::from_str(r#"{"error": "boom"}"#).unwrap();
        assert!(decoded.is_error());
    }

    #[test]
    fn test_status_envelope() {
        let envelope = RpcEnvelope::status("abc", "amq.gen-1", 33.349, "Build project").unwrap();
        assert_eq!(envelope.payload, json!({"progress": 33.3, "status": "Build project"}));

        let outbound = envelope.into_outbound().unwrap();
        assert_eq!(outbound.exchange, "");
        assert_eq!(outbound.routing_key, "amq.gen-1");
        assert_eq!(outbound.kind, Some(EnvelopeKind::Status));
    }

    #[test]
    fn test_envelope_from_inbound() {
        let message = InboundMessage {
            delivery_tag: 1,
            correlation_id: Some("abc".into()),
            reply_to: None,
            kind: Some(EnvelopeKind::Response),
            body: br#"{"body": 1}"#.to_vec(),
        };
        let envelope = RpcEnvelope::from_inbound(&message).unwrap();
        assert_eq!(envelope.response_payload().unwrap(), ResponsePayload::Body(json!(1)));

        let untyped = InboundMessage { kind: None, ..message };
        assert!(RpcEnvelope::from_inbound(&untyped).is_err());
    }

    #[test]
    fn test_round_progress() {
        assert_eq!(round_progress(50.04), 50.0);
        assert_eq!(round_progress(79.0), 79.0);
        assert_eq!(round_progress(21.58), 21.6);
    }
}
