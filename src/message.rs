//! # Wire Envelope and Message Codec
//!
//! Defines the `Message` envelope exchanged between clients, brokers, and
//! the load balancer, and its binary encoding. Every message is serialized
//! with `bincode` and terminated with the [`SENTINEL`] byte sequence so that
//! a reader accumulating bytes from a TCP stream can tell where one message
//! ends and the next begins without a length prefix.
//!
//! Enumerations are plain fieldless variants; `bincode`'s derive-backed
//! serde support encodes each as its variant ordinal, so an unrecognized
//! ordinal on the wire is a decode error rather than a silently-accepted
//! new variant.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::FramingError;

/// Byte sequence appended after every encoded message. Chosen to match the
/// legacy `EOF` convention carried by the source rather than the
/// CR-embedded alternative some clients also speak.
pub const SENTINEL: &[u8] = b"EOF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Request = 0x1,
    Response = 0x2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Operation {
    NoOp = 0x0,
    QueueCreate = 0x1,
    QueuePush = 0x2,
    QueuePop = 0x3,
    BrokerInfo = 0x4,
    RegisterClient = 0x5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    Success = 0x1,
    Error = 0x2,
}

/// Operation-specific payload.
///
/// The source's payloads are dynamically typed; this models the same set of
/// shapes as a tagged variant so the wire codec stays statically typed end
/// to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    /// No payload (e.g. a BROKER_INFO request).
    Empty,
    /// A bare string payload (a queue name, a broker id, an "OK", or a
    /// human-readable error message).
    Text(String),
    /// An opaque byte payload (a pushed/popped message value).
    Bytes(Vec<u8>),
    /// The `{id, name}` pair returned by QUEUE_CREATE.
    QueueInfo { id: String, name: String },
    /// The `{queue_name, message}` pair sent by QUEUE_PUSH.
    Push { queue_name: String, message: Vec<u8> },
    /// The `{id, address}` pair returned by a broker assignment.
    BrokerAssignment { id: String, address: String },
}

impl Body {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// The envelope carried by every request and response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender_addr: String,
    pub receiver_addr: String,
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub message_type: MessageType,
    pub operation: Operation,
    pub status: Status,
    pub body: Body,
    /// Wall-clock seconds at creation, as whole seconds since the epoch.
    pub timestamp: u64,
    pub id: String,
}

impl Message {
    /// Builds a REQUEST envelope with fresh `id`/`timestamp`.
    #[allow(clippy::too_many_arguments)]
    pub fn request(
        sender_addr: impl Into<String>,
        receiver_addr: impl Into<String>,
        sender_id: Option<String>,
        receiver_id: Option<String>,
        operation: Operation,
        body: Body,
    ) -> Self {
        Self::new(
            sender_addr,
            receiver_addr,
            sender_id,
            receiver_id,
            MessageType::Request,
            operation,
            Status::Success,
            body,
        )
    }

    /// Builds a SUCCESS RESPONSE envelope echoing `operation`.
    pub fn response_ok(
        sender_addr: impl Into<String>,
        receiver_addr: impl Into<String>,
        receiver_id: Option<String>,
        operation: Operation,
        body: Body,
    ) -> Self {
        Self::new(
            sender_addr,
            receiver_addr,
            None,
            receiver_id,
            MessageType::Response,
            operation,
            Status::Success,
            body,
        )
    }

    /// Builds an ERROR RESPONSE envelope carrying a human-readable message.
    pub fn response_error(
        sender_addr: impl Into<String>,
        receiver_addr: impl Into<String>,
        operation: Operation,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            sender_addr,
            receiver_addr,
            None,
            None,
            MessageType::Response,
            operation,
            Status::Error,
            Body::Text(reason.into()),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        sender_addr: impl Into<String>,
        receiver_addr: impl Into<String>,
        sender_id: Option<String>,
        receiver_id: Option<String>,
        message_type: MessageType,
        operation: Operation,
        status: Status,
        body: Body,
    ) -> Self {
        Self {
            sender_addr: sender_addr.into(),
            receiver_addr: receiver_addr.into(),
            sender_id,
            receiver_id,
            message_type,
            operation,
            status,
            body,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            id: Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Success
    }

    /// Serializes the envelope and appends the frame sentinel, matching the
    /// source's `Message.to_bytes` (`msgpack.packb(...) + b'EOF'`), with
    /// `bincode` standing in for the application codec.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FramingError> {
        let mut buf = bincode::serialize(self).map_err(|e| FramingError::Encode(e.to_string()))?;
        buf.extend_from_slice(SENTINEL);
        Ok(buf)
    }

    /// Decodes a frame's payload (sentinel already stripped by the framing
    /// layer). Unknown enum discriminants fail to deserialize and surface as
    /// [`FramingError::InvalidMessageStructure`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, FramingError> {
        bincode::deserialize(data).map_err(|_| FramingError::InvalidMessageStructure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let msg = Message::request(
            "127.0.0.1:1:1",
            "127.0.0.1:2",
            Some("client-1".to_string()),
            None,
            Operation::QueuePush,
            Body::Push {
                queue_name: "orders".to_string(),
                message: b"hello".to_vec(),
            },
        );

        let encoded = msg.to_bytes().unwrap();
        assert!(encoded.ends_with(SENTINEL));

        let payload = &encoded[..encoded.len() - SENTINEL.len()];
        let decoded = Message::from_bytes(payload).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Message::from_bytes(b"not a message").is_err());
    }

    #[test]
    fn error_response_carries_text_body() {
        let msg = Message::response_error("a:1", "b:2", Operation::QueuePop, "no such queue");
        assert_eq!(msg.status, Status::Error);
        assert_eq!(msg.body.as_text(), Some("no such queue"));
    }
}
