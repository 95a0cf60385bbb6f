//! # Error Taxonomy
//!
//! Plain enums with hand-written `Display`/`Error` impls rather than
//! pulling in `thiserror` for a handful of variants.

use std::fmt;

/// Decode-time framing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// The frame exceeded the configured `max_message_size` and was
    /// rejected before an attempt to decode it.
    FrameTooLarge { size: usize, max: usize },
    /// The connection was closed before a complete frame (sentinel) was
    /// observed.
    Truncated,
    /// The frame's bytes did not decode into a well-formed `Message`.
    InvalidMessageStructure,
    /// Serialization of an outgoing message failed.
    Encode(String),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::FrameTooLarge { size, max } => {
                write!(f, "frame of {size} bytes exceeds the {max} byte limit")
            }
            FramingError::Truncated => write!(f, "connection closed mid-frame"),
            FramingError::InvalidMessageStructure => write!(f, "message structure is invalid"),
            FramingError::Encode(reason) => write!(f, "failed to encode message: {reason}"),
        }
    }
}

impl std::error::Error for FramingError {}

/// Failures raised by [`crate::queue::QueueEngine`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// `push`/`pop` referenced a queue name that has not been created.
    UnknownQueue { name: String },
    /// `pop` from a client that has never pushed to this queue.
    ClientNotRegistered { client_id: String, queue: String },
    /// `pop` when the client's cursor has already caught up to the end of
    /// the message list.
    EndOfStream { client_id: String, queue: String },
    /// A request's body did not have the shape its operation requires.
    InvalidRequest(String),
    /// The snapshot file could not be read or written.
    Snapshot(String),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::UnknownQueue { name } => write!(f, "queue '{name}' does not exist"),
            QueueError::ClientNotRegistered { client_id, queue } => write!(
                f,
                "client '{client_id}' has not pushed any message to queue '{queue}'"
            ),
            QueueError::EndOfStream { client_id, queue } => write!(
                f,
                "client '{client_id}' has consumed all messages in queue '{queue}'"
            ),
            QueueError::InvalidRequest(reason) => write!(f, "invalid request: {reason}"),
            QueueError::Snapshot(reason) => write!(f, "snapshot failure: {reason}"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Failures raised while a broker dispatches a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The request's `receiver_id` was set and did not match this broker's
    /// id.
    RoutingMismatch { expected: String, got: String },
    Framing(FramingError),
    Queue(QueueError),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::RoutingMismatch { expected, got } => write!(
                f,
                "request addressed to broker '{got}', this broker is '{expected}'"
            ),
            BrokerError::Framing(e) => write!(f, "{e}"),
            BrokerError::Queue(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<FramingError> for BrokerError {
    fn from(e: FramingError) -> Self {
        BrokerError::Framing(e)
    }
}

impl From<QueueError> for BrokerError {
    fn from(e: QueueError) -> Self {
        BrokerError::Queue(e)
    }
}

/// Failures surfaced by [`crate::client::QueueClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The load balancer has no live broker to assign.
    NoBrokerAvailable,
    /// The peer returned an ERROR response.
    Remote(String),
    Framing(FramingError),
    Io(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::NoBrokerAvailable => {
                write!(f, "no broker is available to handle the request")
            }
            ClientError::Remote(reason) => write!(f, "remote error: {reason}"),
            ClientError::Framing(e) => write!(f, "{e}"),
            ClientError::Io(reason) => write!(f, "io error: {reason}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<FramingError> for ClientError {
    fn from(e: FramingError) -> Self {
        ClientError::Framing(e)
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e.to_string())
    }
}
