//! # Broker
//!
//! Binds to a configured address, accepts TCP connections, decodes framed
//! requests, dispatches on [`Operation`], and replies. Mirrors
//! `RDQueue/server/broker.py`'s `Broker.handle_client`/`handle_request`
//! dispatch table; the receiver-id routing filter in
//! [`Broker::dispatch`] matches the source's "ignore if not addressed to
//! me" check.
//!
//! One Tokio task per accepted connection, in the `tokio::spawn`-per-
//! connection accept-loop style used throughout this codebase. A connection
//! is read in a loop so both the short-lived (one request, then close) and
//! long-lived (many requests over one socket) client patterns are supported
//! without special-casing either.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::address::Address;
use crate::error::{BrokerError, FramingError, QueueError};
use crate::framing::{write_frame, FrameReader};
use crate::message::{Body, Message, MessageType, Operation};
use crate::queue::QueueEngine;

/// A single broker instance: a stable id, a bind address, and the queue
/// engine it owns exclusively.
pub struct Broker {
    id: String,
    address: Address,
    engine: Arc<Mutex<QueueEngine>>,
    max_message_size: usize,
}

impl Broker {
    pub fn new(address: Address, engine: Arc<Mutex<QueueEngine>>, max_message_size: usize) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            address,
            engine,
            max_message_size,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Binds the configured address and returns the listener without
    /// serving it yet, so callers (tests, multi-broker startup) can learn
    /// the actual bound port before requests start arriving — useful when
    /// `address`'s port is `0`.
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let listener = TcpListener::bind((self.address.host(), self.address.port())).await?;
        info!(broker_id = %self.id, address = %self.address, "broker listening");
        Ok(listener)
    }

    /// Binds the listener and serves forever. Returns once the socket fails
    /// to accept (an unrecoverable OS error); individual connection errors
    /// are handled per-connection and never reach here.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serves an already-bound listener forever.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            let broker = Arc::clone(&self);
            tokio::spawn(async move {
                debug!(%peer, "accepted connection");
                if let Err(e) = broker.handle_connection(stream).await {
                    warn!(%peer, error = %e, "connection ended with error");
                }
            });
        }
    }

    /// Serves requests from one connection until the peer closes it or a
    /// framing error makes the stream unrecoverable.
    async fn handle_connection(&self, stream: TcpStream) -> Result<(), FramingError> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);

        loop {
            let request = match reader.read_frame(self.max_message_size).await {
                Ok(Some(msg)) => msg,
                Ok(None) => return Ok(()),
                Err(e) => {
                    // Best-effort error response: the sender's address on
                    // the envelope may itself be unparseable, so a decode
                    // failure is logged and the connection is simply
                    // closed rather than risking a second bad write.
                    error!(error = %e, "frame decode failed, closing connection");
                    return Err(e);
                }
            };

            if !matches!(request.message_type, MessageType::Request) {
                continue;
            }

            if !matches!(request.operation, Operation::BrokerInfo) {
                info!(from = %request.sender_addr, operation = ?request.operation, "received request");
            }

            let response = self.dispatch(&request).await;
            write_frame(&mut write_half, &response).await?;
        }
    }

    /// Pre-dispatch routing filter plus the per-operation handlers. Always
    /// returns a response envelope — callers never see a dispatch error
    /// directly, matching §7's "connection-local errors never tear down the
    /// accept loop" propagation policy.
    async fn dispatch(&self, request: &Message) -> Message {
        if let Some(receiver_id) = &request.receiver_id {
            if receiver_id != &self.id {
                let err = BrokerError::RoutingMismatch {
                    expected: self.id.clone(),
                    got: receiver_id.clone(),
                };
                return Message::response_error(
                    self.address.connection_str(),
                    request.sender_addr.clone(),
                    request.operation,
                    err.to_string(),
                );
            }
        }

        let result = match request.operation {
            Operation::BrokerInfo => Ok(Body::Text(self.id.clone())),
            Operation::QueueCreate => self.handle_queue_create(request).await,
            Operation::QueuePush => self.handle_queue_push(request).await,
            Operation::QueuePop => self.handle_queue_pop(request).await,
            Operation::NoOp | Operation::RegisterClient => Ok(Body::Empty),
        };

        match result {
            Ok(body) => Message::response_ok(
                self.address.connection_str(),
                request.sender_addr.clone(),
                request.sender_id.clone(),
                request.operation,
                body,
            ),
            Err(e) => Message::response_error(
                self.address.connection_str(),
                request.sender_addr.clone(),
                request.operation,
                e.to_string(),
            ),
        }
    }

    async fn handle_queue_create(&self, request: &Message) -> Result<Body, QueueError> {
        let name = request
            .body
            .as_text()
            .ok_or_else(|| QueueError::InvalidRequest("queue name must be a text body".into()))?;

        let mut engine = self.engine.lock().await;
        let queue = engine.create_queue(name, request.sender_id.clone())?;
        Ok(Body::QueueInfo {
            id: queue.id,
            name: queue.name,
        })
    }

    async fn handle_queue_push(&self, request: &Message) -> Result<Body, QueueError> {
        let (queue_name, message) = match &request.body {
            Body::Push { queue_name, message } => (queue_name, message),
            _ => {
                return Err(QueueError::InvalidRequest(
                    "push body must be {queue_name, message}".into(),
                ))
            }
        };
        let sender_id = request
            .sender_id
            .clone()
            .unwrap_or_else(|| request.sender_addr.clone());

        let mut engine = self.engine.lock().await;
        engine.push(queue_name, &sender_id, message.clone())?;
        Ok(Body::Text("OK".to_string()))
    }

    async fn handle_queue_pop(&self, request: &Message) -> Result<Body, QueueError> {
        let queue_name = request
            .body
            .as_text()
            .ok_or_else(|| QueueError::InvalidRequest("pop body must be a text queue name".into()))?;
        let client_id = request
            .sender_id
            .clone()
            .unwrap_or_else(|| request.sender_addr.clone());

        let mut engine = self.engine.lock().await;
        let value = engine.pop(queue_name, &client_id)?;
        Ok(Body::Bytes(value))
    }
}
