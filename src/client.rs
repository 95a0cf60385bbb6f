//! # Queue Client
//!
//! Registers with the load balancer once to learn an assigned broker, then
//! opens a fresh connection per request to that broker for
//! `create_queue`/`push`/`pop`. Broker-unavailable conditions are retried
//! with a fixed 5s delay plus `[0, 2s)` of jitter, reproduced here with a
//! plain loop and `rand` rather than pulling in a dedicated retry-policy
//! crate for one call site.

use std::time::Duration;

use rand::Rng;
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::address::Address;
use crate::error::ClientError;
use crate::framing::{write_frame, FrameReader};
use crate::message::{Body, Message, Operation};

const RETRY_BASE: Duration = Duration::from_secs(5);
const RETRY_JITTER_MAX_MS: u64 = 2000;

/// A named queue handle bound to one client identity, addressable via the
/// cluster's load balancer.
pub struct QueueClient {
    connection_addr: Address,
    load_balancer_addr: Address,
    name: String,
    id: String,
    broker_addr: Option<Address>,
    broker_id: Option<String>,
}

impl QueueClient {
    pub fn new(connection_addr: Address, load_balancer_addr: Address, name: impl Into<String>) -> Self {
        Self {
            connection_addr,
            load_balancer_addr,
            name: name.into(),
            id: Uuid::new_v4().simple().to_string(),
            broker_addr: None,
            broker_id: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn broker_addr(&self) -> Option<Address> {
        self.broker_addr
    }

    /// Registers with the load balancer, connects to the assigned broker,
    /// and creates the named queue — the three steps of the source's
    /// `async_init`.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        self.ensure_broker_assigned().await?;
        self.create_queue_with_retry().await
    }

    /// Sends a BROKER_INFO request to the load balancer and records the
    /// assigned broker's id/address. A no-op once a broker is already
    /// assigned, matching the source's `if self.broker_addr is not None:
    /// return` guard.
    async fn ensure_broker_assigned(&mut self) -> Result<(), ClientError> {
        if self.broker_addr.is_some() {
            return Ok(());
        }

        let mut stream = TcpStream::connect((
            self.load_balancer_addr.host(),
            self.load_balancer_addr.port(),
        ))
        .await?;

        let request = Message::request(
            self.connection_addr.connection_str(),
            self.load_balancer_addr.connection_str(),
            Some(self.id.clone()),
            None,
            Operation::RegisterClient,
            Body::Empty,
        );
        write_frame(&mut stream, &request).await?;

        let (read_half, _write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        let response = reader
            .read_frame(crate::config::max_message_size())
            .await?
            .ok_or(ClientError::NoBrokerAvailable)?;

        if !response.is_ok() {
            return Err(ClientError::NoBrokerAvailable);
        }

        match response.body {
            Body::BrokerAssignment { id, address } => {
                self.broker_addr = Some(address.parse().map_err(|_| ClientError::NoBrokerAvailable)?);
                self.broker_id = Some(id);
                Ok(())
            }
            _ => Err(ClientError::NoBrokerAvailable),
        }
    }

    async fn create_queue_with_retry(&mut self) -> Result<(), ClientError> {
        loop {
            match self.create_queue_once().await {
                Ok(()) => return Ok(()),
                Err(ClientError::NoBrokerAvailable) => backoff().await,
                Err(e) => return Err(e),
            }
        }
    }

    async fn create_queue_once(&mut self) -> Result<(), ClientError> {
        self.ensure_broker_assigned().await?;
        let broker_addr = self.broker_addr.ok_or(ClientError::NoBrokerAvailable)?;

        let request = Message::request(
            self.connection_addr.connection_str(),
            broker_addr.connection_str(),
            Some(self.id.clone()),
            self.broker_id.clone(),
            Operation::QueueCreate,
            Body::Text(self.name.clone()),
        );

        let response = self.round_trip(broker_addr, request).await?;
        match response.body {
            Body::QueueInfo { .. } if response.is_ok() => Ok(()),
            Body::Text(reason) => Err(ClientError::Remote(reason)),
            _ => Err(ClientError::Remote("unexpected response to queue create".into())),
        }
    }

    /// Appends `payload` to the queue, retrying on broker unavailability.
    pub async fn push(&mut self, payload: Vec<u8>) -> Result<(), ClientError> {
        loop {
            match self.push_once(payload.clone()).await {
                Ok(()) => return Ok(()),
                Err(ClientError::NoBrokerAvailable) => backoff().await,
                Err(e) => return Err(e),
            }
        }
    }

    async fn push_once(&mut self, payload: Vec<u8>) -> Result<(), ClientError> {
        let broker_addr = self.broker_addr.ok_or(ClientError::NoBrokerAvailable)?;

        let request = Message::request(
            self.connection_addr.connection_str(),
            broker_addr.connection_str(),
            Some(self.id.clone()),
            self.broker_id.clone(),
            Operation::QueuePush,
            Body::Push {
                queue_name: self.name.clone(),
                message: payload,
            },
        );

        let response = self.round_trip(broker_addr, request).await?;
        if response.is_ok() {
            Ok(())
        } else {
            Err(ClientError::Remote(
                response.body.as_text().unwrap_or("push failed").to_string(),
            ))
        }
    }

    /// Reads the next unread message for this client, retrying on broker
    /// unavailability. A well-formed `CLIENT_NOT_REGISTERED`/`END_OF_STREAM`
    /// error from the broker is returned as [`ClientError::Remote`] rather
    /// than retried, since retrying wouldn't change the outcome.
    pub async fn pop(&mut self) -> Result<Vec<u8>, ClientError> {
        loop {
            match self.pop_once().await {
                Ok(data) => return Ok(data),
                Err(ClientError::NoBrokerAvailable) => backoff().await,
                Err(e) => return Err(e),
            }
        }
    }

    async fn pop_once(&mut self) -> Result<Vec<u8>, ClientError> {
        let broker_addr = self.broker_addr.ok_or(ClientError::NoBrokerAvailable)?;

        let request = Message::request(
            self.connection_addr.connection_str(),
            broker_addr.connection_str(),
            Some(self.id.clone()),
            self.broker_id.clone(),
            Operation::QueuePop,
            Body::Text(self.name.clone()),
        );

        let response = self.round_trip(broker_addr, request).await?;
        match response.body {
            Body::Bytes(data) if response.is_ok() => Ok(data),
            _ => Err(ClientError::Remote(
                response.body.as_text().unwrap_or("pop failed").to_string(),
            )),
        }
    }

    /// Opens a fresh connection to `broker_addr`, writes `request`, and
    /// reads back one response — the source opens and closes a connection
    /// per call rather than keeping one open across requests.
    async fn round_trip(&self, broker_addr: Address, request: Message) -> Result<Message, ClientError> {
        let mut stream = TcpStream::connect((broker_addr.host(), broker_addr.port())).await?;
        write_frame(&mut stream, &request).await?;

        let (read_half, _write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half);
        reader
            .read_frame(crate::config::max_message_size())
            .await?
            .ok_or(ClientError::NoBrokerAvailable)
    }
}

/// Sleeps for a 5s base plus `[0, 2s)` jitter — the source's
/// `wait_fixed(5) + wait_random(0, 2)` tenacity policy — between retries of
/// an operation that failed with [`ClientError::NoBrokerAvailable`].
async fn backoff() {
    let jitter_ms = rand::thread_rng().gen_range(0..RETRY_JITTER_MAX_MS);
    tokio::time::sleep(RETRY_BASE + Duration::from_millis(jitter_ms)).await;
}
