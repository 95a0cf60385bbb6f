//! # RDQueue
//!
//! A distributed message queue broker cluster fronted by a load balancer.
//! Clients register with the load balancer to get assigned to a broker,
//! then create queues and push/pop messages directly against that broker
//! over a small sentinel-framed binary protocol.

pub mod address;
pub mod broker;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod framing;
pub mod load_balancer;
pub mod logging;
pub mod message;
pub mod queue;
pub mod scheduler;

pub use address::Address;
pub use broker::Broker;
pub use client::QueueClient;
pub use load_balancer::LoadBalancer;
pub use message::{Body, Message, MessageType, Operation};
pub use queue::QueueEngine;

/// The current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
