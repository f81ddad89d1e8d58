//! Transport seams: the CAN bus and MQTT client adapters.
//!
//! The orchestrator only ever talks to these two traits.  Infrastructure
//! implementations wrap a real SocketCAN interface or MQTT client; tests use
//! the in-memory adapters from
//! [`infrastructure::memory`](crate::infrastructure::memory) or mockall doubles.
//!
//! # Calling convention
//!
//! Every method is "synchronous from the caller's perspective": the returned
//! future resolves once the operation was acknowledged or failed.  No method
//! retries; failures are reported as [`TransportError`] and the caller
//! decides whether they are fatal.

use async_trait::async_trait;
use can2mqtt_core::{CanFrame, MqttMessage};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::BrokerEndpoint;

/// Failures reported by a transport adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("subscribe to {target} failed: {reason}")]
    Subscribe { target: String, reason: String },

    #[error("unsubscribe from {topic} failed: {reason}")]
    Unsubscribe { topic: String, reason: String },

    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("sending CAN frame {id:#X} failed: {reason}")]
    Send { id: u32, reason: String },

    #[error("receiving CAN frame failed: {0}")]
    Receive(String),

    /// The adapter has been shut down.
    #[error("transport closed")]
    Closed,
}

/// The CAN side: a bus that can filter, receive and send frames.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameBus: Send + Sync {
    /// Adds `frame_id` to the receive filter.
    ///
    /// Frames whose identifier was never subscribed are not returned by
    /// [`receive`](Self::receive).
    async fn subscribe(&self, frame_id: u32) -> Result<(), TransportError>;

    /// Waits for the next subscribed frame.
    ///
    /// `Ok(None)` means the bus is gone for good and the caller should stop
    /// reading.
    async fn receive(&self) -> Result<Option<CanFrame>, TransportError>;

    /// Transmits one frame.
    async fn send(&self, frame: CanFrame) -> Result<(), TransportError>;
}

/// The MQTT side: a client connected to one broker.
///
/// Inbound messages are not delivered through callbacks.  At
/// [`connect`](Self::connect) time the client receives the sending half of a
/// bounded channel and pushes every message for a subscribed topic into it;
/// a single consumer task in the orchestrator drains the other half.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PubSubClient: Send + Sync {
    /// Connects to `endpoint` as `client_id`.
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
        client_id: &str,
        inbound: mpsc::Sender<MqttMessage>,
    ) -> Result<(), TransportError>;

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError>;
}
