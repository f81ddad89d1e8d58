//! In-process transports for tests, dry runs and the `replay` command.
//!
//! [`MemoryFrameBus`] behaves like a CAN socket with a receive filter: frames
//! injected for an identifier nobody subscribed to are dropped, and frames
//! the bridge sends are recorded instead of looped back.
//!
//! [`MemoryBroker`] behaves like an MQTT broker with a single client: it
//! delivers every message on a subscribed topic to the client's inbound
//! queue, *including the client's own publishes*.  That is what makes the
//! self-echo guard observable in tests.
//!
//! Both types are cheap to clone; clones share the same state, so a test can
//! keep one clone while the bridge owns another.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use can2mqtt_core::{CanFrame, MqttMessage};
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

use crate::application::transport::{FrameBus, PubSubClient, TransportError};
use crate::domain::BrokerEndpoint;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

// ── CAN ───────────────────────────────────────────────────────────────────────

struct BusInner {
    /// `None` once the bus is closed.
    tx: Mutex<Option<mpsc::UnboundedSender<CanFrame>>>,
    rx: Mutex<mpsc::UnboundedReceiver<CanFrame>>,
    filter: Mutex<HashSet<u32>>,
    sent: Mutex<Vec<CanFrame>>,
}

/// An in-memory CAN bus.
#[derive(Clone)]
pub struct MemoryFrameBus {
    inner: Arc<BusInner>,
}

impl MemoryFrameBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(BusInner {
                tx: Mutex::new(Some(tx)),
                rx: Mutex::new(rx),
                filter: Mutex::new(HashSet::new()),
                sent: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Puts a frame on the bus, as if another node had transmitted it.
    ///
    /// Returns `false` if the frame was filtered out or the bus is closed.
    pub async fn inject(&self, frame: CanFrame) -> bool {
        if !self.inner.filter.lock().await.contains(&frame.id) {
            trace!("memory bus: {frame} filtered");
            return false;
        }
        match self.inner.tx.lock().await.as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Closes the bus.  Frames already injected are still delivered, then
    /// [`FrameBus::receive`] returns `Ok(None)`.
    pub async fn close(&self) {
        self.inner.tx.lock().await.take();
    }

    /// Identifiers currently in the receive filter.
    pub async fn subscriptions(&self) -> HashSet<u32> {
        self.inner.filter.lock().await.clone()
    }

    /// Frames sent through [`FrameBus::send`], oldest first.
    pub async fn sent(&self) -> Vec<CanFrame> {
        self.inner.sent.lock().await.clone()
    }

    /// Waits until at least `count` frames were sent or `timeout` elapses,
    /// then returns everything sent so far.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<CanFrame> {
        let _ = tokio::time::timeout(timeout, async {
            while self.inner.sent.lock().await.len() < count {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await;
        self.sent().await
    }
}

impl Default for MemoryFrameBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameBus for MemoryFrameBus {
    async fn subscribe(&self, frame_id: u32) -> Result<(), TransportError> {
        self.inner.filter.lock().await.insert(frame_id);
        Ok(())
    }

    async fn receive(&self) -> Result<Option<CanFrame>, TransportError> {
        Ok(self.inner.rx.lock().await.recv().await)
    }

    async fn send(&self, frame: CanFrame) -> Result<(), TransportError> {
        if self.inner.tx.lock().await.is_none() {
            return Err(TransportError::Closed);
        }
        trace!("memory bus: sent {frame}");
        self.inner.sent.lock().await.push(frame);
        Ok(())
    }
}

// ── MQTT ──────────────────────────────────────────────────────────────────────

/// One call made by the client, in the order the broker saw them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerOp {
    Connect { client_id: String },
    Subscribe(String),
    Unsubscribe(String),
    Publish(MqttMessage),
}

#[derive(Default)]
struct BrokerState {
    inbound: Option<mpsc::Sender<MqttMessage>>,
    subscriptions: HashSet<String>,
    ops: Vec<BrokerOp>,
}

/// An in-memory MQTT broker with a single connected client.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a message from another client.
    ///
    /// Returns `true` if it was delivered, i.e. the bridge is connected and
    /// subscribed to `topic`.
    pub async fn inject(&self, topic: &str, payload: &str) -> bool {
        self.deliver(MqttMessage::new(topic, payload)).await
    }

    /// Drops the connection; the bridge's MQTT ingress task then stops.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        state.inbound = None;
        state.subscriptions.clear();
    }

    /// Topics the client is currently subscribed to.
    pub async fn subscriptions(&self) -> HashSet<String> {
        self.state.lock().await.subscriptions.clone()
    }

    /// Every call the client made, oldest first.
    pub async fn ops(&self) -> Vec<BrokerOp> {
        self.state.lock().await.ops.clone()
    }

    /// Messages the client published, oldest first.
    pub async fn published(&self) -> Vec<MqttMessage> {
        self.state
            .lock()
            .await
            .ops
            .iter()
            .filter_map(|op| match op {
                BrokerOp::Publish(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    /// Waits until at least `count` messages were published or `timeout`
    /// elapses, then returns everything published so far.
    pub async fn wait_for_published(&self, count: usize, timeout: Duration) -> Vec<MqttMessage> {
        let _ = tokio::time::timeout(timeout, async {
            while self.published().await.len() < count {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await;
        self.published().await
    }

    async fn deliver(&self, msg: MqttMessage) -> bool {
        // Clone the sender and release the lock: the queue is bounded and
        // `send` may wait for the consumer.
        let inbound = {
            let state = self.state.lock().await;
            if !state.subscriptions.contains(&msg.topic) {
                return false;
            }
            match &state.inbound {
                Some(tx) => tx.clone(),
                None => return false,
            }
        };
        inbound.send(msg).await.is_ok()
    }

    async fn require_connected(
        &self,
        err: impl FnOnce() -> TransportError,
    ) -> Result<(), TransportError> {
        if self.state.lock().await.inbound.is_some() {
            Ok(())
        } else {
            Err(err())
        }
    }
}

#[async_trait]
impl PubSubClient for MemoryBroker {
    async fn connect(
        &self,
        endpoint: &BrokerEndpoint,
        client_id: &str,
        inbound: mpsc::Sender<MqttMessage>,
    ) -> Result<(), TransportError> {
        trace!("memory broker: {client_id} connected to {endpoint}");
        let mut state = self.state.lock().await;
        state.inbound = Some(inbound);
        state.ops.push(BrokerOp::Connect {
            client_id: client_id.to_string(),
        });
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.require_connected(|| TransportError::Subscribe {
            target: topic.to_string(),
            reason: "not connected".to_string(),
        })
        .await?;
        let mut state = self.state.lock().await;
        state.subscriptions.insert(topic.to_string());
        state.ops.push(BrokerOp::Subscribe(topic.to_string()));
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.require_connected(|| TransportError::Unsubscribe {
            topic: topic.to_string(),
            reason: "not connected".to_string(),
        })
        .await?;
        let mut state = self.state.lock().await;
        state.subscriptions.remove(topic);
        state.ops.push(BrokerOp::Unsubscribe(topic.to_string()));
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        self.require_connected(|| TransportError::Publish {
            topic: topic.to_string(),
            reason: "not connected".to_string(),
        })
        .await?;
        let msg = MqttMessage::new(topic, payload);
        self.state.lock().await.ops.push(BrokerOp::Publish(msg.clone()));
        // A real broker hands the message to every subscriber, the
        // publisher included.
        self.deliver(msg).await;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn test_bus_filters_unsubscribed_ids() {
        // Arrange
        let bus = MemoryFrameBus::new();
        bus.subscribe(0x100).await.unwrap();

        // Act
        let kept = bus.inject(CanFrame::new(0x100, &[1])).await;
        let dropped = bus.inject(CanFrame::new(0x200, &[2])).await;

        // Assert
        assert!(kept);
        assert!(!dropped);
        assert_eq!(bus.receive().await.unwrap().unwrap().id, 0x100);
    }

    #[tokio::test]
    async fn test_bus_close_drains_then_ends() {
        let bus = MemoryFrameBus::new();
        bus.subscribe(1).await.unwrap();
        bus.inject(CanFrame::new(1, &[0xAA])).await;

        bus.close().await;

        assert!(bus.receive().await.unwrap().is_some());
        assert!(bus.receive().await.unwrap().is_none());
        assert!(!bus.inject(CanFrame::new(1, &[0xBB])).await);
    }

    #[tokio::test]
    async fn test_bus_records_sent_frames() {
        let bus = MemoryFrameBus::new();
        bus.send(CanFrame::new(7, &[1, 2])).await.unwrap();
        assert_eq!(bus.wait_for_sent(1, WAIT).await, vec![CanFrame::new(7, &[1, 2])]);
    }

    #[tokio::test]
    async fn test_bus_send_after_close_fails() {
        let bus = MemoryFrameBus::new();
        bus.close().await;
        assert_eq!(
            bus.send(CanFrame::new(7, &[])).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_broker_rejects_calls_before_connect() {
        let broker = MemoryBroker::new();
        assert!(broker.subscribe("a").await.is_err());
        assert!(broker.publish("a", "1").await.is_err());
    }

    #[tokio::test]
    async fn test_broker_delivers_only_subscribed_topics() {
        // Arrange
        let broker = MemoryBroker::new();
        let (tx, mut rx) = mpsc::channel(8);
        broker
            .connect(&BrokerEndpoint::default(), "test", tx)
            .await
            .unwrap();
        broker.subscribe("a").await.unwrap();

        // Act
        let delivered = broker.inject("a", "1").await;
        let ignored = broker.inject("b", "2").await;

        // Assert
        assert!(delivered);
        assert!(!ignored);
        assert_eq!(rx.recv().await, Some(MqttMessage::new("a", "1")));
    }

    #[tokio::test]
    async fn test_broker_echoes_publish_to_subscriber() {
        let broker = MemoryBroker::new();
        let (tx, mut rx) = mpsc::channel(8);
        broker
            .connect(&BrokerEndpoint::default(), "test", tx)
            .await
            .unwrap();
        broker.subscribe("a").await.unwrap();

        broker.publish("a", "x").await.unwrap();

        assert_eq!(rx.recv().await, Some(MqttMessage::new("a", "x")));
    }

    #[tokio::test]
    async fn test_broker_disconnect_closes_inbound_queue() {
        let broker = MemoryBroker::new();
        let (tx, mut rx) = mpsc::channel(8);
        broker
            .connect(&BrokerEndpoint::default(), "test", tx)
            .await
            .unwrap();

        broker.disconnect().await;

        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_broker_records_ops_in_order() {
        let broker = MemoryBroker::new();
        let (tx, _rx) = mpsc::channel(8);
        broker
            .connect(&BrokerEndpoint::default(), "c1", tx)
            .await
            .unwrap();
        broker.subscribe("a").await.unwrap();
        broker.unsubscribe("a").await.unwrap();
        broker.publish("a", "1").await.unwrap();

        assert_eq!(
            broker.ops().await,
            vec![
                BrokerOp::Connect {
                    client_id: "c1".to_string()
                },
                BrokerOp::Subscribe("a".to_string()),
                BrokerOp::Unsubscribe("a".to_string()),
                BrokerOp::Publish(MqttMessage::new("a", "1")),
            ]
        );
    }
}
