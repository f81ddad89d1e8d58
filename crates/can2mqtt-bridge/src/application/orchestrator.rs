//! Bridge orchestrator: startup sequence and the two ingress tasks.
//!
//! # Lifecycle
//!
//! ```text
//! start()
//!   1. PubSubClient::connect            (failure → BridgeError::Connect)
//!   2. subscribe every primary topic    (only if MQTT → CAN is enabled)
//!   3. FrameBus::subscribe every id     (only if CAN → MQTT is enabled)
//!      (failure in 2 or 3 → BridgeError::Register)
//!   4. spawn CAN ingress task           (only if CAN → MQTT is enabled)
//!   5. spawn MQTT ingress task          (only if MQTT → CAN is enabled)
//!   → BridgeHandle
//! ```
//!
//! Nothing is read from either transport before step 4, so a configuration
//! or connection problem never lets a single frame through.
//!
//! # Self-echo guard
//!
//! A bridge that is subscribed to `T` and publishes to `T` receives its own
//! message back and would translate it into a CAN frame.  Before publishing
//! to a topic it is subscribed to, the CAN ingress task unsubscribes from
//! it, publishes, and resubscribes.  A message published by someone else on
//! `T` inside that window is missed.  Topics the bridge never subscribed to
//! are published directly.
//!
//! # Failure handling
//!
//! Once running, nothing is fatal: a failed publish, send or subscribe is
//! logged at `warn` and the next unit is processed.  The CAN task stops when
//! the bus reports that it is closed; the MQTT task stops when the client
//! drops its side of the inbound queue.
//!
//! A bus that keeps failing to receive (bus-off, interface down) is polled
//! with a backoff that doubles from [`RECEIVE_RETRY_MIN`] up to
//! [`RECEIVE_RETRY_MAX`].  Only the first failure of a streak is logged at
//! `warn`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use can2mqtt_core::{BindingRegistry, MqttMessage};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::application::dispatcher::Dispatcher;
use crate::application::transport::{FrameBus, PubSubClient, TransportError};
use crate::domain::{BridgeConfig, BrokerEndpoint, Direction};

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The MQTT client could not connect.
    #[error("could not connect to the MQTT broker: {0}")]
    Connect(#[source] TransportError),

    /// A topic or CAN identifier could not be registered.
    #[error("could not register bindings: {0}")]
    Register(#[source] TransportError),
}

/// Tunables of a [`Bridge`] that are not part of the binding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    pub direction: Direction,
    /// Capacity of the bounded MQTT → dispatcher queue.
    pub inbound_queue_capacity: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for BridgeOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            direction: config.direction,
            inbound_queue_capacity: config.inbound_queue_capacity,
        }
    }
}

/// Wires a [`Dispatcher`] between a [`FrameBus`] and a [`PubSubClient`].
pub struct Bridge<F, P> {
    dispatcher: Dispatcher,
    frame_bus: Arc<F>,
    pubsub: Arc<P>,
    options: BridgeOptions,
}

impl<F, P> Bridge<F, P>
where
    F: FrameBus + 'static,
    P: PubSubClient + 'static,
{
    pub fn new(
        registry: Arc<BindingRegistry>,
        frame_bus: Arc<F>,
        pubsub: Arc<P>,
        options: BridgeOptions,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry),
            frame_bus,
            pubsub,
            options,
        }
    }

    /// Connects, registers every binding and starts the ingress tasks.
    ///
    /// Returns once both ingress paths are running.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Connect`] or [`BridgeError::Register`]; in both cases
    /// no ingress task has been started.
    pub async fn start(
        &self,
        endpoint: &BrokerEndpoint,
        client_id: &str,
    ) -> Result<BridgeHandle, BridgeError> {
        let direction = self.options.direction;
        let (inbound_tx, inbound_rx) = mpsc::channel(self.options.inbound_queue_capacity.max(1));

        info!("connecting to MQTT broker {endpoint} as {client_id:?}");
        self.pubsub
            .connect(endpoint, client_id, inbound_tx)
            .await
            .map_err(BridgeError::Connect)?;

        let registry = self.dispatcher.registry();
        let mut subscribed = HashSet::new();

        if direction.mqtt_to_can() {
            for binding in registry.iter() {
                self.pubsub
                    .subscribe(binding.primary_topic())
                    .await
                    .map_err(BridgeError::Register)?;
                subscribed.insert(binding.primary_topic().to_string());
            }
        }
        if direction.can_to_mqtt() {
            for binding in registry.iter() {
                self.frame_bus
                    .subscribe(binding.frame_id())
                    .await
                    .map_err(BridgeError::Register)?;
            }
        }
        debug!(
            "registered {} binding(s), {} topic subscription(s)",
            registry.len(),
            subscribed.len()
        );

        let can_task = direction.can_to_mqtt().then(|| {
            tokio::spawn(run_can_ingress(
                self.dispatcher.clone(),
                Arc::clone(&self.frame_bus),
                Arc::clone(&self.pubsub),
                Arc::new(subscribed),
            ))
        });

        // With MQTT → CAN disabled the receiver is dropped here and the
        // client has nowhere to deliver to, which is fine: it subscribed to
        // nothing.
        let mqtt_task = direction.mqtt_to_can().then(|| {
            tokio::spawn(run_mqtt_ingress(
                self.dispatcher.clone(),
                Arc::clone(&self.frame_bus),
                inbound_rx,
            ))
        });

        info!("bridge running ({direction})");
        Ok(BridgeHandle {
            can_task,
            mqtt_task,
        })
    }
}

/// Handle to the running ingress tasks.
#[derive(Debug)]
pub struct BridgeHandle {
    can_task: Option<JoinHandle<()>>,
    mqtt_task: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Waits until both ingress tasks have finished.
    ///
    /// # Errors
    ///
    /// Returns the [`JoinError`] of the first task that panicked or was
    /// aborted.
    pub async fn join(self) -> Result<(), JoinError> {
        if let Some(task) = self.can_task {
            task.await?;
        }
        if let Some(task) = self.mqtt_task {
            task.await?;
        }
        Ok(())
    }

    /// Stops both ingress tasks at their next await point.
    pub fn abort(&self) {
        for task in [&self.can_task, &self.mqtt_task].into_iter().flatten() {
            task.abort();
        }
    }
}

// ── Ingress tasks ─────────────────────────────────────────────────────────────

/// First delay after a failed CAN receive.
pub const RECEIVE_RETRY_MIN: Duration = Duration::from_millis(10);

/// Upper bound of the receive backoff.
pub const RECEIVE_RETRY_MAX: Duration = Duration::from_secs(1);

async fn run_can_ingress<F, P>(
    dispatcher: Dispatcher,
    frame_bus: Arc<F>,
    pubsub: Arc<P>,
    subscribed: Arc<HashSet<String>>,
) where
    F: FrameBus,
    P: PubSubClient,
{
    let mut failures: u32 = 0;
    let mut backoff = RECEIVE_RETRY_MIN;

    loop {
        let frame = match frame_bus.receive().await {
            Ok(Some(frame)) => frame,
            Ok(None) | Err(TransportError::Closed) => break,
            Err(e) => {
                if failures == 0 {
                    warn!("CAN receive failed: {e}");
                } else {
                    debug!("CAN receive failed again ({failures}): {e}");
                }
                failures = failures.saturating_add(1);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(RECEIVE_RETRY_MAX);
                continue;
            }
        };
        if failures > 0 {
            info!("CAN receive recovered after {failures} failure(s)");
            failures = 0;
            backoff = RECEIVE_RETRY_MIN;
        }

        for msg in dispatcher.on_frame(&frame) {
            publish_guarded(pubsub.as_ref(), &subscribed, &msg).await;
        }
    }
    debug!("CAN ingress stopped");
}

async fn run_mqtt_ingress<F>(
    dispatcher: Dispatcher,
    frame_bus: Arc<F>,
    mut inbound: mpsc::Receiver<MqttMessage>,
) where
    F: FrameBus,
{
    while let Some(msg) = inbound.recv().await {
        let Some(frame) = dispatcher.on_message(&msg) else {
            continue;
        };
        if let Err(e) = frame_bus.send(frame).await {
            warn!("{e}");
        }
    }
    debug!("MQTT ingress stopped");
}

/// Publishes `msg`, wrapping it in unsubscribe/resubscribe if the bridge is
/// subscribed to its topic.
async fn publish_guarded<P>(pubsub: &P, subscribed: &HashSet<String>, msg: &MqttMessage)
where
    P: PubSubClient + ?Sized,
{
    let guarded = subscribed.contains(&msg.topic);

    if guarded {
        if let Err(e) = pubsub.unsubscribe(&msg.topic).await {
            warn!("{e}");
        }
    }
    if let Err(e) = pubsub.publish(&msg.topic, &msg.payload).await {
        warn!("{e}");
    }
    if guarded {
        if let Err(e) = pubsub.subscribe(&msg.topic).await {
            warn!("{e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
