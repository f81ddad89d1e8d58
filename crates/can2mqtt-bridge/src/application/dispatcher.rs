//! Translation dispatcher: one inbound unit in, outbound unit(s) out.
//!
//! The dispatcher is synchronous and stateless apart from the shared, frozen
//! [`BindingRegistry`].  It never touches a transport; the orchestrator feeds
//! it and forwards whatever it returns.
//!
//! # Routing rules
//!
//! | inbound                    | binding found            | result                        |
//! |----------------------------|--------------------------|-------------------------------|
//! | CAN frame, id `N`          | by frame id `N`          | one message per decoded value |
//! | CAN frame, id `N`          | none                     | nothing                       |
//! | MQTT message on topic `T`  | by primary topic `T`     | one frame with the bound id   |
//! | MQTT message on topic `T`  | none                     | nothing                       |

use std::sync::Arc;

use can2mqtt_core::{BindingRegistry, CanFrame, MqttMessage};
use tracing::debug;

/// Translates between [`CanFrame`]s and [`MqttMessage`]s using a registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<BindingRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<BindingRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BindingRegistry {
        &self.registry
    }

    /// CAN → MQTT.
    ///
    /// Decoded value `i` is paired with bound topic `i`.  Surplus values are
    /// dropped; surplus topics get nothing for this frame.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use can2mqtt_bridge::application::Dispatcher;
    /// use can2mqtt_core::{BindingRecord, BindingRegistry, CanFrame};
    ///
    /// let registry = BindingRegistry::new([
    ///     BindingRecord::new(0x100, "uint162ascii", "plant/level"),
    /// ])
    /// .unwrap();
    /// let dispatcher = Dispatcher::new(Arc::new(registry));
    ///
    /// let out = dispatcher.on_frame(&CanFrame::new(0x100, &[0x00, 0x2A]));
    /// assert_eq!(out.len(), 1);
    /// assert_eq!(out[0].topic, "plant/level");
    /// assert_eq!(out[0].payload, "42");
    /// ```
    pub fn on_frame(&self, frame: &CanFrame) -> Vec<MqttMessage> {
        let Some(binding) = self.registry.lookup_by_frame_id(frame.id) else {
            debug!("CAN-ID {} is not bound, frame {} dropped", frame.id, frame);
            return Vec::new();
        };

        let values = binding.mode().decode(frame.payload());
        let messages: Vec<MqttMessage> = binding
            .topics()
            .iter()
            .zip(values)
            .map(|(topic, value)| MqttMessage::new(topic.as_str(), value))
            .collect();

        for msg in &messages {
            debug!(
                "CAN -> MQTT: {} ({}) -> {} = {:?}",
                frame,
                binding.mode(),
                msg.topic,
                msg.payload
            );
        }
        messages
    }

    /// MQTT → CAN.
    ///
    /// Only primary topics resolve; a message on a secondary topic is
    /// treated like one on an unbound topic.
    pub fn on_message(&self, msg: &MqttMessage) -> Option<CanFrame> {
        let Some(binding) = self.registry.lookup_by_topic(&msg.topic) else {
            debug!("topic {:?} is not bound, message dropped", msg.topic);
            return None;
        };

        let frame = binding.mode().encode(&msg.payload).into_frame(binding.frame_id());
        debug!(
            "MQTT -> CAN: {} = {:?} ({}) -> {}",
            msg.topic,
            msg.payload,
            binding.mode(),
            frame
        );
        Some(frame)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
