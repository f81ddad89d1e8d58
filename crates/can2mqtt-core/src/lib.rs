//! # can2mqtt-core
//!
//! Protocol translation engine for the CAN to MQTT bridge.
//!
//! This crate holds everything that decides *what* a bridged message looks
//! like on the other side.  It has zero dependencies on sockets, async
//! runtimes, or the MQTT broker, so every rule here can be tested in
//! isolation.
//!
//! - **`protocol`** – The two message shapes ([`CanFrame`], [`MqttMessage`])
//!   and the conversion-mode codec table.  Each [`ConversionMode`] defines a
//!   tiny binary protocol of its own: field widths, byte order, and how many
//!   text values a single frame produces.
//!
//! - **`domain`** – Bindings (CAN-ID ↔ topics ↔ conversion mode) and the
//!   frozen [`BindingRegistry`] that resolves them in both directions.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `can2mqtt_core::BindingRegistry` instead of the full module path.
pub use domain::binding::{Binding, BindingRecord};
pub use domain::registry::{BindingRegistry, RegistryError};
pub use protocol::codec::{ConversionMode, EncodedPayload, ModeSupport, UnknownModeError};
pub use protocol::frame::{CanFrame, MqttMessage, CAN_EFF_MASK, CAN_MAX_DLEN};
