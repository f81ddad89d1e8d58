//! Application layer for can2mqtt-bridge.
//!
//! Knows *what* happens to a frame or a message, but not *how* it reaches
//! the bus or the broker: both transports are injected as trait objects
//! implementing [`transport::FrameBus`] and [`transport::PubSubClient`].
//!
//! # Responsibilities
//!
//! - Translating CAN frames into MQTT messages and back ([`dispatcher`])
//! - Running the two ingress paths and the self-echo guard ([`orchestrator`])
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or CAN interfaces (infrastructure)
//! - Parsing files or CLI arguments (infrastructure / `main.rs`)

pub mod dispatcher;
pub mod orchestrator;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use orchestrator::{Bridge, BridgeError, BridgeHandle, BridgeOptions};
pub use transport::{FrameBus, PubSubClient, TransportError};
