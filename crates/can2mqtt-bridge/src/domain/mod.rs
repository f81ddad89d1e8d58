//! Domain layer for can2mqtt-bridge.
//!
//! Plain configuration values.  Nothing in here reads files, touches the
//! environment or needs a runtime; `main.rs` and the storage loaders fill
//! these types in.

pub mod config;

pub use config::{BridgeConfig, BrokerEndpoint, ConfigValueError, Credentials, Direction};
