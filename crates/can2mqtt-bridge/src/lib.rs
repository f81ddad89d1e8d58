//! can2mqtt-bridge library crate.
//!
//! Runs the translation engine from `can2mqtt-core` between a CAN bus and an
//! MQTT broker.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! CAN bus (CanFrame)                         MQTT broker (topic, payload)
//!         ↕                                           ↕
//! [can2mqtt-bridge]
//!   ├── domain/           BridgeConfig, Direction, BrokerEndpoint
//!   ├── application/
//!   │     ├── transport/    FrameBus + PubSubClient adapter traits
//!   │     ├── dispatcher/   frame ↔ message translation via the registry
//!   │     └── orchestrator/ the two ingress tasks
//!   └── infrastructure/
//!         ├── memory/     in-process CAN bus and MQTT broker
//!         └── storage/    binding table, TOML config, candump logs
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `can2mqtt-core`; it only talks to
//!   the outside world through the traits in [`application::transport`].
//! - `infrastructure` implements those traits and reads files.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: dispatcher, orchestrator and transport seams.
pub mod application;

/// Infrastructure layer: adapters and file loaders.
pub mod infrastructure;
