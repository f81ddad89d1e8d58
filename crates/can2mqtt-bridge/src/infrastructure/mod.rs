//! Infrastructure layer for can2mqtt-bridge.
//!
//! Everything that touches the outside world lives here.
//!
//! # Responsibilities
//!
//! - In-process implementations of the transport traits ([`memory`])
//! - Reading configuration, binding tables and candump logs ([`storage`])
//!
//! # What does NOT belong here?
//!
//! - Translation logic (that is `can2mqtt-core` and the application layer)
//! - Deciding which errors are fatal (that is `main.rs`)

pub mod memory;
pub mod storage;

pub use memory::{BrokerOp, MemoryBroker, MemoryFrameBus};
