//! Domain entities for the bridge.
//!
//! A *binding* ties one CAN identifier to one or more MQTT topics and a
//! conversion mode.  The *registry* is the complete, frozen set of bindings
//! for the lifetime of the process.  Neither type performs I/O; loading the
//! binding table from disk is the bridge crate's job.

pub mod binding;
pub mod registry;
