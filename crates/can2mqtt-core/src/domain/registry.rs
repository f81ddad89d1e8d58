//! The frozen binding registry.
//!
//! The registry is built once, in bulk, from the binding table and never
//! changes afterwards.  There is no insert or remove API: the only way to get
//! a different set of bindings is to build a new registry.  Because nothing
//! mutates it, an `Arc<BindingRegistry>` can be read concurrently from the
//! CAN ingress task and the MQTT ingress task without any locking.
//!
//! # Uniqueness
//!
//! Routing is 1:1 in both directions, so construction rejects:
//!
//! - two bindings with the same CAN identifier, and
//! - two bindings with the same primary topic.
//!
//! Both checks look at *every* earlier binding, not only the first one.
//! Rejection is reported as a [`RegistryError`]; whether that is fatal is
//! the caller's decision (the bridge binary aborts startup).

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::domain::binding::{Binding, BindingRecord};

/// Errors that make a binding table unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two rows share a CAN identifier.
    #[error("CAN-ID {0} (0x{0:X}) is bound more than once")]
    DuplicateFrameId(u32),

    /// Two rows share a primary topic.
    #[error("topic {topic:?} is the primary topic of CAN-ID {first} and CAN-ID {second}")]
    DuplicateTopic { topic: String, first: u32, second: u32 },

    /// The topic spec of a row is blank.
    #[error("CAN-ID {0}: topic spec is empty")]
    EmptyTopicSpec(u32),

    /// The topic spec of a row contains an empty `&` segment.
    #[error("CAN-ID {0}: topic spec contains an empty topic")]
    EmptyTopic(u32),

    /// The identifier does not fit in an extended (29-bit) CAN identifier.
    #[error("CAN-ID {0} (0x{0:X}) exceeds the 29-bit identifier range")]
    FrameIdOutOfRange(u32),
}

/// Bidirectional lookup over a fixed set of [`Binding`]s.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    /// Bindings in table order.
    bindings: Vec<Binding>,
    /// CAN identifier → index into `bindings`.
    by_frame_id: HashMap<u32, usize>,
    /// Primary topic → index into `bindings`.
    by_topic: HashMap<String, usize>,
}

impl BindingRegistry {
    /// Builds and freezes a registry from binding-table rows, in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError`] encountered; no partial registry
    /// is produced.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use can2mqtt_core::{BindingRecord, BindingRegistry};
    ///
    /// let registry = BindingRegistry::new([
    ///     BindingRecord::new(0x100, "uint162ascii", "plant/level"),
    ///     BindingRecord::new(0x101, "float2ascii", "plant/temp"),
    /// ])
    /// .unwrap();
    ///
    /// assert_eq!(registry.lookup_by_topic("plant/temp").unwrap().frame_id(), 0x101);
    /// assert!(registry.lookup_by_frame_id(0x999).is_none());
    /// ```
    pub fn new<I>(records: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = BindingRecord>,
    {
        let mut registry = Self::default();

        for record in records {
            let binding = Binding::from_record(&record)?;

            if registry.by_frame_id.contains_key(&binding.frame_id()) {
                return Err(RegistryError::DuplicateFrameId(binding.frame_id()));
            }
            if let Some(&existing) = registry.by_topic.get(binding.primary_topic()) {
                return Err(RegistryError::DuplicateTopic {
                    topic: binding.primary_topic().to_string(),
                    first: registry.bindings[existing].frame_id(),
                    second: binding.frame_id(),
                });
            }

            let index = registry.bindings.len();
            registry.by_frame_id.insert(binding.frame_id(), index);
            registry
                .by_topic
                .insert(binding.primary_topic().to_string(), index);
            debug!(
                "registered CAN-ID {} <-> {:?} ({})",
                binding.frame_id(),
                binding.topics(),
                binding.mode()
            );
            registry.bindings.push(binding);
        }

        Ok(registry)
    }

    /// Resolves the binding for a CAN identifier.
    pub fn lookup_by_frame_id(&self, frame_id: u32) -> Option<&Binding> {
        self.by_frame_id.get(&frame_id).map(|&i| &self.bindings[i])
    }

    /// Resolves the binding whose *primary* topic is `topic`.
    ///
    /// Secondary topics never match.
    pub fn lookup_by_topic(&self, topic: &str) -> Option<&Binding> {
        self.by_topic.get(topic).map(|&i| &self.bindings[i])
    }

    /// All bindings in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::ConversionMode;

    fn sample() -> BindingRegistry {
        BindingRegistry::new([
            BindingRecord::new(0x100, "uint162ascii", "plant/level"),
            BindingRecord::new(0x101, "2int322ascii", "plant/a&plant/b"),
            BindingRecord::new(0x102, "bytecolor2colorcode", "plant/lamp"),
        ])
        .expect("sample table is valid")
    }

    #[test]
    fn test_lookup_by_frame_id() {
        let registry = sample();
        let binding = registry.lookup_by_frame_id(0x100).unwrap();
        assert_eq!(binding.primary_topic(), "plant/level");
        assert_eq!(binding.mode(), ConversionMode::Uint16);
    }

    #[test]
    fn test_lookup_by_topic() {
        let registry = sample();
        assert_eq!(registry.lookup_by_topic("plant/lamp").unwrap().frame_id(), 0x102);
    }

    #[test]
    fn test_both_lookups_agree_for_every_binding() {
        let registry = sample();
        for binding in registry.iter() {
            let by_id = registry.lookup_by_frame_id(binding.frame_id()).unwrap();
            let by_topic = registry.lookup_by_topic(binding.primary_topic()).unwrap();
            assert_eq!(by_id, by_topic);
            assert_eq!(by_id, binding);
        }
    }

    #[test]
    fn test_secondary_topic_does_not_resolve() {
        let registry = sample();
        assert!(registry.lookup_by_topic("plant/b").is_none());
    }

    #[test]
    fn test_unbound_lookups_return_none() {
        let registry = sample();
        assert!(registry.lookup_by_frame_id(0x7FF).is_none());
        assert!(registry.lookup_by_topic("nobody/home").is_none());
    }

    #[test]
    fn test_duplicate_frame_id_is_rejected() {
        let result = BindingRegistry::new([
            BindingRecord::new(1, "none", "a"),
            BindingRecord::new(1, "none", "b"),
        ]);
        assert_eq!(result.unwrap_err(), RegistryError::DuplicateFrameId(1));
    }

    #[test]
    fn test_duplicate_beyond_first_entry_is_rejected() {
        // The clash is with the *third* row, not the first.
        let result = BindingRegistry::new([
            BindingRecord::new(1, "none", "a"),
            BindingRecord::new(2, "none", "b"),
            BindingRecord::new(3, "none", "c"),
            BindingRecord::new(3, "none", "d"),
        ]);
        assert_eq!(result.unwrap_err(), RegistryError::DuplicateFrameId(3));
    }

    #[test]
    fn test_duplicate_primary_topic_is_rejected() {
        let result = BindingRegistry::new([
            BindingRecord::new(1, "none", "a"),
            BindingRecord::new(2, "none", "b"),
            BindingRecord::new(3, "none", "b&c"),
        ]);
        assert_eq!(
            result.unwrap_err(),
            RegistryError::DuplicateTopic {
                topic: "b".to_string(),
                first: 2,
                second: 3,
            }
        );
    }

    #[test]
    fn test_shared_secondary_topic_is_allowed() {
        // Only primary topics take part in reverse lookup.
        let result = BindingRegistry::new([
            BindingRecord::new(1, "2int322ascii", "a&shared"),
            BindingRecord::new(2, "2int322ascii", "b&shared"),
        ]);
        assert_eq!(result.unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_row_aborts_construction() {
        let result = BindingRegistry::new([
            BindingRecord::new(1, "none", "a"),
            BindingRecord::new(2, "none", ""),
        ]);
        assert_eq!(result.unwrap_err(), RegistryError::EmptyTopicSpec(2));
    }

    #[test]
    fn test_empty_table_is_valid() {
        let registry = BindingRegistry::new(Vec::new()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_iteration_preserves_table_order() {
        let ids: Vec<u32> = sample().iter().map(Binding::frame_id).collect();
        assert_eq!(ids, vec![0x100, 0x101, 0x102]);
    }
}
