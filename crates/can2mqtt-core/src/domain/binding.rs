//! A single CAN-ID ↔ MQTT-topic association.
//!
//! # Topic specs
//!
//! A binding table names its topics as one `&`-joined string:
//!
//! ```text
//! drill/motor/current&drill/motor/speed&drill/motor/state
//! ```
//!
//! The first topic is the **primary topic**.  It is the only topic the
//! bridge subscribes to, so MQTT → CAN traffic always comes in on it.  The
//! remaining topics are only used when a conversion mode decodes one frame
//! into several values: value `i` is published to topic `i`.

use serde::Serialize;

use crate::domain::registry::RegistryError;
use crate::protocol::codec::ConversionMode;
use crate::protocol::frame::CAN_EFF_MASK;

/// One unparsed row of the binding table: `(frame id, mode name, topic spec)`.
///
/// This is what the configuration loader hands to
/// [`BindingRegistry::new`](crate::BindingRegistry::new).  The mode is kept
/// as a string because unknown names are resolved (with a fallback) by the
/// registry, not by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRecord {
    pub frame_id: u32,
    pub mode: String,
    pub topic_spec: String,
}

impl BindingRecord {
    pub fn new(frame_id: u32, mode: impl Into<String>, topic_spec: impl Into<String>) -> Self {
        Self {
            frame_id,
            mode: mode.into(),
            topic_spec: topic_spec.into(),
        }
    }
}

/// A validated binding.
///
/// Invariant: `topics` is never empty and no topic is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    frame_id: u32,
    mode: ConversionMode,
    topics: Vec<String>,
}

impl Binding {
    /// Validates a binding-table row.
    ///
    /// Unknown mode names fall back to [`ConversionMode::None`] with a
    /// warning.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::FrameIdOutOfRange`] if the identifier does not fit
    ///   in 29 bits.
    /// - [`RegistryError::EmptyTopicSpec`] / [`RegistryError::EmptyTopic`]
    ///   if the topic spec is blank or contains a blank segment.
    pub fn from_record(record: &BindingRecord) -> Result<Self, RegistryError> {
        if record.frame_id > CAN_EFF_MASK {
            return Err(RegistryError::FrameIdOutOfRange(record.frame_id));
        }
        let topics = split_topic_spec(record.frame_id, &record.topic_spec)?;
        Ok(Self {
            frame_id: record.frame_id,
            mode: ConversionMode::from_name_or_fallback(&record.mode),
            topics,
        })
    }

    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    pub fn mode(&self) -> ConversionMode {
        self.mode
    }

    /// All bound topics, primary first.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// The topic used for MQTT → CAN lookup.
    pub fn primary_topic(&self) -> &str {
        &self.topics[0]
    }
}

/// Splits an `&`-joined topic spec into its topics.
///
/// Segments are trimmed.  A trailing `&` is tolerated; any other empty
/// segment is rejected because a message could never be routed to it.
fn split_topic_spec(frame_id: u32, spec: &str) -> Result<Vec<String>, RegistryError> {
    let spec = spec.trim();
    let spec = spec.strip_suffix('&').unwrap_or(spec);
    if spec.trim().is_empty() {
        return Err(RegistryError::EmptyTopicSpec(frame_id));
    }

    spec.split('&')
        .map(str::trim)
        .map(|topic| {
            if topic.is_empty() {
                Err(RegistryError::EmptyTopic(frame_id))
            } else {
                Ok(topic.to_string())
            }
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_topic() {
        let binding = Binding::from_record(&BindingRecord::new(1, "none", "a/b")).unwrap();
        assert_eq!(binding.topics(), &["a/b".to_string()]);
        assert_eq!(binding.primary_topic(), "a/b");
    }

    #[test]
    fn test_multiple_topics_keep_order() {
        // Arrange
        let record = BindingRecord::new(7, "motor2ascii", "m/current&m/speed&m/state");

        // Act
        let binding = Binding::from_record(&record).unwrap();

        // Assert
        assert_eq!(binding.topics(), &["m/current", "m/speed", "m/state"]);
        assert_eq!(binding.primary_topic(), "m/current");
        assert_eq!(binding.mode(), ConversionMode::MotorTelemetry);
    }

    #[test]
    fn test_trailing_ampersand_is_tolerated() {
        let binding = Binding::from_record(&BindingRecord::new(1, "none", "a&b&")).unwrap();
        assert_eq!(binding.topics(), &["a", "b"]);
    }

    #[test]
    fn test_segments_are_trimmed() {
        let binding = Binding::from_record(&BindingRecord::new(1, "none", " a & b ")).unwrap();
        assert_eq!(binding.topics(), &["a", "b"]);
    }

    #[test]
    fn test_empty_spec_is_rejected() {
        let err = Binding::from_record(&BindingRecord::new(3, "none", "  ")).unwrap_err();
        assert_eq!(err, RegistryError::EmptyTopicSpec(3));
    }

    #[test]
    fn test_empty_middle_segment_is_rejected() {
        let err = Binding::from_record(&BindingRecord::new(3, "none", "a&&b")).unwrap_err();
        assert_eq!(err, RegistryError::EmptyTopic(3));
    }

    #[test]
    fn test_unknown_mode_falls_back_to_none() {
        let binding = Binding::from_record(&BindingRecord::new(1, "bogus", "a")).unwrap();
        assert_eq!(binding.mode(), ConversionMode::None);
    }

    #[test]
    fn test_extended_id_is_accepted() {
        let binding = Binding::from_record(&BindingRecord::new(CAN_EFF_MASK, "none", "a"));
        assert!(binding.is_ok());
    }

    #[test]
    fn test_id_beyond_29_bits_is_rejected() {
        let err = Binding::from_record(&BindingRecord::new(0x2000_0000, "none", "a")).unwrap_err();
        assert_eq!(err, RegistryError::FrameIdOutOfRange(0x2000_0000));
    }
}
