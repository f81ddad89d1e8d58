//! The two message shapes that cross the bridge.
//!
//! A [`CanFrame`] is what the CAN bus carries: an identifier plus up to eight
//! bytes of payload.  An [`MqttMessage`] is what the broker carries: a topic
//! string plus a textual payload.  Both are short-lived values, created for a
//! single bus event and consumed by the dispatcher.

use std::fmt;

use serde::Serialize;

/// Maximum payload length of a classic CAN frame in bytes.
pub const CAN_MAX_DLEN: usize = 8;

/// Mask of the valid bits of an extended (29-bit) CAN identifier.
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// A classic CAN frame: identifier, data length code, and an 8-byte buffer.
///
/// The buffer is always eight bytes long; only the first `len` bytes carry
/// data.  Bytes past `len` are zero for frames built by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CanFrame {
    /// CAN identifier (11-bit standard or 29-bit extended).
    pub id: u32,
    /// Data length code, `0..=8`.
    pub len: u8,
    /// Payload buffer.  Only `data[..len]` is meaningful.
    pub data: [u8; CAN_MAX_DLEN],
}

impl CanFrame {
    /// Builds a frame from an identifier and a payload slice.
    ///
    /// Payloads longer than eight bytes are truncated.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use can2mqtt_core::CanFrame;
    ///
    /// let frame = CanFrame::new(0x123, &[0xDE, 0xAD]);
    /// assert_eq!(frame.len, 2);
    /// assert_eq!(frame.payload(), &[0xDE, 0xAD]);
    /// ```
    pub fn new(id: u32, payload: &[u8]) -> Self {
        let len = payload.len().min(CAN_MAX_DLEN);
        let mut data = [0u8; CAN_MAX_DLEN];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id,
            len: len as u8,
            data,
        }
    }

    /// Returns the meaningful part of the payload, `data[..len]`.
    ///
    /// A corrupt `len` above eight is clamped rather than panicking.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.dlc()]
    }

    /// Returns the data length code clamped to `0..=8`.
    pub fn dlc(&self) -> usize {
        (self.len as usize).min(CAN_MAX_DLEN)
    }
}

impl fmt::Display for CanFrame {
    /// Formats the frame in candump notation, e.g. `123#DEADBEEF`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03X}#", self.id)?;
        for byte in self.payload() {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// A message on the MQTT side of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MqttMessage {
    /// Full topic name, e.g. `drill/motor/speed`.
    pub topic: String,
    /// Textual payload.
    pub payload: String,
}

impl MqttMessage {
    /// Convenience constructor.
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
