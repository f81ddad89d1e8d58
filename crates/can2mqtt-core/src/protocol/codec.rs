//! Conversion-mode codec table.
//!
//! Every binding names a [`ConversionMode`].  The mode decides how the eight
//! payload bytes of a CAN frame become one or more MQTT text values
//! ([`ConversionMode::decode`]) and how an MQTT text value becomes a CAN
//! payload ([`ConversionMode::encode`]).
//!
//! # Layouts
//!
//! The layouts are deliberately *not* uniform.  Each mode matches a specific
//! piece of field hardware, so two 32-bit modes may disagree on byte order:
//!
//! ```text
//! mode                 decode values   bytes            byte order
//! none                 1               [..len]          raw text
//! uint82ascii          1               [0]              -
//! uint162ascii         1               [0..2]           big-endian
//! uint322ascii         1               [0..4]           little-endian
//! int322ascii          1               [0..4] signed    big-endian
//! uint642ascii         1               [0..8]           little-endian
//! 2uint322ascii        1 ("a b")       [0..4] [4..8]    little-endian
//! 2int322ascii         2               [0..4] [4..8]    big-endian      (decode only)
//! float2ascii          1 ("%.5f")      [0..4] f32       little-endian
//! 2float2ascii         2 ("%.5f")      [0..4] [4..8]    little-endian   (decode only)
//! setup2floats         -               [0..4] [4..8]    little-endian   (encode only)
//! int32int16           -               [0..4] [4..6]    big-endian      (encode only)
//! setup2motor          -               [0..2][2..4][4..6] big-endian    (encode only)
//! motor2ascii          3               [0..2] [2..4] [5]  little-endian (decode only)
//! clock2ascii          1 ("a:b")       [0..4] [4..8]    little-endian   (decode only)
//! bytecolor2colorcode  1 ("#rrggbb")   [..3]            hex
//! pixelbin2ascii       1 ("n #rrggbb") [0] [1..4]       hex
//! ```
//!
//! A mode that only works in one direction falls back to the `none`
//! transform in the other direction.
//!
//! # Failure behaviour
//!
//! Nothing in this module returns an error.  A frame that is too short for
//! its mode decodes to a diagnostic string (see [`malformed_frame_text`]) so
//! MQTT consumers can see that the device sent garbage.  Text that does not
//! parse as a number encodes as zero.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::protocol::frame::{CanFrame, CAN_MAX_DLEN};

/// Returned by [`ConversionMode::from_str`] for a name that is not in the table.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown conversion mode: {0}")]
pub struct UnknownModeError(pub String);

/// Which directions a conversion mode implements natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeSupport {
    /// CAN → MQTT and MQTT → CAN.
    Both,
    /// CAN → MQTT only; encoding uses the `none` transform.
    DecodeOnly,
    /// MQTT → CAN only; decoding uses the `none` transform.
    EncodeOnly,
}

/// A named codec identity.
///
/// The serialized form (and the name used in binding tables) is the wire
/// name, e.g. `"uint162ascii"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConversionMode {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "uint82ascii")]
    Uint8,
    #[serde(rename = "uint162ascii")]
    Uint16,
    #[serde(rename = "uint322ascii")]
    Uint32,
    #[serde(rename = "int322ascii")]
    Int32,
    #[serde(rename = "uint642ascii")]
    Uint64,
    #[serde(rename = "2uint322ascii")]
    TwoUint32,
    #[serde(rename = "2int322ascii")]
    TwoInt32,
    #[serde(rename = "float2ascii")]
    Float,
    #[serde(rename = "2float2ascii")]
    TwoFloat,
    #[serde(rename = "setup2floats")]
    SetupTwoFloats,
    #[serde(rename = "int32int16")]
    Int32Int16,
    #[serde(rename = "setup2motor")]
    SetupMotor,
    #[serde(rename = "motor2ascii")]
    MotorTelemetry,
    #[serde(rename = "clock2ascii")]
    Clock,
    #[serde(rename = "bytecolor2colorcode")]
    ColorCode,
    #[serde(rename = "pixelbin2ascii")]
    Pixel,
}

/// An encoded CAN payload: the 8-byte buffer and its data length code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedPayload {
    pub data: [u8; CAN_MAX_DLEN],
    pub len: u8,
}

impl EncodedPayload {
    /// Full 8-byte frame; every typed mode sends this length.
    fn full(data: [u8; CAN_MAX_DLEN]) -> Self {
        Self {
            data,
            len: CAN_MAX_DLEN as u8,
        }
    }

    /// Attaches a CAN identifier, producing a sendable frame.
    pub fn into_frame(self, id: u32) -> CanFrame {
        CanFrame {
            id,
            len: self.len,
            data: self.data,
        }
    }

    /// Returns the meaningful bytes, `data[..len]`.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..(self.len as usize).min(CAN_MAX_DLEN)]
    }
}

/// Diagnostic text published when a frame is shorter than its mode requires.
///
/// ```rust
/// use can2mqtt_core::protocol::codec::malformed_frame_text;
///
/// assert_eq!(malformed_frame_text(2), "Err in CAN-Frame, data must be 2 bytes.");
/// ```
pub fn malformed_frame_text(width: usize) -> String {
    format!("Err in CAN-Frame, data must be {width} bytes.")
}

impl ConversionMode {
    /// Every mode in the table, in documentation order.
    pub const ALL: [ConversionMode; 17] = [
        ConversionMode::None,
        ConversionMode::Uint8,
        ConversionMode::Uint16,
        ConversionMode::Uint32,
        ConversionMode::Int32,
        ConversionMode::Uint64,
        ConversionMode::TwoUint32,
        ConversionMode::TwoInt32,
        ConversionMode::Float,
        ConversionMode::TwoFloat,
        ConversionMode::SetupTwoFloats,
        ConversionMode::Int32Int16,
        ConversionMode::SetupMotor,
        ConversionMode::MotorTelemetry,
        ConversionMode::Clock,
        ConversionMode::ColorCode,
        ConversionMode::Pixel,
    ];

    /// Returns the wire name used in binding tables.
    pub const fn name(self) -> &'static str {
        match self {
            ConversionMode::None => "none",
            ConversionMode::Uint8 => "uint82ascii",
            ConversionMode::Uint16 => "uint162ascii",
            ConversionMode::Uint32 => "uint322ascii",
            ConversionMode::Int32 => "int322ascii",
            ConversionMode::Uint64 => "uint642ascii",
            ConversionMode::TwoUint32 => "2uint322ascii",
            ConversionMode::TwoInt32 => "2int322ascii",
            ConversionMode::Float => "float2ascii",
            ConversionMode::TwoFloat => "2float2ascii",
            ConversionMode::SetupTwoFloats => "setup2floats",
            ConversionMode::Int32Int16 => "int32int16",
            ConversionMode::SetupMotor => "setup2motor",
            ConversionMode::MotorTelemetry => "motor2ascii",
            ConversionMode::Clock => "clock2ascii",
            ConversionMode::ColorCode => "bytecolor2colorcode",
            ConversionMode::Pixel => "pixelbin2ascii",
        }
    }

    /// Which directions this mode implements natively.
    pub const fn support(self) -> ModeSupport {
        match self {
            ConversionMode::TwoInt32
            | ConversionMode::TwoFloat
            | ConversionMode::MotorTelemetry
            | ConversionMode::Clock => ModeSupport::DecodeOnly,
            ConversionMode::SetupTwoFloats
            | ConversionMode::Int32Int16
            | ConversionMode::SetupMotor => ModeSupport::EncodeOnly,
            _ => ModeSupport::Both,
        }
    }

    /// Minimum number of payload bytes [`decode`](Self::decode) needs.
    ///
    /// Modes that decode through the `none` transform accept any length.
    pub const fn decode_width(self) -> usize {
        match self {
            ConversionMode::Uint8 => 1,
            ConversionMode::Uint16 | ConversionMode::ColorCode => 2,
            ConversionMode::Uint32 | ConversionMode::Int32 | ConversionMode::Float => 4,
            ConversionMode::Pixel => 4,
            ConversionMode::MotorTelemetry => 6,
            ConversionMode::Uint64
            | ConversionMode::TwoUint32
            | ConversionMode::TwoInt32
            | ConversionMode::TwoFloat
            | ConversionMode::Clock => 8,
            ConversionMode::None
            | ConversionMode::SetupTwoFloats
            | ConversionMode::Int32Int16
            | ConversionMode::SetupMotor => 0,
        }
    }

    /// Resolves a binding-table mode name, falling back to [`ConversionMode::None`].
    ///
    /// An unknown name is not fatal: the bridge keeps running and passes the
    /// payload through as raw text.  A warning is logged so the typo can be
    /// found.
    pub fn from_name_or_fallback(name: &str) -> Self {
        match name.parse() {
            Ok(mode) => mode,
            Err(UnknownModeError(unknown)) => {
                warn!("conversion mode {unknown:?} not found, using fallback \"none\"");
                ConversionMode::None
            }
        }
    }

    // ── CAN → MQTT ────────────────────────────────────────────────────────────

    /// Decodes a CAN payload into text values, one per bound topic.
    ///
    /// `payload` is the meaningful part of the frame (`data[..len]`).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use can2mqtt_core::ConversionMode;
    ///
    /// assert_eq!(ConversionMode::Uint16.decode(&[0x00, 0x2A]), vec!["42"]);
    /// assert_eq!(
    ///     ConversionMode::Float.decode(&[0x00, 0x00, 0x80, 0x3F]),
    ///     vec!["1.00000"]
    /// );
    /// ```
    pub fn decode(self, payload: &[u8]) -> Vec<String> {
        let width = self.decode_width();
        if payload.len() < width {
            return vec![malformed_frame_text(width)];
        }

        match self {
            ConversionMode::None
            | ConversionMode::SetupTwoFloats
            | ConversionMode::Int32Int16
            | ConversionMode::SetupMotor => vec![bytes_to_text(payload)],
            ConversionMode::Uint8 => vec![payload[0].to_string()],
            ConversionMode::Uint16 => vec![u16::from_be_bytes(take(payload, 0)).to_string()],
            ConversionMode::Uint32 => vec![u32::from_le_bytes(take(payload, 0)).to_string()],
            ConversionMode::Int32 => vec![i32::from_be_bytes(take(payload, 0)).to_string()],
            ConversionMode::Uint64 => vec![u64::from_le_bytes(take(payload, 0)).to_string()],
            ConversionMode::TwoUint32 => vec![format!(
                "{} {}",
                u32::from_le_bytes(take(payload, 0)),
                u32::from_le_bytes(take(payload, 4))
            )],
            ConversionMode::TwoInt32 => vec![
                i32::from_be_bytes(take(payload, 0)).to_string(),
                i32::from_be_bytes(take(payload, 4)).to_string(),
            ],
            ConversionMode::Float => vec![format_float(f32::from_le_bytes(take(payload, 0)))],
            ConversionMode::TwoFloat => vec![
                format_float(f32::from_le_bytes(take(payload, 0))),
                format_float(f32::from_le_bytes(take(payload, 4))),
            ],
            ConversionMode::MotorTelemetry => vec![
                i16::from_le_bytes(take(payload, 0)).to_string(),
                i16::from_le_bytes(take(payload, 2)).to_string(),
                payload[5].to_string(),
            ],
            ConversionMode::Clock => vec![format!(
                "{}:{}",
                u32::from_le_bytes(take(payload, 0)),
                u32::from_le_bytes(take(payload, 4))
            )],
            ConversionMode::ColorCode => {
                vec![color_code(&payload[..payload.len().min(COLOR_BYTES)])]
            }
            ConversionMode::Pixel => vec![format!("{} {}", payload[0], color_code(&payload[1..4]))],
        }
    }

    // ── MQTT → CAN ────────────────────────────────────────────────────────────

    /// Encodes an MQTT text value into a CAN payload.
    ///
    /// Multi-field modes expect whitespace-separated fields; missing or
    /// unparseable fields encode as zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use can2mqtt_core::ConversionMode;
    ///
    /// let encoded = ConversionMode::Uint16.encode("42");
    /// assert_eq!(&encoded.data[..2], &[0x00, 0x2A]);
    /// ```
    pub fn encode(self, text: &str) -> EncodedPayload {
        let mut data = [0u8; CAN_MAX_DLEN];
        match self {
            ConversionMode::None
            | ConversionMode::TwoInt32
            | ConversionMode::TwoFloat
            | ConversionMode::MotorTelemetry
            | ConversionMode::Clock => return text_to_bytes(text),
            ConversionMode::Uint8 => data[0] = parse_int(text) as u8,
            ConversionMode::Uint16 => put(&mut data, 0, &(parse_int(text) as u16).to_be_bytes()),
            ConversionMode::Uint32 => put(&mut data, 0, &(parse_int(text) as u32).to_le_bytes()),
            ConversionMode::Int32 => put(&mut data, 0, &(parse_int(text) as i32).to_be_bytes()),
            ConversionMode::Uint64 => put(&mut data, 0, &(parse_int(text) as u64).to_le_bytes()),
            ConversionMode::TwoUint32 => {
                let [a, b] = fields(text);
                put(&mut data, 0, &(parse_int(a) as u32).to_le_bytes());
                put(&mut data, 4, &(parse_int(b) as u32).to_le_bytes());
            }
            ConversionMode::Float => put(&mut data, 0, &parse_float(text).to_le_bytes()),
            ConversionMode::SetupTwoFloats => {
                let [a, b] = fields(text);
                put(&mut data, 0, &parse_float(a).to_le_bytes());
                put(&mut data, 4, &parse_float(b).to_le_bytes());
            }
            ConversionMode::Int32Int16 => {
                let [a, b] = fields(text);
                put(&mut data, 0, &(parse_int(a) as i32).to_be_bytes());
                put(&mut data, 4, &(parse_int(b) as i16).to_be_bytes());
            }
            ConversionMode::SetupMotor => {
                let [a, b, c] = fields(text);
                put(&mut data, 0, &(parse_int(a) as i16).to_be_bytes());
                put(&mut data, 2, &(parse_int(b) as i16).to_be_bytes());
                put(&mut data, 4, &(parse_int(c) as i16).to_be_bytes());
            }
            ConversionMode::ColorCode => {
                let color = parse_color(text);
                put(&mut data, 0, &color);
                return EncodedPayload {
                    data,
                    len: COLOR_BYTES as u8,
                };
            }
            ConversionMode::Pixel => {
                let [index, color] = fields(text);
                data[0] = parse_int(index) as u8;
                put(&mut data, 1, &parse_color(color));
                return EncodedPayload { data, len: 4 };
            }
        }
        EncodedPayload::full(data)
    }
}

impl FromStr for ConversionMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        ConversionMode::ALL
            .into_iter()
            .find(|mode| mode.name() == name)
            .ok_or_else(|| UnknownModeError(name.to_string()))
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Number of bytes in an `#rrggbb` colour.
const COLOR_BYTES: usize = 3;

/// Copies `N` bytes starting at `offset` into an array.
///
/// Callers have already checked the payload against `decode_width`.
fn take<const N: usize>(payload: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&payload[offset..offset + N]);
    out
}

fn put(data: &mut [u8; CAN_MAX_DLEN], offset: usize, bytes: &[u8]) {
    data[offset..offset + bytes.len()].copy_from_slice(bytes);
}

/// Splits `text` on whitespace into exactly `N` fields, padding with `""`.
fn fields<const N: usize>(text: &str) -> [&str; N] {
    let mut out = [""; N];
    for (slot, field) in out.iter_mut().zip(text.split_whitespace()) {
        *slot = field;
    }
    out
}

/// Parses a decimal integer, returning 0 on failure.
///
/// The wide intermediate lets callers truncate with `as` to the field width,
/// so `"-1"` encodes as `0xFFFF` in a 16-bit field and the full `u64` range
/// is representable.
fn parse_int(text: &str) -> i128 {
    text.trim().parse().unwrap_or(0)
}

fn parse_float(text: &str) -> f32 {
    text.trim().parse().unwrap_or(0.0)
}

fn format_float(value: f32) -> String {
    format!("{value:.5}")
}

fn bytes_to_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

/// The `none` encoder: the first eight bytes of the text, DLC = bytes copied.
fn text_to_bytes(text: &str) -> EncodedPayload {
    let bytes = text.as_bytes();
    let len = bytes.len().min(CAN_MAX_DLEN);
    let mut data = [0u8; CAN_MAX_DLEN];
    data[..len].copy_from_slice(&bytes[..len]);
    EncodedPayload {
        data,
        len: len as u8,
    }
}

fn color_code(bytes: &[u8]) -> String {
    format!("#{}", hex::encode(bytes))
}

/// Parses `#rrggbb` (or `#rrgg`) into three bytes; anything else is black.
fn parse_color(text: &str) -> [u8; COLOR_BYTES] {
    let mut out = [0u8; COLOR_BYTES];
    match hex::decode(text.trim().trim_start_matches('#')) {
        Ok(bytes) if (2..=COLOR_BYTES).contains(&bytes.len()) => {
            out[..bytes.len()].copy_from_slice(&bytes);
        }
        _ => {}
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
