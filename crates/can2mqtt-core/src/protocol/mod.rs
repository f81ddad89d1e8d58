//! Protocol module containing the message shapes and the conversion-mode codecs.

pub mod codec;
pub mod frame;

pub use codec::{ConversionMode, EncodedPayload, ModeSupport, UnknownModeError};
pub use frame::{CanFrame, MqttMessage};
