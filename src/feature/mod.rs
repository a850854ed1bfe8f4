//! Feature codec contract - the typed decode/encode interface every
//! sensor/feature implements.
//!
//! A *feature* is one typed data channel exposed by a device: it decodes raw
//! notification bytes into typed samples ([`FeatureUpdate`]) and encodes
//! typed commands ([`FeatureCommand`]) into wire bytes. The identity of a
//! feature (name, identifier, enable-mask bit) is fixed when the device's
//! feature set is enumerated and lives for the connection's duration.
//!
//! Most simple features speak the generic command/response envelope
//! (see [`envelope`]): byte 0 = feature identifier, byte 1 = command id,
//! remaining bytes = payload. Extended features instead carry their payload
//! inside a segmentation transport (see [`ExtendedFeature`]).

pub mod battery;
pub mod envelope;
pub mod extended;

pub use battery::{BatteryFeature, BatteryReading, BatteryStatus};
pub use extended::ExtendedFeature;

use bytes::Bytes;

use crate::error::Result;

/// Immutable identity and shape of one feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureInfo {
    /// Human-readable name.
    pub name: &'static str,
    /// Wire identifier; byte 0 of the generic command envelope.
    pub identifier: u8,
    /// Bit within the device's feature-enable mask.
    pub mask: u32,
    /// Largest payload one sample of this feature may carry.
    pub max_payload_size: usize,
    /// Whether samples carry a device-side timestamp.
    pub has_timestamp: bool,
    /// Whether the device pushes samples as notifications.
    pub is_notifying: bool,
}

/// One successfully decoded sample of a feature.
///
/// Produced once per decoded frame (or per reassembled multi-frame message),
/// then handed to subscribers and discarded.
#[derive(Debug, Clone)]
pub struct FeatureUpdate<T> {
    /// Sample timestamp (device tick or host clock, caller-defined).
    pub timestamp: u64,
    /// The raw bytes this sample was decoded from.
    pub raw: Bytes,
    /// How many bytes the decode consumed, so a caller iterating multiple
    /// features packed into one notification can advance correctly.
    pub read_bytes: usize,
    /// The decoded payload.
    pub payload: T,
}

/// A named decoded scalar/vector with optional bounds and unit.
///
/// Pure value type with no identity; used to present decoded samples
/// uniformly (e.g. to loggers or UIs).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureField<T> {
    /// Field name.
    pub name: &'static str,
    /// Decoded value.
    pub value: T,
    /// Lower bound the device guarantees, if any.
    pub min: Option<T>,
    /// Upper bound the device guarantees, if any.
    pub max: Option<T>,
    /// Unit symbol, if any.
    pub unit: Option<&'static str>,
}

impl<T> FeatureField<T> {
    /// Create a bare field with no bounds or unit.
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            value,
            min: None,
            max: None,
            unit: None,
        }
    }

    /// Attach bounds.
    pub fn with_range(mut self, min: T, max: T) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Attach a unit symbol.
    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }
}

/// An outbound request targeted at one feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureCommand {
    /// Identifier of the target feature.
    pub feature_id: u8,
    /// Command discriminator byte.
    pub command_id: u8,
    /// Command-specific argument bytes.
    pub args: Bytes,
}

impl FeatureCommand {
    /// Create a command with argument bytes.
    pub fn new(feature_id: u8, command_id: u8, args: impl Into<Bytes>) -> Self {
        Self {
            feature_id,
            command_id,
            args: args.into(),
        }
    }

    /// Create an argument-less command.
    pub fn bare(feature_id: u8, command_id: u8) -> Self {
        Self::new(feature_id, command_id, Bytes::new())
    }
}

/// An inbound, correlated command result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureResponse {
    /// Identifier of the answering feature.
    pub feature_id: u8,
    /// The command id this response answers.
    pub command_id: u8,
    /// Response payload bytes.
    pub payload: Bytes,
}

/// The per-feature decode/encode contract.
///
/// `extract` is mandatory; the command methods default to "no commands
/// supported" / "generic envelope" so simple read-only features implement
/// only the decode path.
pub trait Feature: Send + Sync {
    /// Decoded sample type.
    type Payload: Send;

    /// Identity and shape of this feature.
    fn info(&self) -> &FeatureInfo;

    /// Decode one sample starting at `offset` within `data`.
    ///
    /// Returns `Err(ShortFrame)` if fewer bytes are available than this
    /// feature's minimum frame size - a caller/link contract violation, not
    /// a recoverable condition.
    fn extract(&self, timestamp: u64, data: &[u8], offset: usize)
        -> Result<FeatureUpdate<Self::Payload>>;

    /// Encode a command into wire bytes, or `None` if this feature does not
    /// support the command type. Callers must treat `None` as "unsupported",
    /// not as an error.
    ///
    /// `feature_bit` is this feature's bit in the device's enable mask; some
    /// firmware revisions address commands by mask rather than identifier.
    fn pack_command(&self, feature_bit: u32, command: &FeatureCommand) -> Option<Vec<u8>> {
        let _ = (feature_bit, command);
        None
    }

    /// Decode a raw notification into a typed response, if and only if it
    /// unwraps as a generic command-response envelope *and* its feature
    /// identifier matches this feature. `None` means "not for me" or
    /// malformed; callers must not treat it as fatal.
    fn parse_response(&self, data: &[u8]) -> Option<FeatureResponse> {
        let (feature_id, command_id, payload) = envelope::unpack_response(data)?;
        if feature_id != self.info().identifier {
            return None;
        }
        Some(FeatureResponse {
            feature_id,
            command_id,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}
