//! Segmentation transport - carries payloads larger than one link packet.
//!
//! All three profiles share the same 1-byte control header and the same
//! receive state machine (IDLE → ACCUMULATING → emit → IDLE):
//!
//! ```text
//! ┌────────┬─────────────────────────┐
//! │ Header │ Payload                 │
//! │ 1 byte │ up to mtu - 1 bytes     │
//! └────────┴─────────────────────────┘
//! ```
//!
//! - [`LegacySplit`] - fixed-length transport; the first packet carries a
//!   big-endian u16 total-length prefix so receivers can pre-size buffers
//! - [`JsonSplit`] - current extended-feature transport; opaque growable
//!   payload (conventionally NUL-terminated UTF-8 JSON)
//! - [`AudioSplit`] - sized to one PCM-frame-equivalent payload; tracks
//!   cumulative bytes and packet counts for diagnostics
//!
//! Exactly one message may be in flight per transport instance. Interleaved
//! messages on the same instance are unsupported by design; a `middle` or
//! `end` packet with no open buffer is dropped and logged.

mod audio_split;
mod json_split;
mod legacy;

pub use audio_split::AudioSplit;
pub use json_split::JsonSplit;
pub use legacy::LegacySplit;

use crate::error::{GattLinkError, Result};

/// Header byte: first packet of a multi-packet message.
pub const FRAME_START: u8 = 0x00;
/// Header byte: single-packet message (whole payload fits).
pub const FRAME_START_AND_END: u8 = 0x20;
/// Header byte: continuation packet.
pub const FRAME_MIDDLE: u8 = 0x40;
/// Header byte: final packet of a multi-packet message.
pub const FRAME_END: u8 = 0x80;

/// Smallest MTU any profile can frame into (1 header byte + payload).
pub const MIN_MTU: usize = 2;

/// Decoded control header of one transport packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// First packet of a multi-packet message.
    Start,
    /// Single packet carrying a whole message.
    StartAndEnd,
    /// Continuation packet.
    Middle,
    /// Final packet of a multi-packet message.
    End,
}

impl FrameKind {
    /// Decode a header byte. Returns `Err(Protocol)` for unknown values.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            FRAME_START => Ok(FrameKind::Start),
            FRAME_START_AND_END => Ok(FrameKind::StartAndEnd),
            FRAME_MIDDLE => Ok(FrameKind::Middle),
            FRAME_END => Ok(FrameKind::End),
            other => Err(GattLinkError::Protocol(format!(
                "unknown transport header byte 0x{other:02X}"
            ))),
        }
    }

    /// Wire value of this header.
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            FrameKind::Start => FRAME_START,
            FrameKind::StartAndEnd => FRAME_START_AND_END,
            FrameKind::Middle => FRAME_MIDDLE,
            FrameKind::End => FRAME_END,
        }
    }
}

/// Split the header byte off a received packet.
///
/// Empty packets are a contract violation: every packet must carry at least
/// the control header.
pub(crate) fn split_header(packet: &[u8]) -> Result<(FrameKind, &[u8])> {
    let (&header, rest) = packet
        .split_first()
        .ok_or(GattLinkError::ShortFrame {
            expected: 1,
            actual: 0,
            offset: 0,
        })?;
    Ok((FrameKind::from_byte(header)?, rest))
}

/// Chunk `payload` into packets with 1-byte headers.
///
/// `first_capacity` is the usable payload of the first packet (smaller for
/// Legacy-Split, which also carries the length prefix there); every later
/// packet carries up to `mtu - 1` bytes. `first_extra` is prepended to the
/// first packet's payload after the header (empty for the non-legacy
/// profiles).
pub(crate) fn chunk_packets(
    payload: &[u8],
    mtu: usize,
    first_capacity: usize,
    first_extra: &[u8],
) -> Vec<Vec<u8>> {
    debug_assert!(mtu >= MIN_MTU);
    let capacity = mtu - 1;

    if payload.len() <= first_capacity {
        let mut packet = Vec::with_capacity(1 + first_extra.len() + payload.len());
        packet.push(FRAME_START_AND_END);
        packet.extend_from_slice(first_extra);
        packet.extend_from_slice(payload);
        return vec![packet];
    }

    let mut packets = Vec::new();

    let mut packet = Vec::with_capacity(mtu);
    packet.push(FRAME_START);
    packet.extend_from_slice(first_extra);
    packet.extend_from_slice(&payload[..first_capacity]);
    packets.push(packet);

    let mut rest = &payload[first_capacity..];
    while rest.len() > capacity {
        let mut packet = Vec::with_capacity(mtu);
        packet.push(FRAME_MIDDLE);
        packet.extend_from_slice(&rest[..capacity]);
        packets.push(packet);
        rest = &rest[capacity..];
    }

    let mut packet = Vec::with_capacity(1 + rest.len());
    packet.push(FRAME_END);
    packet.extend_from_slice(rest);
    packets.push(packet);

    packets
}
