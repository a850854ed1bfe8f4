//! Legacy-Split transport.
//!
//! Predates the current protocol revision: the total message length is fixed
//! up front. The first packet (whether `start` or `start-and-end`) carries a
//! big-endian u16 total-length prefix right after the control header, so a
//! receiver can pre-size its reassembly buffer. The prefix costs 2 bytes of
//! first-packet capacity; later packets carry the usual `mtu - 1` bytes.

use bytes::{Bytes, BytesMut};

use super::{chunk_packets, split_header, FrameKind};
use crate::error::{GattLinkError, Result};

/// Bytes of first-packet payload consumed by the length prefix.
const LENGTH_PREFIX_SIZE: usize = 2;

/// Reassembly state machine for the Legacy-Split profile.
#[derive(Debug, Default)]
pub struct LegacySplit {
    /// Open accumulation buffer plus the declared total length.
    buffer: Option<(BytesMut, usize)>,
}

impl LegacySplit {
    /// Create a fresh decoder in the IDLE state.
    pub fn new() -> Self {
        Self { buffer: None }
    }

    /// Split `payload` into MTU-sized packets with the length prefix on the
    /// first packet.
    ///
    /// The payload must fit in a u16 length field. Requires `mtu >= 4` so the
    /// first packet has room for header + prefix + at least one payload byte.
    pub fn encapsulate(payload: &[u8], mtu: usize) -> Result<Vec<Vec<u8>>> {
        if payload.len() > u16::MAX as usize {
            return Err(GattLinkError::Protocol(format!(
                "legacy-split payload of {} bytes exceeds u16 length field",
                payload.len()
            )));
        }
        if mtu < 1 + LENGTH_PREFIX_SIZE + 1 {
            return Err(GattLinkError::Protocol(format!(
                "legacy-split needs mtu >= 4, got {mtu}"
            )));
        }
        let prefix = (payload.len() as u16).to_be_bytes();
        Ok(chunk_packets(
            payload,
            mtu,
            mtu - 1 - LENGTH_PREFIX_SIZE,
            &prefix,
        ))
    }

    /// Feed one received packet; returns the complete message once the final
    /// packet arrives.
    ///
    /// A completed message whose size disagrees with the declared length
    /// prefix is corrupt and dropped (logged). Desynchronized `middle`/`end`
    /// packets are dropped and logged, same as the other profiles.
    pub fn decapsulate(&mut self, packet: &[u8]) -> Result<Option<Bytes>> {
        let (kind, rest) = split_header(packet)?;
        match kind {
            FrameKind::Start | FrameKind::StartAndEnd => {
                if self.buffer.is_some() {
                    tracing::warn!("legacy-split: start packet while accumulating, dropping previous message");
                    self.buffer = None;
                }
                if rest.len() < LENGTH_PREFIX_SIZE {
                    return Err(GattLinkError::ShortFrame {
                        expected: LENGTH_PREFIX_SIZE,
                        actual: rest.len(),
                        offset: 1,
                    });
                }
                let total = u16::from_be_bytes([rest[0], rest[1]]) as usize;
                let body = &rest[LENGTH_PREFIX_SIZE..];

                if kind == FrameKind::StartAndEnd {
                    return Ok(Self::finish(BytesMut::from(body), total));
                }

                let mut buffer = BytesMut::with_capacity(total);
                buffer.extend_from_slice(body);
                self.buffer = Some((buffer, total));
                Ok(None)
            }
            FrameKind::Middle => {
                match self.buffer.as_mut() {
                    Some((buffer, _)) => buffer.extend_from_slice(rest),
                    None => {
                        tracing::warn!("legacy-split: middle packet with no open buffer, dropped")
                    }
                }
                Ok(None)
            }
            FrameKind::End => match self.buffer.take() {
                Some((mut buffer, total)) => {
                    buffer.extend_from_slice(rest);
                    Ok(Self::finish(buffer, total))
                }
                None => {
                    tracing::warn!("legacy-split: end packet with no open buffer, dropped");
                    Ok(None)
                }
            },
        }
    }

    /// Discard any open accumulation buffer and return to IDLE.
    pub fn reset(&mut self) {
        self.buffer = None;
    }

    /// True if a message is currently being accumulated.
    pub fn is_accumulating(&self) -> bool {
        self.buffer.is_some()
    }

    fn finish(buffer: BytesMut, declared: usize) -> Option<Bytes> {
        if buffer.len() != declared {
            tracing::warn!(
                declared,
                received = buffer.len(),
                "legacy-split: length prefix mismatch, dropping message"
            );
            return None;
        }
        Some(buffer.freeze())
    }
}
