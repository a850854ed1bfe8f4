//! Generic-JSON-Split transport for extended features.
//!
//! The current extended-feature transport. Payloads are opaque byte buffers,
//! conventionally UTF-8 JSON with a trailing NUL byte that the *caller*
//! appends on send and strips on receive (this transport never inspects the
//! bytes). The receiver reassembles into a growable buffer; there is no
//! length prefix on the wire.

use bytes::{Bytes, BytesMut};

use super::{chunk_packets, split_header, FrameKind, MIN_MTU};
use crate::error::{GattLinkError, Result};

/// Reassembly state machine for the Generic-JSON-Split profile.
///
/// One instance per extended feature; at most one message in flight.
#[derive(Debug, Default)]
pub struct JsonSplit {
    /// Open accumulation buffer, present between `start` and `end`.
    buffer: Option<BytesMut>,
}

impl JsonSplit {
    /// Create a fresh decoder in the IDLE state.
    pub fn new() -> Self {
        Self { buffer: None }
    }

    /// Split `payload` into MTU-sized packets.
    ///
    /// Every packet reserves one byte for the control header, so the usable
    /// payload per packet is `mtu - 1` and `mtu` must be at least 2. A
    /// payload that fits in one packet is emitted as a single
    /// `start-and-end` packet.
    pub fn encapsulate(payload: &[u8], mtu: usize) -> Result<Vec<Vec<u8>>> {
        if mtu < MIN_MTU {
            return Err(GattLinkError::Protocol(format!(
                "json-split needs mtu >= {MIN_MTU}, got {mtu}"
            )));
        }
        Ok(chunk_packets(payload, mtu, mtu - 1, &[]))
    }

    /// Feed one received packet; returns the complete message once the `end`
    /// (or `start-and-end`) packet arrives.
    ///
    /// A `middle`/`end` packet with no open buffer means a `start` was lost;
    /// the packet is dropped and logged, per the desynchronization policy.
    pub fn decapsulate(&mut self, packet: &[u8]) -> Result<Option<Bytes>> {
        let (kind, rest) = split_header(packet)?;
        match kind {
            FrameKind::Start => {
                if self.buffer.is_some() {
                    tracing::warn!("json-split: start packet while accumulating, dropping previous message");
                }
                self.buffer = Some(BytesMut::from(rest));
                Ok(None)
            }
            FrameKind::StartAndEnd => {
                self.buffer = None;
                Ok(Some(Bytes::copy_from_slice(rest)))
            }
            FrameKind::Middle => {
                match self.buffer.as_mut() {
                    Some(buffer) => buffer.extend_from_slice(rest),
                    None => tracing::warn!("json-split: middle packet with no open buffer, dropped"),
                }
                Ok(None)
            }
            FrameKind::End => match self.buffer.take() {
                Some(mut buffer) => {
                    buffer.extend_from_slice(rest);
                    Ok(Some(buffer.freeze()))
                }
                None => {
                    tracing::warn!("json-split: end packet with no open buffer, dropped");
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
}
