//! Audio-Split transport.
//!
//! Same framing as [`JsonSplit`](super::JsonSplit) but sized to exactly one
//! compressed PCM-frame-equivalent payload per message, and instrumented:
//! it tracks cumulative bytes and packet counts so a streaming session can
//! report loss/throughput diagnostics.

use bytes::{Bytes, BytesMut};

use super::{chunk_packets, split_header, FrameKind, MIN_MTU};
use crate::error::{GattLinkError, Result};

/// Reassembly state machine for the Audio-Split profile.
#[derive(Debug, Default)]
pub struct AudioSplit {
    /// Open accumulation buffer, present between `start` and `end`.
    buffer: Option<BytesMut>,
    /// Payload bytes received since creation or [`reset_stats`](Self::reset_stats).
    bytes_received: u64,
    /// Packets received since creation or [`reset_stats`](Self::reset_stats).
    packets_received: u64,
}

impl AudioSplit {
    /// Create a fresh decoder in the IDLE state with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Split one compressed audio frame into MTU-sized packets.
    ///
    /// `mtu` must be at least 2 (header byte + one payload byte).
    pub fn encapsulate(payload: &[u8], mtu: usize) -> Result<Vec<Vec<u8>>> {
        if mtu < MIN_MTU {
            return Err(GattLinkError::Protocol(format!(
                "audio-split needs mtu >= {MIN_MTU}, got {mtu}"
            )));
        }
        Ok(chunk_packets(payload, mtu, mtu - 1, &[]))
    }

    /// Feed one received packet; returns the complete frame once the `end`
    /// (or `start-and-end`) packet arrives.
    pub fn decapsulate(&mut self, packet: &[u8]) -> Result<Option<Bytes>> {
        let (kind, rest) = split_header(packet)?;
        self.packets_received += 1;
        self.bytes_received += rest.len() as u64;

        match kind {
            FrameKind::Start => {
                if self.buffer.is_some() {
                    tracing::warn!("audio-split: start packet while accumulating, dropping previous frame");
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
                    None => {
                        tracing::warn!("audio-split: middle packet with no open buffer, dropped")
                    }
                }
                Ok(None)
            }
            FrameKind::End => match self.buffer.take() {
                Some(mut buffer) => {
                    buffer.extend_from_slice(rest);
                    Ok(Some(buffer.freeze()))
                }
                None => {
                    tracing::warn!("audio-split: end packet with no open buffer, dropped");
                    Ok(None)
                }
            },
        }
    }

    /// Discard any open accumulation buffer and return to IDLE.
    ///
    /// Counters are kept; use [`reset_stats`](Self::reset_stats) to zero them.
    pub fn reset(&mut self) {
        self.buffer = None;
    }

    /// Zero the diagnostic counters.
    pub fn reset_stats(&mut self) {
        self.bytes_received = 0;
        self.packets_received = 0;
    }

    /// Payload bytes received so far.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Packets received so far.
    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    /// True if a frame is currently being accumulated.
    pub fn is_accumulating(&self) -> bool {
        self.buffer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{FRAME_END, FRAME_MIDDLE, FRAME_START, FRAME_START_AND_END};

    #[test]
    fn test_split_shape_mtu_3() {
        let packets = AudioSplit::encapsulate(&[10, 20, 30], 3).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0], vec![FRAME_START, 10, 20]);
        assert_eq!(packets[1], vec![FRAME_END, 30]);
    }

    #[test]
    fn test_split_shape_mtu_2() {
        let packets = AudioSplit::encapsulate(&[10, 20, 30], 2).unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0], vec![FRAME_START, 10]);
        assert_eq!(packets[1], vec![FRAME_MIDDLE, 20]);
        assert_eq!(packets[2], vec![FRAME_END, 30]);
    }

    #[test]
    fn test_single_packet_shape() {
        // len(B) <= mtu - 1 yields exactly one 0x20 packet with B unchanged.
        let packets = AudioSplit::encapsulate(&[1, 2], 3).unwrap();
        assert_eq!(packets, vec![vec![FRAME_START_AND_END, 1, 2]]);
    }

    #[test]
    fn test_mtu_below_minimum_rejected() {
        assert!(AudioSplit::encapsulate(&[1, 2, 3], 1).is_err());
        assert!(AudioSplit::encapsulate(&[], 0).is_err());
    }

    #[test]
    fn test_incremental_reassembly() {
        let mut split = AudioSplit::new();
        assert!(split.decapsulate(&[FRAME_START, 0x01, 0x02]).unwrap().is_none());
        let out = split.decapsulate(&[FRAME_END, 0x03]).unwrap().unwrap();
        assert_eq!(&out[..], &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_roundtrip_all_mtus_from_3() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(960).collect();
        for mtu in 3usize..=32 {
            let packets = AudioSplit::encapsulate(&payload, mtu).unwrap();
            let mut split = AudioSplit::new();
            let mut emitted = None;
            for packet in &packets {
                assert!(packet.len() <= mtu);
                if let Some(out) = split.decapsulate(packet).unwrap() {
                    emitted = Some(out);
                }
            }
            assert_eq!(&emitted.unwrap()[..], &payload[..], "mtu {mtu}");
        }
    }

    #[test]
    fn test_idempotent_reset_after_emit() {
        let mut split = AudioSplit::new();
        split.decapsulate(&[FRAME_START, 1]).unwrap();
        split.decapsulate(&[FRAME_END, 2]).unwrap();

        // Fresh IDLE state: an unrelated message decodes correctly.
        let out = split
            .decapsulate(&[FRAME_START_AND_END, 7, 8, 9])
            .unwrap()
            .unwrap();
        assert_eq!(&out[..], &[7, 8, 9]);
    }

    #[test]
    fn test_diagnostic_counters() {
        let mut split = AudioSplit::new();
        split.decapsulate(&[FRAME_START, 1, 2]).unwrap();
        split.decapsulate(&[FRAME_END, 3]).unwrap();

        assert_eq!(split.packets_received(), 2);
        assert_eq!(split.bytes_received(), 3);

        split.reset_stats();
        assert_eq!(split.packets_received(), 0);
        assert_eq!(split.bytes_received(), 0);
    }

    #[test]
    fn test_desync_counted_but_dropped() {
        let mut split = AudioSplit::new();
        assert!(split.decapsulate(&[FRAME_MIDDLE, 1, 2]).unwrap().is_none());
        // Still counted for loss diagnostics.
        assert_eq!(split.packets_received(), 1);
        assert_eq!(split.bytes_received(), 2);
        assert!(!split.is_accumulating());
    }
}
