//! Generic command/response envelope.
//!
//! The wire format used by the majority of simple features:
//!
//! ```text
//! ┌────────────┬────────────┬──────────────┐
//! │ Feature ID │ Command ID │ Payload      │
//! │ 1 byte     │ 1 byte     │ 0..N bytes   │
//! └────────────┴────────────┴──────────────┘
//! ```
//!
//! This envelope is orthogonal to, and nests inside, the segmentation
//! transport framing used by extended features.

/// Envelope header size: feature id + command id.
pub const ENVELOPE_HEADER_SIZE: usize = 2;

/// Build a command request: `[feature_id, command_id, args...]`.
pub fn pack_request(feature_id: u8, command_id: u8, args: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENVELOPE_HEADER_SIZE + args.len());
    out.push(feature_id);
    out.push(command_id);
    out.extend_from_slice(args);
    out
}

/// Unwrap a command response into `(feature_id, command_id, payload)`.
///
/// Returns `None` if the buffer is too short to carry the envelope header.
pub fn unpack_response(data: &[u8]) -> Option<(u8, u8, &[u8])> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return None;
    }
    Some((data[0], data[1], &data[ENVELOPE_HEADER_SIZE..]))
}
