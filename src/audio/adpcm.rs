//! IMA ADPCM codec.
//!
//! 4 bits per sample against the standard IMA step/index tables. The device
//! can re-synchronize a drifted decoder by pushing its current step index
//! and predicted sample through the configuration feature (see
//! [`AudioControl::AdpcmSync`](super::params::AudioControl)).

use super::params::AudioParams;
use super::AudioCodec;
use crate::error::{GattLinkError, Result};

/// Standard IMA ADPCM step-size table.
const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

/// Standard IMA ADPCM index-adjust table (low 3 bits of the nibble).
const INDEX_TABLE: [i8; 8] = [-1, -1, -1, -1, 2, 4, 6, 8];

/// Per-direction codec state: step-table index and predicted sample.
#[derive(Debug, Clone, Copy, Default)]
struct AdpcmState {
    index: i32,
    predicted: i32,
}

impl AdpcmState {
    /// Decode one 4-bit nibble into the next PCM sample.
    fn decode_nibble(&mut self, nibble: u8) -> i16 {
        let step = STEP_TABLE[self.index as usize];

        // Reconstruct the difference: step/8 + bit-weighted step fractions.
        let mut diff = step >> 3;
        if nibble & 0x1 != 0 {
            diff += step >> 2;
        }
        if nibble & 0x2 != 0 {
            diff += step >> 1;
        }
        if nibble & 0x4 != 0 {
            diff += step;
        }
        if nibble & 0x8 != 0 {
            self.predicted -= diff;
        } else {
            self.predicted += diff;
        }
        self.predicted = self.predicted.clamp(i16::MIN as i32, i16::MAX as i32);

        self.index += INDEX_TABLE[(nibble & 0x7) as usize] as i32;
        self.index = self.index.clamp(0, (STEP_TABLE.len() - 1) as i32);

        self.predicted as i16
    }

    /// Encode one PCM sample into a 4-bit nibble, updating prediction.
    fn encode_sample(&mut self, sample: i16) -> u8 {
        let step = STEP_TABLE[self.index as usize];
        let mut diff = sample as i32 - self.predicted;

        let mut nibble: u8 = 0;
        if diff < 0 {
            nibble |= 0x8;
            diff = -diff;
        }
        if diff >= step {
            nibble |= 0x4;
            diff -= step;
        }
        if diff >= step >> 1 {
            nibble |= 0x2;
            diff -= step >> 1;
        }
        if diff >= step >> 2 {
            nibble |= 0x1;
        }

        // Run the decoder update so encoder and decoder prediction track.
        self.decode_nibble(nibble);
        nibble
    }
}

/// IMA ADPCM implementation of [`AudioCodec`].
#[derive(Debug, Default)]
pub struct AdpcmCodec {
    decode_state: AdpcmState,
    encode_state: AdpcmState,
    samples_per_frame: usize,
}

impl AdpcmCodec {
    /// Create an unsynchronized codec; call [`configure`](AudioCodec::configure)
    /// before use.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioCodec for AdpcmCodec {
    fn configure(&mut self, params: &AudioParams) {
        self.samples_per_frame = params.samples_per_frame;
        self.decode_state = AdpcmState::default();
        self.encode_state = AdpcmState::default();
    }

    fn sync(&mut self, step_index: u8, predicted_sample: i16) {
        self.decode_state.index = (step_index as i32).clamp(0, (STEP_TABLE.len() - 1) as i32);
        self.decode_state.predicted = predicted_sample as i32;
    }

    fn decode(&mut self, data: &[u8], out: &mut Vec<i16>) -> Result<usize> {
        if self.samples_per_frame == 0 {
            return Err(GattLinkError::Codec("codec not configured".into()));
        }
        let expected = self.samples_per_frame.div_ceil(2);
        if data.len() != expected {
            return Err(GattLinkError::Codec(format!(
                "ADPCM frame of {} bytes, expected {expected}",
                data.len()
            )));
        }

        out.clear();
        for &byte in data {
            out.push(self.decode_state.decode_nibble(byte & 0x0F));
            if out.len() < self.samples_per_frame {
                out.push(self.decode_state.decode_nibble(byte >> 4));
            }
        }
        Ok(out.len())
    }

    fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) -> Result<usize> {
        if self.samples_per_frame == 0 {
            return Err(GattLinkError::Codec("codec not configured".into()));
        }
        if pcm.len() != self.samples_per_frame {
            return Err(GattLinkError::Codec(format!(
                "PCM frame of {} samples, expected {}",
                pcm.len(),
                self.samples_per_frame
            )));
        }

        out.clear();
        let mut pending: Option<u8> = None;
        for &sample in pcm {
            let nibble = self.encode_state.encode_sample(sample);
            match pending.take() {
                None => pending = Some(nibble),
                Some(low) => out.push(low | (nibble << 4)),
            }
        }
        if let Some(low) = pending {
            out.push(low);
        }
        Ok(out.len())
    }
}
