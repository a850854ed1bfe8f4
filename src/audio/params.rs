//! Audio codec parameters and the configuration feature.
//!
//! Codec parameters arrive as fixed little-endian records on a dedicated
//! configuration feature; each record re-parameterizes the codec pipeline:
//!
//! ```text
//! 2 bytes: [codec index][on/off]                         Toggle
//! 4 bytes: [frame code][rate code][channels][on/off]     Configure
//! 6 bytes: [codec index][step index][predicted i16 LE][reserved]  AdpcmSync
//! ```

use bytes::Bytes;

use crate::feature::{Feature, FeatureInfo, FeatureUpdate};
use crate::error::{GattLinkError, Result};

/// Which compressed codec the stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// IMA ADPCM, 4 bits per sample.
    Adpcm,
    /// Opus (pluggable; not bundled in this crate).
    Opus,
}

impl CodecKind {
    /// Decode the codec-index byte.
    pub fn from_index(index: u8) -> Result<Self> {
        match index {
            0 => Ok(CodecKind::Adpcm),
            1 => Ok(CodecKind::Opus),
            other => Err(GattLinkError::Protocol(format!(
                "unknown codec index {other}"
            ))),
        }
    }
}

/// Decode the sample-rate enumeration byte into Hz.
pub fn sample_rate_hz(code: u8) -> Result<u32> {
    match code {
        0 => Ok(8_000),
        1 => Ok(16_000),
        2 => Ok(32_000),
        3 => Ok(48_000),
        other => Err(GattLinkError::Protocol(format!(
            "unknown sample-rate code {other}"
        ))),
    }
}

/// Decode the frame-size enumeration byte into samples per frame.
pub fn samples_per_frame(code: u8) -> Result<usize> {
    match code {
        0 => Ok(40),
        1 => Ok(80),
        2 => Ok(160),
        3 => Ok(320),
        4 => Ok(960),
        other => Err(GattLinkError::Protocol(format!(
            "unknown frame-size code {other}"
        ))),
    }
}

/// Full codec parameterization of the audio stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioParams {
    /// Active codec.
    pub codec: CodecKind,
    /// PCM sample rate.
    pub sample_rate_hz: u32,
    /// Channel count.
    pub channels: u8,
    /// PCM samples per compressed frame.
    pub samples_per_frame: usize,
    /// Whether streaming is currently on.
    pub enabled: bool,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            codec: CodecKind::Adpcm,
            sample_rate_hz: 8_000,
            channels: 1,
            samples_per_frame: 40,
            enabled: false,
        }
    }
}

/// One decoded configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioControl {
    /// Streaming on/off for a codec (2-byte record).
    Toggle {
        /// Selected codec.
        codec: CodecKind,
        /// Streaming enabled.
        enabled: bool,
    },
    /// Stream reconfiguration (4-byte record); the codec selection is
    /// carried separately by [`AudioControl::Toggle`].
    Configure {
        /// PCM samples per compressed frame.
        samples_per_frame: usize,
        /// PCM sample rate.
        sample_rate_hz: u32,
        /// Channel count.
        channels: u8,
        /// Streaming enabled.
        enabled: bool,
    },
    /// ADPCM decoder state injection (6-byte record).
    AdpcmSync {
        /// Step-table index.
        step_index: u8,
        /// Predicted sample.
        predicted_sample: i16,
    },
}

/// The audio configuration feature: decodes [`AudioControl`] records.
#[derive(Debug)]
pub struct AudioConfigFeature {
    info: FeatureInfo,
}

impl AudioConfigFeature {
    /// Create the configuration feature with its standard identity.
    pub fn new() -> Self {
        Self {
            info: FeatureInfo {
                name: "AudioSyncConf",
                identifier: 0x09,
                mask: 1 << 22,
                max_payload_size: 6,
                has_timestamp: false,
                is_notifying: true,
            },
        }
    }
}

impl Default for AudioConfigFeature {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for AudioConfigFeature {
    type Payload = AudioControl;

    fn info(&self) -> &FeatureInfo {
        &self.info
    }

    fn extract(
        &self,
        timestamp: u64,
        data: &[u8],
        offset: usize,
    ) -> Result<FeatureUpdate<AudioControl>> {
        let available = data.len().saturating_sub(offset);
        if available < 2 {
            return Err(GattLinkError::ShortFrame {
                expected: 2,
                actual: available,
                offset,
            });
        }

        let record = &data[offset..];
        let (control, read_bytes) = match record.len() {
            2 => (
                AudioControl::Toggle {
                    codec: CodecKind::from_index(record[0])?,
                    enabled: record[1] != 0,
                },
                2,
            ),
            4 => (
                AudioControl::Configure {
                    samples_per_frame: samples_per_frame(record[0])?,
                    sample_rate_hz: sample_rate_hz(record[1])?,
                    channels: record[2],
                    enabled: record[3] != 0,
                },
                4,
            ),
            6 => {
                // Codec index validated even though sync only applies to ADPCM.
                let codec = CodecKind::from_index(record[0])?;
                if codec != CodecKind::Adpcm {
                    return Err(GattLinkError::Protocol(
                        "sync record for non-ADPCM codec".into(),
                    ));
                }
                (
                    AudioControl::AdpcmSync {
                        step_index: record[1],
                        predicted_sample: i16::from_le_bytes([record[2], record[3]]),
                    },
                    6,
                )
            }
            other => {
                return Err(GattLinkError::Protocol(format!(
                    "audio config record of {other} bytes"
                )))
            }
        };

        Ok(FeatureUpdate {
            timestamp,
            raw: Bytes::copy_from_slice(&record[..read_bytes]),
            read_bytes,
            payload: control,
        })
    }
}
