//! Audio codec pipeline.
//!
//! Not a protocol of its own - a consumer wiring of the feature codec, the
//! Audio-Split transport and the operation queue:
//!
//! ```text
//! decode: notification bytes ─► AudioSplit ─► codec.decode ─► PCM samples
//! encode: PCM samples ─► codec.encode ─► AudioSplit ─► OperationQueue ─► link
//! ```
//!
//! Codec parameters stream in on the configuration feature
//! ([`AudioConfigFeature`]); every parameter update re-initializes the codec
//! so subsequent encode/decode calls use the new parameters.

mod adpcm;
pub mod params;

pub use adpcm::AdpcmCodec;
pub use params::{AudioConfigFeature, AudioControl, AudioParams, CodecKind};

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;
use crate::link::{CharacteristicId, Link};
use crate::queue::OperationQueue;
use crate::transport::AudioSplit;

/// A pluggable frame codec (ADPCM bundled; Opus slots in externally).
pub trait AudioCodec: Send {
    /// Re-initialize for new stream parameters, resetting internal state.
    fn configure(&mut self, params: &AudioParams);

    /// Inject decoder state pushed by the device (ADPCM re-sync records).
    fn sync(&mut self, step_index: u8, predicted_sample: i16);

    /// Decode one compressed frame into PCM; returns the sample count.
    fn decode(&mut self, data: &[u8], out: &mut Vec<i16>) -> Result<usize>;

    /// Encode one PCM frame; returns the compressed byte count.
    fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) -> Result<usize>;
}

/// The assembled audio path over one connection.
pub struct AudioPipeline<L: Link, C: AudioCodec> {
    queue: Arc<OperationQueue<L>>,
    codec: C,
    params: AudioParams,
    split: AudioSplit,
    /// Characteristic compressed outgoing frames are written to.
    audio_characteristic: CharacteristicId,
    /// Usable payload per write packet.
    write_payload_size: usize,
    /// Bound on each queued frame write.
    write_timeout: Duration,
    /// Scratch PCM buffer, sized to the current frame.
    scratch: Vec<i16>,
    /// Scratch compressed buffer for the encode path.
    compressed: Vec<u8>,
}

impl<L: Link, C: AudioCodec> AudioPipeline<L, C> {
    /// Wire a pipeline over `queue` with an unconfigured `codec`.
    pub fn new(
        queue: Arc<OperationQueue<L>>,
        codec: C,
        audio_characteristic: CharacteristicId,
        write_payload_size: usize,
        write_timeout: Duration,
    ) -> Self {
        let mut pipeline = Self {
            queue,
            codec,
            params: AudioParams::default(),
            split: AudioSplit::new(),
            audio_characteristic,
            write_payload_size,
            write_timeout,
            scratch: Vec::new(),
            compressed: Vec::new(),
        };
        pipeline.reinit();
        pipeline
    }

    /// Current stream parameters.
    pub fn params(&self) -> &AudioParams {
        &self.params
    }

    /// Diagnostic view of the receive transport.
    pub fn transport(&self) -> &AudioSplit {
        &self.split
    }

    /// Apply one decoded configuration record.
    ///
    /// `Toggle` and `Configure` re-initialize the codec and scratch buffers;
    /// `AdpcmSync` only injects decoder state.
    pub fn apply_control(&mut self, control: &AudioControl) {
        match control {
            AudioControl::Toggle { codec, enabled } => {
                self.params.codec = *codec;
                self.params.enabled = *enabled;
                self.reinit();
            }
            AudioControl::Configure {
                samples_per_frame,
                sample_rate_hz,
                channels,
                enabled,
            } => {
                self.params.samples_per_frame = *samples_per_frame;
                self.params.sample_rate_hz = *sample_rate_hz;
                self.params.channels = *channels;
                self.params.enabled = *enabled;
                self.reinit();
            }
            AudioControl::AdpcmSync {
                step_index,
                predicted_sample,
            } => {
                self.codec.sync(*step_index, *predicted_sample);
            }
        }
    }

    /// Feed one raw audio notification packet; returns one decoded PCM
    /// frame when the final packet of a compressed frame arrives.
    pub fn decode_packet(&mut self, packet: &[u8]) -> Result<Option<&[i16]>> {
        match self.split.decapsulate(packet)? {
            Some(frame) => {
                let samples = self.codec.decode(&frame, &mut self.scratch)?;
                Ok(Some(&self.scratch[..samples]))
            }
            None => Ok(None),
        }
    }

    /// Encode one PCM frame and write it through the operation queue.
    ///
    /// Each transport packet fits one physical write of `write_payload_size`
    /// bytes, so the link never splits a packet mid-frame. Returns `false`
    /// if any packet write fails (the frame is then partially sent; the
    /// receiver's desync handling drops it).
    pub async fn send_frame(&mut self, pcm: &[i16]) -> Result<bool> {
        let _ = self.codec.encode(pcm, &mut self.compressed)?;
        let packets = AudioSplit::encapsulate(&self.compressed, self.write_payload_size)?;
        for packet in packets {
            let ok = self
                .queue
                .write_characteristic(
                    self.audio_characteristic,
                    Bytes::from(packet),
                    self.write_payload_size,
                    self.write_timeout,
                )
                .await;
            if !ok {
                tracing::warn!("audio frame write failed, dropping rest of frame");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Discard any partially reassembled incoming frame.
    pub fn reset(&mut self) {
        self.split.reset();
    }

    fn reinit(&mut self) {
        self.codec.configure(&self.params);
        self.scratch = vec![0; self.params.samples_per_frame];
        self.split.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GattLinkError;
    use crate::link::{DescriptorId, Notification, ServiceInfo};
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    /// Link double that honors the `payload_size` chunking contract: values
    /// larger than one physical write are split on the wire, exactly as a
    /// real stack would send them.
    struct SinkLink {
        wire_packets: Mutex<Vec<Vec<u8>>>,
        notify_tx: broadcast::Sender<Notification>,
    }

    impl SinkLink {
        fn new() -> Self {
            let (notify_tx, _) = broadcast::channel(16);
            Self {
                wire_packets: Mutex::new(Vec::new()),
                notify_tx,
            }
        }
    }

    impl Link for SinkLink {
        async fn discover_services(&self) -> Result<Vec<ServiceInfo>> {
            Ok(Vec::new())
        }

        async fn read_characteristic(
            &self,
            _id: CharacteristicId,
            _timeout: Duration,
        ) -> Result<Bytes> {
            Err(GattLinkError::Link("no reads".into()))
        }

        async fn write_characteristic(
            &self,
            _id: CharacteristicId,
            value: &[u8],
            payload_size: usize,
            _timeout: Duration,
        ) -> Result<()> {
            let mut wire = self.wire_packets.lock().unwrap();
            for chunk in value.chunks(payload_size) {
                wire.push(chunk.to_vec());
            }
            Ok(())
        }

        async fn write_descriptor(&self, _id: DescriptorId, _value: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn set_notification(&self, _id: CharacteristicId, _enabled: bool) -> Result<()> {
            Ok(())
        }

        fn notifications(&self) -> broadcast::Receiver<Notification> {
            self.notify_tx.subscribe()
        }

        async fn change_mtu(&self, value: usize) -> Result<usize> {
            Ok(value)
        }
    }

    fn pipeline(link: Arc<SinkLink>) -> AudioPipeline<SinkLink, AdpcmCodec> {
        let queue = Arc::new(OperationQueue::new(link));
        queue.start();
        AudioPipeline::new(
            queue,
            AdpcmCodec::new(),
            CharacteristicId(0x30),
            20,
            Duration::from_millis(100),
        )
    }

    #[test]
    fn test_configure_resizes_scratch() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let mut pipeline = pipeline(Arc::new(SinkLink::new()));

        pipeline.apply_control(&AudioControl::Configure {
            samples_per_frame: 160,
            sample_rate_hz: 16_000,
            channels: 1,
            enabled: true,
        });
        assert_eq!(pipeline.params().samples_per_frame, 160);
        assert_eq!(pipeline.params().sample_rate_hz, 16_000);
    }

    #[test]
    fn test_toggle_keeps_stream_shape() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let mut pipeline = pipeline(Arc::new(SinkLink::new()));

        pipeline.apply_control(&AudioControl::Toggle {
            codec: CodecKind::Adpcm,
            enabled: true,
        });
        assert!(pipeline.params().enabled);
        assert_eq!(pipeline.params().samples_per_frame, 40);
    }

    #[tokio::test]
    async fn test_encode_send_decode_loop() {
        let link = Arc::new(SinkLink::new());
        let mut sender = pipeline(Arc::clone(&link));
        sender.apply_control(&AudioControl::Configure {
            samples_per_frame: 40,
            sample_rate_hz: 8_000,
            channels: 1,
            enabled: true,
        });

        let pcm: Vec<i16> = (0..40).map(|i| (i * 50) as i16).collect();
        assert!(sender.send_frame(&pcm).await.unwrap());

        // Everything that crossed the wire reassembles into one frame.
        let mut receiver = pipeline(Arc::clone(&link));
        receiver.apply_control(&AudioControl::Configure {
            samples_per_frame: 40,
            sample_rate_hz: 8_000,
            channels: 1,
            enabled: true,
        });

        let wire = link.wire_packets.lock().unwrap().clone();
        assert!(!wire.is_empty());
        let mut decoded: Option<Vec<i16>> = None;
        for packet in &wire {
            if let Some(frame) = receiver.decode_packet(packet).unwrap() {
                decoded = Some(frame.to_vec());
            }
        }
        let decoded = decoded.expect("frame should complete");
        assert_eq!(decoded.len(), 40);
    }

    #[tokio::test]
    async fn test_send_frame_packets_fit_one_physical_write() {
        let link = Arc::new(SinkLink::new());
        let mut sender = pipeline(Arc::clone(&link));
        sender.apply_control(&AudioControl::Configure {
            samples_per_frame: 40,
            sample_rate_hz: 8_000,
            channels: 1,
            enabled: true,
        });

        let pcm = vec![0i16; 40];
        assert!(sender.send_frame(&pcm).await.unwrap());

        // A 21-byte transport packet would be split 20+1 on the wire and the
        // receiver could never reassemble the frame.
        let wire = link.wire_packets.lock().unwrap().clone();
        for packet in &wire {
            assert!(packet.len() <= 20, "packet of {} bytes", packet.len());
        }

        let mut receiver = pipeline(Arc::clone(&link));
        receiver.apply_control(&AudioControl::Configure {
            samples_per_frame: 40,
            sample_rate_hz: 8_000,
            channels: 1,
            enabled: true,
        });
        let mut decoded = None;
        for packet in &wire {
            if let Some(frame) = receiver.decode_packet(packet).unwrap() {
                decoded = Some(frame.len());
            }
        }
        assert_eq!(decoded, Some(40));
    }

    #[tokio::test]
    async fn test_decode_packet_incremental() {
        let link = Arc::new(SinkLink::new());
        let mut pipeline = pipeline(link);
        pipeline.apply_control(&AudioControl::Configure {
            samples_per_frame: 40,
            sample_rate_hz: 8_000,
            channels: 1,
            enabled: true,
        });

        // A 40-sample ADPCM frame is 20 compressed bytes; with 8-byte packet
        // payloads it spans 3 packets.
        let compressed = vec![0u8; 20];
        let packets = AudioSplit::encapsulate(&compressed, 9).unwrap();
        assert_eq!(packets.len(), 3);

        assert!(pipeline.decode_packet(&packets[0]).unwrap().is_none());
        assert!(pipeline.decode_packet(&packets[1]).unwrap().is_none());
        let frame = pipeline.decode_packet(&packets[2]).unwrap().unwrap();
        assert_eq!(frame.len(), 40);
    }
}
