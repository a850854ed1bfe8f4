//! Battery feature - representative simple per-sensor decoder.
//!
//! Illustrates the byte-layout decoder shape the ~60 per-sensor features
//! share: a fixed little-endian record, a minimum frame size enforced as a
//! hard contract, and [`FeatureField`] views for presentation.
//!
//! Wire layout (7 bytes, little endian):
//!
//! ```text
//! ┌─────────┬──────────┬──────────┬────────┐
//! │ Level   │ Voltage  │ Current  │ Status │
//! │ u16 0.1%│ u16 mV   │ i16 0.1mA│ u8     │
//! └─────────┴──────────┴──────────┴────────┘
//! ```

use bytes::Bytes;

use super::{envelope, Feature, FeatureCommand, FeatureField, FeatureInfo, FeatureUpdate};
use crate::error::{GattLinkError, Result};

/// Minimum (and exact) frame size of one battery sample.
pub const BATTERY_FRAME_SIZE: usize = 7;

/// Command id: request one immediate battery reading.
pub const CMD_GET_BATTERY_STATUS: u8 = 0x01;

/// Charging state reported by the gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryStatus {
    /// Battery below the low threshold.
    LowBattery,
    /// Discharging normally.
    Discharging,
    /// Plugged in, not charging.
    PluggedNotCharging,
    /// Charging.
    Charging,
    /// Unknown/vendor-specific state byte.
    Unknown(u8),
}

impl From<u8> for BatteryStatus {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => BatteryStatus::LowBattery,
            0x01 => BatteryStatus::Discharging,
            0x02 => BatteryStatus::PluggedNotCharging,
            0x03 => BatteryStatus::Charging,
            other => BatteryStatus::Unknown(other),
        }
    }
}

/// One decoded battery sample.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryReading {
    /// Charge level in percent.
    pub level_percent: f32,
    /// Battery voltage in millivolts.
    pub voltage_mv: f32,
    /// Draw current in milliamps (negative while charging).
    pub current_ma: f32,
    /// Charging state.
    pub status: BatteryStatus,
}

impl BatteryReading {
    /// Present the sample as named fields with bounds and units.
    pub fn fields(&self) -> Vec<FeatureField<f32>> {
        vec![
            FeatureField::new("level", self.level_percent)
                .with_range(0.0, 100.0)
                .with_unit("%"),
            FeatureField::new("voltage", self.voltage_mv).with_unit("mV"),
            FeatureField::new("current", self.current_ma).with_unit("mA"),
        ]
    }
}

/// The battery feature decoder.
#[derive(Debug)]
pub struct BatteryFeature {
    info: FeatureInfo,
}

impl BatteryFeature {
    /// Create the battery feature with its standard identity.
    pub fn new() -> Self {
        Self {
            info: FeatureInfo {
                name: "Battery",
                identifier: 0x02,
                mask: 1 << 17,
                max_payload_size: BATTERY_FRAME_SIZE,
                has_timestamp: true,
                is_notifying: true,
            },
        }
    }
}

impl Default for BatteryFeature {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for BatteryFeature {
    type Payload = BatteryReading;

    fn info(&self) -> &FeatureInfo {
        &self.info
    }

    fn extract(
        &self,
        timestamp: u64,
        data: &[u8],
        offset: usize,
    ) -> Result<FeatureUpdate<BatteryReading>> {
        let available = data.len().saturating_sub(offset);
        if available < BATTERY_FRAME_SIZE {
            return Err(GattLinkError::ShortFrame {
                expected: BATTERY_FRAME_SIZE,
                actual: available,
                offset,
            });
        }

        let frame = &data[offset..offset + BATTERY_FRAME_SIZE];
        let level = u16::from_le_bytes([frame[0], frame[1]]);
        let voltage = u16::from_le_bytes([frame[2], frame[3]]);
        let current = i16::from_le_bytes([frame[4], frame[5]]);
        let status = BatteryStatus::from(frame[6]);

        Ok(FeatureUpdate {
            timestamp,
            raw: Bytes::copy_from_slice(frame),
            read_bytes: BATTERY_FRAME_SIZE,
            payload: BatteryReading {
                level_percent: level as f32 / 10.0,
                voltage_mv: voltage as f32,
                current_ma: current as f32 / 10.0,
                status,
            },
        })
    }

    fn pack_command(&self, _feature_bit: u32, command: &FeatureCommand) -> Option<Vec<u8>> {
        match command.command_id {
            CMD_GET_BATTERY_STATUS => Some(envelope::pack_request(
                self.info.identifier,
                command.command_id,
                &command.args,
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&875u16.to_le_bytes()); // 87.5 %
        frame.extend_from_slice(&3950u16.to_le_bytes()); // 3950 mV
        frame.extend_from_slice(&(-120i16).to_le_bytes()); // -12.0 mA
        frame.push(0x03); // charging
        frame
    }

    #[test]
    fn test_extract_sample() {
        let feature = BatteryFeature::new();
        let update = feature.extract(1234, &sample_frame(), 0).unwrap();

        assert_eq!(update.timestamp, 1234);
        assert_eq!(update.read_bytes, BATTERY_FRAME_SIZE);
        assert_eq!(update.payload.level_percent, 87.5);
        assert_eq!(update.payload.voltage_mv, 3950.0);
        assert_eq!(update.payload.current_ma, -12.0);
        assert_eq!(update.payload.status, BatteryStatus::Charging);
    }

    #[test]
    fn test_extract_at_offset() {
        // Two samples packed in one notification: read_bytes advances the cursor.
        let feature = BatteryFeature::new();
        let mut packed = sample_frame();
        let mut second = sample_frame();
        second[6] = 0x01; // discharging
        packed.extend_from_slice(&second);

        let first = feature.extract(0, &packed, 0).unwrap();
        let second = feature.extract(0, &packed, first.read_bytes).unwrap();
        assert_eq!(first.payload.status, BatteryStatus::Charging);
        assert_eq!(second.payload.status, BatteryStatus::Discharging);
    }

    #[test]
    fn test_extract_short_frame_fails() {
        let feature = BatteryFeature::new();
        let result = feature.extract(0, &sample_frame()[..5], 0);
        assert!(matches!(
            result,
            Err(GattLinkError::ShortFrame {
                expected: BATTERY_FRAME_SIZE,
                actual: 5,
                offset: 0,
            })
        ));
    }

    #[test]
    fn test_extract_short_frame_past_offset() {
        let feature = BatteryFeature::new();
        let frame = sample_frame();
        let result = feature.extract(0, &frame, 3);
        assert!(matches!(result, Err(GattLinkError::ShortFrame { actual: 4, .. })));
    }

    #[test]
    fn test_status_byte_mapping() {
        assert_eq!(BatteryStatus::from(0x00), BatteryStatus::LowBattery);
        assert_eq!(BatteryStatus::from(0x01), BatteryStatus::Discharging);
        assert_eq!(BatteryStatus::from(0x02), BatteryStatus::PluggedNotCharging);
        assert_eq!(BatteryStatus::from(0x03), BatteryStatus::Charging);
        assert_eq!(BatteryStatus::from(0x7F), BatteryStatus::Unknown(0x7F));
    }

    #[test]
    fn test_pack_supported_command() {
        let feature = BatteryFeature::new();
        let command = FeatureCommand::bare(feature.info().identifier, CMD_GET_BATTERY_STATUS);
        let bytes = feature.pack_command(feature.info().mask, &command).unwrap();
        assert_eq!(bytes, vec![0x02, CMD_GET_BATTERY_STATUS]);
    }

    #[test]
    fn test_pack_unsupported_command() {
        let feature = BatteryFeature::new();
        let command = FeatureCommand::bare(feature.info().identifier, 0x77);
        assert!(feature.pack_command(feature.info().mask, &command).is_none());
    }

    #[test]
    fn test_fields_presentation() {
        let feature = BatteryFeature::new();
        let update = feature.extract(0, &sample_frame(), 0).unwrap();
        let fields = update.payload.fields();

        assert_eq!(fields[0].name, "level");
        assert_eq!(fields[0].unit, Some("%"));
        assert_eq!(fields[0].max, Some(100.0));
        assert_eq!(fields[1].unit, Some("mV"));
    }
}
