use crate::constants::{SETTINGS_BATCH_SIZE, STATUS_BATCH_SIZE};
use crate::error::LinkError;
use crate::fields::bool_from_byte;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use strum_macros::Display;
use zerocopy::byteorder::little_endian::{F32, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Settings batch payload as it appears on the wire (26 bytes, no padding)
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SettingsBatchRaw {
    pub chan8: u8,              // 1 = 8 channels, 0 = 4 channels
    pub stim_frequency_hz: U32, // Hz
    pub stim_duration_ms: U32,  // ms
    pub cycle_period_ms: U32,   // ms
    pub pause_cycle_period: U32, // cycles
    pub paused_cycles: U32,     // cycles
    pub jitter_permille: U32,   // ‰ of the stimulation period
    pub test_mode: u8,          // 1 = test mode
}

/// Status batch payload as it appears on the wire (13 bytes, no padding)
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct StatusBatchRaw {
    pub running: u8,          // 1 = stream running
    pub running_since_ms: U64, // ms since the stream started
    pub battery_volts: F32,   // V
}

const SETTINGS_TEST_MODE_OFFSET: usize = SETTINGS_BATCH_SIZE - 1;

/// Device configuration, as reported by a settings batch response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SettingsBatch {
    pub channel_count_is_8: bool,
    pub stim_frequency_hz: u32,
    pub stim_duration_ms: u32,
    pub cycle_period_ms: u32,
    pub pause_cycle_period: u32,
    pub paused_cycles: u32,
    pub jitter_permille: u32,
    pub test_mode: bool,
}

/// Device runtime state, as reported by a status batch response.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusBatch {
    pub running: bool,
    pub running_since_ms: u64,
    pub battery_volts: f32,
}

/// Batch payloads must match their layout exactly, in either direction.
fn size_error(payload: &[u8], expected: usize) -> LinkError {
    LinkError::BufferTooShort {
        offset: 0,
        width: expected,
        len: payload.len(),
    }
}

impl SettingsBatch {
    /// Decodes a 26-byte settings batch payload.
    pub fn from_bytes(payload: &[u8]) -> Result<Self, LinkError> {
        let raw = SettingsBatchRaw::read_from_bytes(payload).map_err(|_| size_error(payload, SETTINGS_BATCH_SIZE))?;
        SettingsBatch::try_from(raw)
    }

    pub fn to_bytes(&self) -> [u8; SETTINGS_BATCH_SIZE] {
        let mut out = [0u8; SETTINGS_BATCH_SIZE];
        out.copy_from_slice(SettingsBatchRaw::from(*self).as_bytes());
        out
    }

    /// Number of stimulation channels the device drives.
    pub fn channel_count(&self) -> u32 {
        if self.channel_count_is_8 { 8 } else { 4 }
    }
}

impl TryFrom<SettingsBatchRaw> for SettingsBatch {
    type Error = LinkError;

    fn try_from(raw: SettingsBatchRaw) -> Result<Self, Self::Error> {
        Ok(SettingsBatch {
            channel_count_is_8: bool_from_byte(raw.chan8, 0)?,
            stim_frequency_hz: raw.stim_frequency_hz.get(),
            stim_duration_ms: raw.stim_duration_ms.get(),
            cycle_period_ms: raw.cycle_period_ms.get(),
            pause_cycle_period: raw.pause_cycle_period.get(),
            paused_cycles: raw.paused_cycles.get(),
            jitter_permille: raw.jitter_permille.get(),
            test_mode: bool_from_byte(raw.test_mode, SETTINGS_TEST_MODE_OFFSET)?,
        })
    }
}

impl From<SettingsBatch> for SettingsBatchRaw {
    fn from(settings: SettingsBatch) -> Self {
        SettingsBatchRaw {
            chan8: u8::from(settings.channel_count_is_8),
            stim_frequency_hz: U32::new(settings.stim_frequency_hz),
            stim_duration_ms: U32::new(settings.stim_duration_ms),
            cycle_period_ms: U32::new(settings.cycle_period_ms),
            pause_cycle_period: U32::new(settings.pause_cycle_period),
            paused_cycles: U32::new(settings.paused_cycles),
            jitter_permille: U32::new(settings.jitter_permille),
            test_mode: u8::from(settings.test_mode),
        }
    }
}

impl fmt::Display for SettingsBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ch, {} Hz, {} ms stim, {} ms cycle, pause {}/{}, jitter {}‰, test mode {}",
            self.channel_count(),
            self.stim_frequency_hz,
            self.stim_duration_ms,
            self.cycle_period_ms,
            self.paused_cycles,
            self.pause_cycle_period,
            self.jitter_permille,
            if self.test_mode { "on" } else { "off" }
        )
    }
}

/// Coarse battery state, using the thresholds of the control panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum BatteryLevel {
    #[strum(to_string = "good")]
    Good,
    #[strum(to_string = "low")]
    Low,
    #[strum(to_string = "critical")]
    Critical,
}

impl StatusBatch {
    /// Decodes a 13-byte status batch payload.
    pub fn from_bytes(payload: &[u8]) -> Result<Self, LinkError> {
        let raw = StatusBatchRaw::read_from_bytes(payload).map_err(|_| size_error(payload, STATUS_BATCH_SIZE))?;
        StatusBatch::try_from(raw)
    }

    pub fn to_bytes(&self) -> [u8; STATUS_BATCH_SIZE] {
        let mut out = [0u8; STATUS_BATCH_SIZE];
        out.copy_from_slice(StatusBatchRaw::from(*self).as_bytes());
        out
    }

    pub fn running_since(&self) -> Duration {
        Duration::from_millis(self.running_since_ms)
    }

    pub fn battery_level(&self) -> BatteryLevel {
        if self.battery_volts > 3.9 {
            BatteryLevel::Good
        } else if self.battery_volts > 3.6 {
            BatteryLevel::Low
        } else {
            BatteryLevel::Critical
        }
    }
}

impl TryFrom<StatusBatchRaw> for StatusBatch {
    type Error = LinkError;

    fn try_from(raw: StatusBatchRaw) -> Result<Self, Self::Error> {
        Ok(StatusBatch {
            running: bool_from_byte(raw.running, 0)?,
            running_since_ms: raw.running_since_ms.get(),
            battery_volts: raw.battery_volts.get(),
        })
    }
}

impl From<StatusBatch> for StatusBatchRaw {
    fn from(status: StatusBatch) -> Self {
        StatusBatchRaw {
            running: u8::from(status.running),
            running_since_ms: U64::new(status.running_since_ms),
            battery_volts: F32::new(status.battery_volts),
        }
    }
}

impl fmt::Display for StatusBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // hh:mm:ss.t, hours wrap at a day
        let since = self.running_since();
        let secs = since.as_secs();
        write!(
            f,
            "{}, running for {:02}:{:02}:{:02}.{}, battery {:.2} V ({})",
            if self.running { "running" } else { "stopped" },
            (secs / 3600) % 24,
            (secs / 60) % 60,
            secs % 60,
            since.subsec_millis() / 100,
            self.battery_volts,
            self.battery_level()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS_FIXTURE: [u8; 26] = [
        1, 10, 0, 0, 0, 250, 0, 0, 0, 100, 0, 0, 0, 3, 0, 0, 0, 2, 0, 0, 0, 50, 0, 0, 0, 0,
    ];

    const STATUS_FIXTURE: [u8; 13] = [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x70, 0x40];

    #[test]
    fn test_raw_layouts_have_no_padding() {
        assert_eq!(std::mem::size_of::<SettingsBatchRaw>(), SETTINGS_BATCH_SIZE);
        assert_eq!(std::mem::size_of::<StatusBatchRaw>(), STATUS_BATCH_SIZE);
    }

    #[test]
    fn test_decode_settings_batch() {
        let settings = SettingsBatch::from_bytes(&SETTINGS_FIXTURE).unwrap();
        assert_eq!(
            settings,
            SettingsBatch {
                channel_count_is_8: true,
                stim_frequency_hz: 10,
                stim_duration_ms: 250,
                cycle_period_ms: 100,
                pause_cycle_period: 3,
                paused_cycles: 2,
                jitter_permille: 50,
                test_mode: false,
            }
        );
        assert_eq!(settings.channel_count(), 8);
        assert_eq!(settings.to_bytes(), SETTINGS_FIXTURE);
    }

    #[test]
    fn test_decode_status_batch() {
        let status = StatusBatch::from_bytes(&STATUS_FIXTURE).unwrap();
        assert!(status.running);
        assert_eq!(status.running_since_ms, 0);
        assert_eq!(status.battery_volts, 3.75);
        assert_eq!(status.battery_level(), BatteryLevel::Low);
        assert_eq!(status.to_bytes(), STATUS_FIXTURE);
    }

    #[test]
    fn test_settings_batch_wrong_size() {
        assert_eq!(
            SettingsBatch::from_bytes(&SETTINGS_FIXTURE[..25]),
            Err(LinkError::BufferTooShort {
                offset: 0,
                width: 26,
                len: 25
            })
        );

        // Trailing bytes are rejected too, e.g. a single_channel u32 appended by newer firmware
        let mut long = SETTINGS_FIXTURE.to_vec();
        long.extend_from_slice(&[3, 0, 0, 0]);
        assert_eq!(
            SettingsBatch::from_bytes(&long),
            Err(LinkError::BufferTooShort {
                offset: 0,
                width: 26,
                len: 30
            })
        );
    }

    #[test]
    fn test_status_batch_wrong_size() {
        assert!(matches!(
            StatusBatch::from_bytes(&[]),
            Err(LinkError::BufferTooShort { .. })
        ));
        assert!(matches!(
            StatusBatch::from_bytes(&[0; 14]),
            Err(LinkError::BufferTooShort { width: 13, len: 14, .. })
        ));
    }

    #[test]
    fn test_invalid_bool_in_batch() {
        let mut bytes = SETTINGS_FIXTURE;
        bytes[25] = 7;
        assert_eq!(
            SettingsBatch::from_bytes(&bytes),
            Err(LinkError::InvalidBool { offset: 25, value: 7 })
        );

        let mut bytes = STATUS_FIXTURE;
        bytes[0] = 2;
        assert_eq!(
            StatusBatch::from_bytes(&bytes),
            Err(LinkError::InvalidBool { offset: 0, value: 2 })
        );
    }

    #[test]
    fn test_battery_levels() {
        let status = |battery_volts| StatusBatch {
            battery_volts,
            ..Default::default()
        };
        assert_eq!(status(4.1).battery_level(), BatteryLevel::Good);
        assert_eq!(status(3.7).battery_level(), BatteryLevel::Low);
        assert_eq!(status(3.5).battery_level(), BatteryLevel::Critical);
    }

    #[test]
    fn test_status_display() {
        let status = StatusBatch {
            running: true,
            running_since_ms: 3_723_400,
            battery_volts: 4.0,
        };
        assert_eq!(status.to_string(), "running, running for 01:02:03.4, battery 4.00 V (good)");
    }
}
