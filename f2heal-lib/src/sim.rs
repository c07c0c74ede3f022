//! In-process stand-in for the glove firmware.
//!
//! [`SimulatedDevice`] follows the firmware's BLE handler: it rejects frames
//! that fail the checksum, applies setters and answers the three get
//! requests. Its settings reply uses the 26-byte batch layout this crate
//! decodes. The shipping firmware appends `single_channel` as a trailing u32
//! (30 bytes); set [`SimulatedDevice::append_single_channel`] to send that
//! instead. [`SimTransport`] wraps the device as a [`Transport`] whose
//! notifications come out of a tokio channel.

use crate::batch::{SettingsBatch, StatusBatch};
use crate::error::LinkError;
use crate::fields;
use crate::frame::{self, ChecksumPolicy, Frame};
use crate::message::{Message, MessageKind, ProtocolRevision};
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Power-on settings of the firmware
pub const FIRMWARE_DEFAULT_SETTINGS: SettingsBatch = SettingsBatch {
    channel_count_is_8: true,
    stim_frequency_hz: 250,
    stim_duration_ms: 100,
    cycle_period_ms: 1332,
    pause_cycle_period: 5,
    paused_cycles: 2,
    jitter_permille: 235,
    test_mode: false,
};

#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    revision: ProtocolRevision,
    pub settings: SettingsBatch,
    pub volume: u8,
    pub status: StatusBatch,
    /// Channel driven alone in test mode (0 = all)
    pub single_channel: u32,
    /// Frames rejected for bad framing or checksum
    pub rejected: usize,
    /// Send 30-byte settings replies with `single_channel` appended
    pub append_single_channel: bool,
}

impl SimulatedDevice {
    pub fn new(revision: ProtocolRevision) -> Self {
        Self {
            revision,
            settings: FIRMWARE_DEFAULT_SETTINGS,
            volume: 100,
            status: StatusBatch {
                running: false,
                running_since_ms: 0,
                battery_volts: 3.95,
            },
            single_channel: 0,
            rejected: 0,
            append_single_channel: false,
        }
    }

    pub fn revision(&self) -> ProtocolRevision {
        self.revision
    }

    /// Processes one frame written by the host and returns the frames the
    /// device notifies in response.
    pub fn handle(&mut self, raw: &[u8]) -> Vec<Bytes> {
        let frame = match Frame::parse(raw, ChecksumPolicy::Strict) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Device rejected frame: {}", e);
                self.rejected += 1;
                return Vec::new();
            }
        };
        let message = match Message::from_frame(self.revision, &frame) {
            Ok(Some(message)) => message,
            Ok(None) | Err(_) => {
                warn!("Device ignored message type {}", frame.type_code());
                self.rejected += 1;
                return Vec::new();
            }
        };

        match message {
            Message::Volume(volume) => self.volume = volume,
            Message::Bool { kind, value } => self.apply_bool(kind, value),
            Message::U32 { kind, value } => self.apply_u32(kind, value),
            Message::Request(kind) => return self.answer(kind).into_iter().collect(),
            Message::SettingsBatch(_) | Message::StatusBatch(_) => {
                debug!("Device ignores host-sent {}", message.kind());
            }
        }
        Vec::new()
    }

    fn apply_bool(&mut self, kind: MessageKind, value: bool) {
        match kind {
            MessageKind::EightChannel => self.settings.channel_count_is_8 = value,
            MessageKind::TestMode => self.settings.test_mode = value,
            MessageKind::Toggle => {
                if value != self.status.running {
                    self.status.running = value;
                    self.status.running_since_ms = 0;
                }
            }
            _ => debug!("Device ignores {} = {}", kind, value),
        }
    }

    fn apply_u32(&mut self, kind: MessageKind, value: u32) {
        match kind {
            MessageKind::StimFrequency => self.settings.stim_frequency_hz = value,
            MessageKind::StimDuration => self.settings.stim_duration_ms = value,
            MessageKind::CyclePeriod => self.settings.cycle_period_ms = value,
            MessageKind::PauseCyclePeriod => self.settings.pause_cycle_period = value,
            MessageKind::PausedCycles => self.settings.paused_cycles = value,
            MessageKind::Jitter => self.settings.jitter_permille = value,
            MessageKind::SingleChannel => self.single_channel = value,
            _ => debug!("Device ignores {} = {}", kind, value),
        }
    }

    fn answer(&self, request: MessageKind) -> Option<Bytes> {
        if request == MessageKind::GetSettingsBatch && self.append_single_channel {
            return self.extended_settings();
        }
        let response = match request {
            MessageKind::GetVolume => Message::Volume(self.volume),
            MessageKind::GetSettingsBatch => Message::SettingsBatch(self.settings),
            MessageKind::GetStatusBatch => Message::StatusBatch(self.status),
            _ => return None,
        };
        match response.encode(self.revision) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("Device cannot answer {}: {}", request, e);
                None
            }
        }
    }

    /// Settings reply laid out as the shipping firmware writes it.
    fn extended_settings(&self) -> Option<Bytes> {
        let code = self.revision.code(MessageKind::SettingsBatch)?;
        let mut payload = BytesMut::from(&self.settings.to_bytes()[..]);
        fields::write_u32_le(&mut payload, self.single_channel);
        frame::encode(code, &payload).ok()
    }
}

/// A [`Transport`] backed by a [`SimulatedDevice`].
pub struct SimTransport {
    device: SimulatedDevice,
    notify: mpsc::UnboundedSender<Bytes>,
    connected: bool,
    in_range: bool,
    /// Every frame the host wrote, in order
    pub written: Vec<Bytes>,
}

impl SimTransport {
    /// Returns the transport and the receiving end of its notifications.
    pub fn new(device: SimulatedDevice) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (notify, rx) = mpsc::unbounded_channel();
        let transport = Self {
            device,
            notify,
            connected: false,
            in_range: true,
            written: Vec::new(),
        };
        (transport, rx)
    }

    pub fn device(&self) -> &SimulatedDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut SimulatedDevice {
        &mut self.device
    }

    /// Makes subsequent connection attempts fail.
    pub fn set_in_range(&mut self, in_range: bool) {
        self.in_range = in_range;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Transport for SimTransport {
    async fn connect(&mut self) -> Result<(), LinkError> {
        if !self.in_range {
            return Err(LinkError::Transport("no matching device found".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    fn send(&mut self, frame: Bytes) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::Transport("GATT server is disconnected".to_string()));
        }
        self.written.push(frame.clone());
        for response in self.device.handle(&frame) {
            self.notify
                .send(response)
                .map_err(|_| LinkError::Transport("notification channel closed".to_string()))?;
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}
