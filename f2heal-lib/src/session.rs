//! Device session: connection state and the device-state cascade.
//!
//! The device never pushes its state on connect. After the link comes up the
//! session sends one bootstrap request and every response handler issues the
//! next request from [`follow_up`], so a current-revision device is walked
//! through settings, then volume, then status.

use crate::batch::{SettingsBatch, StatusBatch};
use crate::error::LinkError;
use crate::frame::{ChecksumPolicy, Frame};
use crate::message::{Message, MessageKind, ProtocolRevision};
use crate::transport::Transport;
use std::collections::BTreeSet;
use strum_macros::Display;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Callbacks into the host UI. Each hook runs synchronously from inside the
/// session call that caused it.
pub trait SessionObserver {
    fn connection_changed(&mut self, _connected: bool) {}
    fn volume_changed(&mut self, _volume: u8) {}
    fn settings_changed(&mut self, _settings: &SettingsBatch) {}
    fn status_changed(&mut self, _status: &StatusBatch) {}
}

impl SessionObserver for () {}

/// Session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub revision: ProtocolRevision,
    pub checksum_policy: ChecksumPolicy,
    /// Skip a cascade follow-up whose response is still outstanding.
    /// Requests made through the public API are always sent.
    pub coalesce_requests: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            revision: ProtocolRevision::Current,
            checksum_policy: ChecksumPolicy::Strict,
            coalesce_requests: true,
        }
    }
}

impl SessionConfig {
    /// Numbering of the older web UI library
    pub fn legacy() -> Self {
        Self {
            revision: ProtocolRevision::Legacy,
            ..Self::default()
        }
    }

    /// Numbering of the current firmware
    pub fn current() -> Self {
        Self::default()
    }

    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum_policy = policy;
        self
    }

    pub fn with_request_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce_requests = enabled;
        self
    }
}

/// Where a request came from. Only the cascade's own requests are coalesced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Caller,
    Cascade,
}

/// Post-response action table: the request issued after applying a response.
pub fn follow_up(response: MessageKind) -> Option<MessageKind> {
    match response {
        MessageKind::SettingsBatch => Some(MessageKind::GetVolume),
        MessageKind::Volume => Some(MessageKind::GetStatusBatch),
        _ => None,
    }
}

pub struct DeviceSession<T, O = ()> {
    config: SessionConfig,
    transport: T,
    observer: O,
    state: LinkState,
    volume: u8,
    settings: SettingsBatch,
    status: StatusBatch,
    awaiting: BTreeSet<MessageKind>,
}

impl<T: Transport, O: SessionObserver> DeviceSession<T, O> {
    pub fn new(config: SessionConfig, transport: T, observer: O) -> Self {
        Self {
            config,
            transport,
            observer,
            state: LinkState::Disconnected,
            volume: 0,
            settings: SettingsBatch::default(),
            status: StatusBatch::default(),
            awaiting: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Last volume reported by the device
    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Last settings batch reported by the device
    pub fn settings(&self) -> &SettingsBatch {
        &self.settings
    }

    /// Last status batch reported by the device
    pub fn status(&self) -> &StatusBatch {
        &self.status
    }

    /// Response kinds requested but not yet received
    pub fn pending(&self) -> impl Iterator<Item = MessageKind> + '_ {
        self.awaiting.iter().copied()
    }

    pub fn is_awaiting(&self, response: MessageKind) -> bool {
        self.awaiting.contains(&response)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Brings the link up and sends the bootstrap request.
    ///
    /// Does nothing unless the session is disconnected. On transport failure
    /// the session falls back to `Disconnected` and the error is returned.
    pub async fn connect(&mut self) -> Result<(), LinkError> {
        if self.state != LinkState::Disconnected {
            debug!("Connect ignored, session is {}", self.state);
            return Ok(());
        }

        self.state = LinkState::Connecting;
        if let Err(e) = self.transport.connect().await {
            warn!("Connection failed: {}", e);
            self.state = LinkState::Disconnected;
            return Err(e);
        }

        self.state = LinkState::Connected;
        info!("BLE connected ({} protocol)", self.config.revision);
        self.observer.connection_changed(true);
        self.request(self.config.revision.bootstrap_request(), Origin::Cascade)
    }

    /// Caller-initiated disconnect.
    pub fn disconnect(&mut self) {
        if self.state == LinkState::Disconnected {
            return;
        }
        self.transport.disconnect();
        self.reset("disconnected by host");
    }

    /// Unsolicited link loss reported by the transport. A loss reported after
    /// [`DeviceSession::disconnect`] already ran is ignored.
    pub fn handle_link_lost(&mut self) {
        if self.state == LinkState::Disconnected {
            return;
        }
        self.reset("link lost");
    }

    fn reset(&mut self, reason: &str) {
        self.state = LinkState::Disconnected;
        self.volume = 0;
        self.settings = SettingsBatch::default();
        self.status = StatusBatch::default();
        self.awaiting.clear();
        info!("BLE disconnected: {}", reason);
        self.observer.connection_changed(false);
    }

    /// Handles one BLE notification carrying one frame.
    ///
    /// Malformed frames, unknown types and payloads that fail to decode are
    /// logged and dropped without touching session state. Returns the message
    /// that was applied, if any.
    pub fn handle_notification(&mut self, raw: &[u8]) -> Option<Message> {
        debug!(bytes = %hex::encode(raw), "BLE notify");
        if self.state != LinkState::Connected {
            debug!("Dropping notification while {}", self.state);
            return None;
        }

        let frame = match Frame::parse(raw, self.config.checksum_policy) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Received invalid message: {}", e);
                return None;
            }
        };

        let message = match Message::from_frame(self.config.revision, &frame) {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!("Unsupported message type {}", frame.type_code());
                return None;
            }
            Err(e) => {
                warn!("Failed to decode message type {}: {}", frame.type_code(), e);
                return None;
            }
        };

        self.apply(&message);
        Some(message)
    }

    fn apply(&mut self, message: &Message) {
        match message {
            Message::Volume(volume) => {
                debug!("Got volume {}", volume);
                self.settle(MessageKind::Volume);
                self.volume = *volume;
                self.observer.volume_changed(*volume);
            }
            Message::SettingsBatch(settings) => {
                debug!("Got settings: {}", settings);
                self.settle(MessageKind::SettingsBatch);
                self.settings = *settings;
                self.observer.settings_changed(settings);
            }
            Message::StatusBatch(status) => {
                debug!("Got status: {}", status);
                self.settle(MessageKind::StatusBatch);
                self.status = *status;
                self.observer.status_changed(status);
            }
            other => {
                warn!("Ignoring {} message from device", other.kind());
                return;
            }
        }

        if let Some(next) = follow_up(message.kind()) {
            if let Err(e) = self.request(next, Origin::Cascade) {
                warn!("Follow-up {} request failed: {}", next, e);
            }
        }
    }

    fn settle(&mut self, response: MessageKind) {
        if !self.awaiting.remove(&response) {
            debug!("Unsolicited {} response", response);
        }
    }

    /// Sends a payload-less request and marks its response as awaited.
    ///
    /// A response the revision has no type code for can never arrive, so it
    /// is not marked.
    fn request(&mut self, kind: MessageKind, origin: Origin) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Ok(());
        }
        let message = Message::request(kind)?;
        let Some(response) = kind.response() else {
            return Err(LinkError::FieldType { kind });
        };
        if origin == Origin::Cascade && self.config.coalesce_requests && self.awaiting.contains(&response) {
            debug!("{} already awaiting {}, not re-sent", kind, response);
            return Ok(());
        }
        self.write(&message)?;
        if self.config.revision.code(response).is_some() {
            self.awaiting.insert(response);
        } else {
            debug!("{} has no response in the {} protocol", kind, self.config.revision);
        }
        Ok(())
    }

    fn write(&mut self, message: &Message) -> Result<(), LinkError> {
        let bytes = message.encode(self.config.revision)?;
        debug!(bytes = %hex::encode(&bytes), "BLE write {}", message.kind());
        self.transport.send(bytes)
    }

    fn send(&mut self, message: Result<Message, LinkError>) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Ok(());
        }
        self.write(&message?)
    }

    pub fn request_volume(&mut self) -> Result<(), LinkError> {
        self.request(MessageKind::GetVolume, Origin::Caller)
    }

    pub fn request_settings_batch(&mut self) -> Result<(), LinkError> {
        self.request(MessageKind::GetSettingsBatch, Origin::Caller)
    }

    pub fn request_status_batch(&mut self) -> Result<(), LinkError> {
        self.request(MessageKind::GetStatusBatch, Origin::Caller)
    }

    pub fn set_volume(&mut self, volume: u8) -> Result<(), LinkError> {
        self.send(Ok(Message::Volume(volume)))
    }

    /// Sends a boolean setting (`EightChannel`, `TestMode`, `Toggle`, `ChannelTest`).
    pub fn set_bool_field(&mut self, kind: MessageKind, value: bool) -> Result<(), LinkError> {
        self.send(Message::bool(kind, value))
    }

    /// Sends a numeric setting (`StimFrequency`, `Jitter`, ...).
    pub fn set_u32_field(&mut self, kind: MessageKind, value: u32) -> Result<(), LinkError> {
        self.send(Message::u32(kind, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_up_table() {
        assert_eq!(follow_up(MessageKind::SettingsBatch), Some(MessageKind::GetVolume));
        assert_eq!(follow_up(MessageKind::Volume), Some(MessageKind::GetStatusBatch));
        assert_eq!(follow_up(MessageKind::StatusBatch), None);
        assert_eq!(follow_up(MessageKind::Jitter), None);
    }

    #[test]
    fn test_cascade_terminates() {
        // Walking the table from any bootstrap request must end.
        for revision in [ProtocolRevision::Legacy, ProtocolRevision::Current] {
            let mut request = Some(revision.bootstrap_request());
            let mut steps = 0;
            while let Some(kind) = request {
                let response = kind.response().unwrap();
                request = follow_up(response);
                steps += 1;
                assert!(steps <= 3);
            }
        }
    }

    #[test]
    fn test_config_builders() {
        let config = SessionConfig::legacy()
            .with_checksum_policy(ChecksumPolicy::Lenient)
            .with_request_coalescing(false);
        assert_eq!(config.revision, ProtocolRevision::Legacy);
        assert_eq!(config.checksum_policy, ChecksumPolicy::Lenient);
        assert!(!config.coalesce_requests);
        assert_eq!(SessionConfig::current(), SessionConfig::default());
    }
}
