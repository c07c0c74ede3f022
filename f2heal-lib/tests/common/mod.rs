//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use f2heal_lib::batch::{SettingsBatch, StatusBatch};
#[allow(unused_imports)]
pub use f2heal_lib::error::LinkError;
#[allow(unused_imports)]
pub use f2heal_lib::frame::{ChecksumPolicy, Frame};
#[allow(unused_imports)]
pub use f2heal_lib::message::{Message, MessageKind, ProtocolRevision};
#[allow(unused_imports)]
pub use f2heal_lib::session::{DeviceSession, LinkState, SessionConfig, SessionObserver};
#[allow(unused_imports)]
pub use f2heal_lib::transport::Transport;

/// Route library logs to the test harness output. Safe to call from every test.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// Settings batch from a real device dump
#[allow(dead_code)]
pub const SETTINGS_PAYLOAD: [u8; 26] = [
    1, 10, 0, 0, 0, 250, 0, 0, 0, 100, 0, 0, 0, 3, 0, 0, 0, 2, 0, 0, 0, 50, 0, 0, 0, 0,
];

/// Status batch: running, 0 ms, 3.75 V
#[allow(dead_code)]
pub const STATUS_PAYLOAD: [u8; 13] = [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x70, 0x40];

/// Transport that records writes and never answers
#[derive(Default)]
pub struct RecordingTransport {
    pub written: Vec<Bytes>,
    pub fail_connect: bool,
    pub fail_send: bool,
    pub disconnects: usize,
}

impl Transport for RecordingTransport {
    async fn connect(&mut self) -> Result<(), LinkError> {
        if self.fail_connect {
            return Err(LinkError::Transport("User cancelled the requestDevice() chooser".to_string()));
        }
        Ok(())
    }

    fn send(&mut self, frame: Bytes) -> Result<(), LinkError> {
        if self.fail_send {
            return Err(LinkError::Transport("GATT operation failed".to_string()));
        }
        self.written.push(frame);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connection(bool),
    Volume(u8),
    Settings(SettingsBatch),
    Status(StatusBatch),
}

/// Observer that records every hook invocation in order
#[derive(Default)]
pub struct RecordingObserver {
    pub events: Vec<Event>,
}

impl SessionObserver for RecordingObserver {
    fn connection_changed(&mut self, connected: bool) {
        self.events.push(Event::Connection(connected));
    }

    fn volume_changed(&mut self, volume: u8) {
        self.events.push(Event::Volume(volume));
    }

    fn settings_changed(&mut self, settings: &SettingsBatch) {
        self.events.push(Event::Settings(*settings));
    }

    fn status_changed(&mut self, status: &StatusBatch) {
        self.events.push(Event::Status(*status));
    }
}

pub type TestSession = DeviceSession<RecordingTransport, RecordingObserver>;

#[allow(dead_code)]
pub fn new_session(config: SessionConfig) -> TestSession {
    DeviceSession::new(config, RecordingTransport::default(), RecordingObserver::default())
}

/// Encodes a frame the device would send
#[allow(dead_code)]
pub fn device_frame(revision: ProtocolRevision, message: Message) -> Bytes {
    message.encode(revision).expect("Failed to encode device frame")
}

/// Message kinds of everything the session has written so far
#[allow(dead_code)]
pub fn written_kinds(session: &TestSession) -> Vec<MessageKind> {
    let revision = session.config().revision;
    session
        .transport()
        .written
        .iter()
        .map(|bytes| {
            let frame = Frame::parse(bytes, ChecksumPolicy::Strict).expect("Session wrote an invalid frame");
            revision.kind(frame.type_code()).expect("Session wrote an unknown type")
        })
        .collect()
}
