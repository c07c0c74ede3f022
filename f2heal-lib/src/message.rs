//! Message types and their wire codes.
//!
//! The glove firmware and the two generations of the web UI disagree on the
//! numeric value of several message types, and nothing on the wire says which
//! numbering a peer uses. [`MessageKind`] names the meaning of a message;
//! a [`ProtocolRevision`] maps it to and from the type byte.

use crate::batch::{SettingsBatch, StatusBatch};
use crate::error::LinkError;
use crate::fields;
use crate::frame::Frame;
use bytes::{Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Revision-independent identity of a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
pub enum MessageKind {
    Volume,
    #[strum(to_string = "ToggleStream")]
    Toggle,
    ChannelTest,
    EightChannel,
    StimFrequency,
    StimDuration,
    CyclePeriod,
    PauseCyclePeriod,
    PausedCycles,
    Jitter,
    TestMode,
    StatusBatch,
    GetStatusBatch,
    GetVolume,
    SettingsBatch,
    GetSettingsBatch,
    SingleChannel,
}

/// Shape of the payload a message kind carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Empty,
    U8,
    Bool,
    U32,
    SettingsBatch,
    StatusBatch,
}

impl MessageKind {
    pub const ALL: [MessageKind; 17] = [
        MessageKind::Volume,
        MessageKind::Toggle,
        MessageKind::ChannelTest,
        MessageKind::EightChannel,
        MessageKind::StimFrequency,
        MessageKind::StimDuration,
        MessageKind::CyclePeriod,
        MessageKind::PauseCyclePeriod,
        MessageKind::PausedCycles,
        MessageKind::Jitter,
        MessageKind::TestMode,
        MessageKind::StatusBatch,
        MessageKind::GetStatusBatch,
        MessageKind::GetVolume,
        MessageKind::SettingsBatch,
        MessageKind::GetSettingsBatch,
        MessageKind::SingleChannel,
    ];

    pub fn value_type(&self) -> ValueType {
        match self {
            MessageKind::Volume => ValueType::U8,
            MessageKind::Toggle | MessageKind::ChannelTest | MessageKind::EightChannel | MessageKind::TestMode => {
                ValueType::Bool
            }
            MessageKind::StimFrequency
            | MessageKind::StimDuration
            | MessageKind::CyclePeriod
            | MessageKind::PauseCyclePeriod
            | MessageKind::PausedCycles
            | MessageKind::Jitter
            | MessageKind::SingleChannel => ValueType::U32,
            MessageKind::StatusBatch => ValueType::StatusBatch,
            MessageKind::SettingsBatch => ValueType::SettingsBatch,
            MessageKind::GetStatusBatch | MessageKind::GetVolume | MessageKind::GetSettingsBatch => ValueType::Empty,
        }
    }

    /// The response kind a request kind is answered with.
    pub fn response(&self) -> Option<MessageKind> {
        match self {
            MessageKind::GetVolume => Some(MessageKind::Volume),
            MessageKind::GetSettingsBatch => Some(MessageKind::SettingsBatch),
            MessageKind::GetStatusBatch => Some(MessageKind::StatusBatch),
            _ => None,
        }
    }

    pub fn is_request(&self) -> bool {
        self.response().is_some()
    }

    /// Parses the snake_case or CamelCase name of a kind (`stim_frequency`, `StimFrequency`).
    pub fn from_name(name: &str) -> Option<MessageKind> {
        let wanted: String = name.chars().filter(|c| *c != '_' && *c != '-').collect();
        MessageKind::ALL
            .into_iter()
            .find(|kind| format!("{:?}", kind).eq_ignore_ascii_case(&wanted))
    }
}

/// Type codes of the older web UI library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum LegacyCode {
    Volume = 1,
    Toggle = 2,
    ChannelTest = 3,
    EightChannel = 4,
    StimFrequency = 5,
    StimDuration = 6,
    CyclePeriod = 7,
    PauseCyclePeriod = 8,
    PausedCycles = 9,
    Jitter = 10,
    TestMode = 11,
    GetStatusBatch = 12,
    GetVolume = 13,
    GetSettingsBatch = 14,
}

/// Type codes of the current firmware. Codes are append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CurrentCode {
    Volume = 1,
    Toggle = 2,
    ChannelTest = 3,
    EightChannel = 4,
    StimFrequency = 5,
    StimDuration = 6,
    CyclePeriod = 7,
    PauseCyclePeriod = 8,
    PausedCycles = 9,
    Jitter = 10,
    TestMode = 11,
    StatusBatch = 12,
    GetStatusBatch = 13,
    GetVolume = 14,
    SettingsBatch = 15,
    GetSettingsBatch = 16,
    SingleChannel = 17,
}

impl From<LegacyCode> for MessageKind {
    fn from(code: LegacyCode) -> Self {
        match code {
            LegacyCode::Volume => MessageKind::Volume,
            LegacyCode::Toggle => MessageKind::Toggle,
            LegacyCode::ChannelTest => MessageKind::ChannelTest,
            LegacyCode::EightChannel => MessageKind::EightChannel,
            LegacyCode::StimFrequency => MessageKind::StimFrequency,
            LegacyCode::StimDuration => MessageKind::StimDuration,
            LegacyCode::CyclePeriod => MessageKind::CyclePeriod,
            LegacyCode::PauseCyclePeriod => MessageKind::PauseCyclePeriod,
            LegacyCode::PausedCycles => MessageKind::PausedCycles,
            LegacyCode::Jitter => MessageKind::Jitter,
            LegacyCode::TestMode => MessageKind::TestMode,
            LegacyCode::GetStatusBatch => MessageKind::GetStatusBatch,
            LegacyCode::GetVolume => MessageKind::GetVolume,
            LegacyCode::GetSettingsBatch => MessageKind::GetSettingsBatch,
        }
    }
}

impl From<CurrentCode> for MessageKind {
    fn from(code: CurrentCode) -> Self {
        match code {
            CurrentCode::Volume => MessageKind::Volume,
            CurrentCode::Toggle => MessageKind::Toggle,
            CurrentCode::ChannelTest => MessageKind::ChannelTest,
            CurrentCode::EightChannel => MessageKind::EightChannel,
            CurrentCode::StimFrequency => MessageKind::StimFrequency,
            CurrentCode::StimDuration => MessageKind::StimDuration,
            CurrentCode::CyclePeriod => MessageKind::CyclePeriod,
            CurrentCode::PauseCyclePeriod => MessageKind::PauseCyclePeriod,
            CurrentCode::PausedCycles => MessageKind::PausedCycles,
            CurrentCode::Jitter => MessageKind::Jitter,
            CurrentCode::TestMode => MessageKind::TestMode,
            CurrentCode::StatusBatch => MessageKind::StatusBatch,
            CurrentCode::GetStatusBatch => MessageKind::GetStatusBatch,
            CurrentCode::GetVolume => MessageKind::GetVolume,
            CurrentCode::SettingsBatch => MessageKind::SettingsBatch,
            CurrentCode::GetSettingsBatch => MessageKind::GetSettingsBatch,
            CurrentCode::SingleChannel => MessageKind::SingleChannel,
        }
    }
}

/// Which type numbering both ends of the link agreed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum ProtocolRevision {
    #[strum(to_string = "legacy")]
    Legacy,
    #[default]
    #[strum(to_string = "current")]
    Current,
}

impl ProtocolRevision {
    /// Type byte for `kind`, or `None` when this revision has no such message.
    pub fn code(&self, kind: MessageKind) -> Option<u8> {
        match self {
            ProtocolRevision::Legacy => {
                let code = match kind {
                    MessageKind::Volume => LegacyCode::Volume,
                    MessageKind::Toggle => LegacyCode::Toggle,
                    MessageKind::ChannelTest => LegacyCode::ChannelTest,
                    MessageKind::EightChannel => LegacyCode::EightChannel,
                    MessageKind::StimFrequency => LegacyCode::StimFrequency,
                    MessageKind::StimDuration => LegacyCode::StimDuration,
                    MessageKind::CyclePeriod => LegacyCode::CyclePeriod,
                    MessageKind::PauseCyclePeriod => LegacyCode::PauseCyclePeriod,
                    MessageKind::PausedCycles => LegacyCode::PausedCycles,
                    MessageKind::Jitter => LegacyCode::Jitter,
                    MessageKind::TestMode => LegacyCode::TestMode,
                    MessageKind::GetStatusBatch => LegacyCode::GetStatusBatch,
                    MessageKind::GetVolume => LegacyCode::GetVolume,
                    MessageKind::GetSettingsBatch => LegacyCode::GetSettingsBatch,
                    MessageKind::StatusBatch | MessageKind::SettingsBatch | MessageKind::SingleChannel => {
                        return None;
                    }
                };
                Some(code.into())
            }
            ProtocolRevision::Current => {
                let code = match kind {
                    MessageKind::Volume => CurrentCode::Volume,
                    MessageKind::Toggle => CurrentCode::Toggle,
                    MessageKind::ChannelTest => CurrentCode::ChannelTest,
                    MessageKind::EightChannel => CurrentCode::EightChannel,
                    MessageKind::StimFrequency => CurrentCode::StimFrequency,
                    MessageKind::StimDuration => CurrentCode::StimDuration,
                    MessageKind::CyclePeriod => CurrentCode::CyclePeriod,
                    MessageKind::PauseCyclePeriod => CurrentCode::PauseCyclePeriod,
                    MessageKind::PausedCycles => CurrentCode::PausedCycles,
                    MessageKind::Jitter => CurrentCode::Jitter,
                    MessageKind::TestMode => CurrentCode::TestMode,
                    MessageKind::StatusBatch => CurrentCode::StatusBatch,
                    MessageKind::GetStatusBatch => CurrentCode::GetStatusBatch,
                    MessageKind::GetVolume => CurrentCode::GetVolume,
                    MessageKind::SettingsBatch => CurrentCode::SettingsBatch,
                    MessageKind::GetSettingsBatch => CurrentCode::GetSettingsBatch,
                    MessageKind::SingleChannel => CurrentCode::SingleChannel,
                };
                Some(code.into())
            }
        }
    }

    /// Like [`ProtocolRevision::code`], failing with `UnsupportedMessage`.
    pub fn require_code(&self, kind: MessageKind) -> Result<u8, LinkError> {
        self.code(kind).ok_or(LinkError::UnsupportedMessage { kind, revision: *self })
    }

    /// Message kind a type byte stands for, or `None` for unknown codes.
    pub fn kind(&self, code: u8) -> Option<MessageKind> {
        match self {
            ProtocolRevision::Legacy => LegacyCode::try_from(code).ok().map(MessageKind::from),
            ProtocolRevision::Current => CurrentCode::try_from(code).ok().map(MessageKind::from),
        }
    }

    /// The request a freshly connected session sends to learn device state.
    ///
    /// The legacy firmware has no settings batch, so it starts from the volume.
    pub fn bootstrap_request(&self) -> MessageKind {
        match self {
            ProtocolRevision::Legacy => MessageKind::GetVolume,
            ProtocolRevision::Current => MessageKind::GetSettingsBatch,
        }
    }
}

impl std::str::FromStr for ProtocolRevision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" | "old" => Ok(ProtocolRevision::Legacy),
            "current" | "new" => Ok(ProtocolRevision::Current),
            other => Err(format!("unknown protocol revision '{}'", other)),
        }
    }
}

/// A typed message, independent of the wire numbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Volume setting (0-255), sent by the host or reported by the device
    Volume(u8),
    /// A boolean setting or flag
    Bool { kind: MessageKind, value: bool },
    /// A numeric setting
    U32 { kind: MessageKind, value: u32 },
    /// Full device configuration reported by the device
    SettingsBatch(SettingsBatch),
    /// Runtime status reported by the device
    StatusBatch(StatusBatch),
    /// Payload-less request for one of the responses above
    Request(MessageKind),
}

impl Message {
    pub fn bool(kind: MessageKind, value: bool) -> Result<Self, LinkError> {
        match kind.value_type() {
            ValueType::Bool => Ok(Message::Bool { kind, value }),
            _ => Err(LinkError::FieldType { kind }),
        }
    }

    pub fn u32(kind: MessageKind, value: u32) -> Result<Self, LinkError> {
        match kind.value_type() {
            ValueType::U32 => Ok(Message::U32 { kind, value }),
            _ => Err(LinkError::FieldType { kind }),
        }
    }

    pub fn request(kind: MessageKind) -> Result<Self, LinkError> {
        if kind.is_request() {
            Ok(Message::Request(kind))
        } else {
            Err(LinkError::FieldType { kind })
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Volume(_) => MessageKind::Volume,
            Message::Bool { kind, .. } | Message::U32 { kind, .. } | Message::Request(kind) => *kind,
            Message::SettingsBatch(_) => MessageKind::SettingsBatch,
            Message::StatusBatch(_) => MessageKind::StatusBatch,
        }
    }

    /// Serializes the payload, without the frame header.
    pub fn payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Message::Volume(volume) => fields::write_u8(&mut buf, *volume),
            Message::Bool { value, .. } => fields::write_bool(&mut buf, *value),
            Message::U32 { value, .. } => fields::write_u32_le(&mut buf, *value),
            Message::SettingsBatch(settings) => buf.extend_from_slice(&settings.to_bytes()),
            Message::StatusBatch(status) => buf.extend_from_slice(&status.to_bytes()),
            Message::Request(_) => {}
        }
        buf.freeze()
    }

    /// Builds the frame for this message under `revision`.
    pub fn to_frame(&self, revision: ProtocolRevision) -> Result<Frame, LinkError> {
        let code = revision.require_code(self.kind())?;
        Frame::new(code, self.payload())
    }

    /// Encodes this message into wire bytes under `revision`.
    pub fn encode(&self, revision: ProtocolRevision) -> Result<Bytes, LinkError> {
        Ok(self.to_frame(revision)?.to_bytes())
    }

    /// Interprets a payload as a message of `kind`.
    pub fn decode(kind: MessageKind, payload: &[u8]) -> Result<Self, LinkError> {
        let message = match kind.value_type() {
            ValueType::U8 => Message::Volume(fields::read_u8(payload, 0)?),
            ValueType::Bool => Message::Bool {
                kind,
                value: fields::read_bool(payload, 0)?,
            },
            ValueType::U32 => Message::U32 {
                kind,
                value: fields::read_u32_le(payload, 0)?,
            },
            ValueType::SettingsBatch => Message::SettingsBatch(SettingsBatch::from_bytes(payload)?),
            ValueType::StatusBatch => Message::StatusBatch(StatusBatch::from_bytes(payload)?),
            ValueType::Empty => Message::Request(kind),
        };
        Ok(message)
    }

    /// Resolves the frame's type byte under `revision` and decodes its payload.
    ///
    /// Returns `Ok(None)` for type codes the revision does not know.
    pub fn from_frame(revision: ProtocolRevision, frame: &Frame) -> Result<Option<Self>, LinkError> {
        match revision.kind(frame.type_code()) {
            Some(kind) => Message::decode(kind, frame.payload()).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revisions_disagree_on_get_volume() {
        assert_eq!(ProtocolRevision::Legacy.code(MessageKind::GetVolume), Some(13));
        assert_eq!(ProtocolRevision::Current.code(MessageKind::GetVolume), Some(14));
        assert_eq!(ProtocolRevision::Legacy.kind(13), Some(MessageKind::GetVolume));
        assert_eq!(ProtocolRevision::Current.kind(13), Some(MessageKind::GetStatusBatch));
    }

    #[test]
    fn test_code_kind_inverse() {
        for revision in [ProtocolRevision::Legacy, ProtocolRevision::Current] {
            for kind in MessageKind::ALL {
                if let Some(code) = revision.code(kind) {
                    assert_eq!(revision.kind(code), Some(kind), "{} {}", revision, kind);
                }
            }
        }
    }

    #[test]
    fn test_legacy_has_no_batch_responses() {
        let legacy = ProtocolRevision::Legacy;
        assert_eq!(legacy.code(MessageKind::SettingsBatch), None);
        assert_eq!(legacy.code(MessageKind::StatusBatch), None);
        assert_eq!(legacy.code(MessageKind::SingleChannel), None);
        assert_eq!(legacy.kind(15), None);
        assert!(matches!(
            legacy.require_code(MessageKind::SingleChannel),
            Err(LinkError::UnsupportedMessage {
                kind: MessageKind::SingleChannel,
                revision: ProtocolRevision::Legacy
            })
        ));
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(ProtocolRevision::Current.kind(0), None);
        assert_eq!(ProtocolRevision::Current.kind(18), None);
        assert_eq!(ProtocolRevision::Legacy.kind(255), None);
    }

    #[test]
    fn test_bootstrap_request() {
        assert_eq!(ProtocolRevision::Legacy.bootstrap_request(), MessageKind::GetVolume);
        assert_eq!(ProtocolRevision::Current.bootstrap_request(), MessageKind::GetSettingsBatch);
    }

    #[test]
    fn test_constructors_check_value_type() {
        assert!(Message::bool(MessageKind::TestMode, true).is_ok());
        assert_eq!(
            Message::bool(MessageKind::Jitter, true),
            Err(LinkError::FieldType { kind: MessageKind::Jitter })
        );
        assert!(Message::u32(MessageKind::Jitter, 50).is_ok());
        assert!(Message::u32(MessageKind::Volume, 50).is_err());
        assert!(Message::request(MessageKind::GetVolume).is_ok());
        assert!(Message::request(MessageKind::Volume).is_err());
    }

    #[test]
    fn test_encode_set_stim_frequency() {
        let bytes = Message::U32 {
            kind: MessageKind::StimFrequency,
            value: 250,
        }
        .encode(ProtocolRevision::Current)
        .unwrap();
        assert_eq!(&bytes[2..], &[5, 4, 250, 0, 0, 0]);
        assert!(crate::checksum::verify(&bytes));
    }

    #[test]
    fn test_decode_scalar_payloads() {
        assert_eq!(Message::decode(MessageKind::Volume, &[42]).unwrap(), Message::Volume(42));
        assert_eq!(
            Message::decode(MessageKind::EightChannel, &[0]).unwrap(),
            Message::Bool {
                kind: MessageKind::EightChannel,
                value: false
            }
        );
        assert_eq!(
            Message::decode(MessageKind::CyclePeriod, &[0x34, 0x05, 0, 0]).unwrap(),
            Message::U32 {
                kind: MessageKind::CyclePeriod,
                value: 1332
            }
        );
        assert!(matches!(
            Message::decode(MessageKind::Volume, &[]),
            Err(LinkError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(MessageKind::from_name("stim_frequency"), Some(MessageKind::StimFrequency));
        assert_eq!(MessageKind::from_name("GetSettingsBatch"), Some(MessageKind::GetSettingsBatch));
        assert_eq!(MessageKind::from_name("eight-channel"), Some(MessageKind::EightChannel));
        assert_eq!(MessageKind::from_name("bogus"), None);
    }

    #[test]
    fn test_revision_from_str() {
        assert_eq!("legacy".parse::<ProtocolRevision>(), Ok(ProtocolRevision::Legacy));
        assert_eq!("Current".parse::<ProtocolRevision>(), Ok(ProtocolRevision::Current));
        assert!("v3".parse::<ProtocolRevision>().is_err());
    }
}
