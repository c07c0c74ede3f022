use crate::message::{MessageKind, ProtocolRevision};
use thiserror::Error;

/// The primary error type for the `f2heal-lib` library.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("Payload too large: {len} bytes, at most 255 fit in a frame")]
    PayloadTooLarge { len: usize },

    #[error("Frame too short: expected at least 4 bytes, got {len}")]
    TooShort { len: usize },

    #[error("Length mismatch: header declares {declared} payload bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Checksum mismatch: computed {expected:#06x}, frame carries {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// Also returned for a batch payload whose length is not exactly `width`.
    #[error("Buffer too short: need {width} bytes at offset {offset}, payload has {len}")]
    BufferTooShort { offset: usize, width: usize, len: usize },

    #[error("Invalid boolean at offset {offset}: {value:#04x} is neither 0 nor 1")]
    InvalidBool { offset: usize, value: u8 },

    #[error("{kind} has no type code in the {revision} protocol revision")]
    UnsupportedMessage { kind: MessageKind, revision: ProtocolRevision },

    #[error("{kind} does not carry a value of the requested type")]
    FieldType { kind: MessageKind },

    #[error("Transport error: {0}")]
    Transport(String),
}
