// Protocol constants for the F2Heal VHP BLE link

/// Size of the frame header: checksum (2 bytes), type, payload length
pub const HEADER_SIZE: usize = 4;

/// Offset of the message type byte within a frame
pub const TYPE_OFFSET: usize = 2;

/// Offset of the payload length byte within a frame
pub const LENGTH_OFFSET: usize = 3;

/// Offset where checksummed bytes begin (type, length, payload)
pub const CHECKSUM_START: usize = TYPE_OFFSET;

/// Largest payload the one-byte length field can describe
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;

/// Minimum size for a valid frame (header only)
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE;

/// Size of the settings batch payload (26 bytes)
pub const SETTINGS_BATCH_SIZE: usize = 26;

/// Size of the status batch payload (13 bytes)
pub const STATUS_BATCH_SIZE: usize = 13;

/// Fletcher-16 initial value of the first running sum
pub const FLETCHER_INIT: u32 = 1;

/// Fletcher-16 modulus
pub const FLETCHER_MODULUS: u32 = 255;
