//! BLE frame layout:
//!
//! ```text
//! [checksum_lo, checksum_hi, type, length, payload[0..length)]
//! ```
//!
//! The checksum covers `type`, `length` and the payload. Frames are not
//! self-describing beyond the type byte: see [`crate::message::ProtocolRevision`].

use crate::checksum::{checksum, checksum_u16};
use crate::constants::{CHECKSUM_START, HEADER_SIZE, LENGTH_OFFSET, MAX_PAYLOAD_SIZE, MIN_FRAME_SIZE, TYPE_OFFSET};
use crate::error::LinkError;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What to do with a length-valid frame whose checksum does not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChecksumPolicy {
    /// Discard the frame with `ChecksumMismatch`
    #[default]
    Strict,
    /// Log a warning and decode the frame anyway
    Lenient,
}

/// A single framed message: type byte plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    type_code: u8,
    payload: Bytes,
}

impl Frame {
    pub fn new(type_code: u8, payload: impl Into<Bytes>) -> Result<Self, LinkError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(LinkError::PayloadTooLarge { len: payload.len() });
        }
        Ok(Self { type_code, payload })
    }

    pub fn type_code(&self) -> u8 {
        self.type_code
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serializes the frame, filling in the checksum over bytes `[2..end)`.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_slice(&[0, 0, self.type_code, self.payload.len() as u8]);
        buf.put_slice(&self.payload);
        let (lo, hi) = checksum(&buf[CHECKSUM_START..]);
        buf[0] = lo;
        buf[1] = hi;
        buf.freeze()
    }

    /// Parses the framing of `raw` and applies `policy` to its checksum.
    pub fn parse(raw: &[u8], policy: ChecksumPolicy) -> Result<Self, LinkError> {
        let frame = Frame::try_from(raw)?;
        let expected = checksum_u16(&raw[CHECKSUM_START..]);
        let actual = u16::from_le_bytes([raw[0], raw[1]]);
        if expected != actual {
            match policy {
                ChecksumPolicy::Strict => return Err(LinkError::ChecksumMismatch { expected, actual }),
                ChecksumPolicy::Lenient => warn!(
                    "Checksum mismatch (computed {:#06x}, frame carries {:#06x}), decoding anyway",
                    expected, actual
                ),
            }
        }
        Ok(frame)
    }
}

/// Framing checks only; the checksum is left to the caller.
impl TryFrom<&[u8]> for Frame {
    type Error = LinkError;

    fn try_from(raw: &[u8]) -> Result<Self, Self::Error> {
        if raw.len() < MIN_FRAME_SIZE {
            return Err(LinkError::TooShort { len: raw.len() });
        }
        let declared = raw[LENGTH_OFFSET] as usize;
        let actual = raw.len() - HEADER_SIZE;
        if declared != actual {
            return Err(LinkError::LengthMismatch { declared, actual });
        }
        Ok(Self {
            type_code: raw[TYPE_OFFSET],
            payload: Bytes::copy_from_slice(&raw[HEADER_SIZE..]),
        })
    }
}

impl From<Frame> for Bytes {
    fn from(frame: Frame) -> Self {
        frame.to_bytes()
    }
}

/// Encodes `(type_code, payload)` into a checksummed frame.
pub fn encode(type_code: u8, payload: &[u8]) -> Result<Bytes, LinkError> {
    Ok(Frame::new(type_code, Bytes::copy_from_slice(payload))?.to_bytes())
}

/// Splits a frame into its type byte and payload without checking the checksum.
pub fn decode(raw: &[u8]) -> Result<(u8, Bytes), LinkError> {
    let frame = Frame::try_from(raw)?;
    Ok((frame.type_code, frame.payload))
}
