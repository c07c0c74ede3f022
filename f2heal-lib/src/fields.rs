//! Fixed-offset field access within a message payload.
//!
//! All multi-byte fields are little-endian. Reads never panic: a window that
//! runs past the end of the payload fails with `BufferTooShort`.

use crate::error::LinkError;
use bytes::{Buf, BufMut, BytesMut};

fn window(payload: &[u8], offset: usize, width: usize) -> Result<&[u8], LinkError> {
    offset
        .checked_add(width)
        .and_then(|end| payload.get(offset..end))
        .ok_or(LinkError::BufferTooShort {
            offset,
            width,
            len: payload.len(),
        })
}

/// Interprets a raw byte as a boolean: `0` is false, `1` is true, anything
/// else is rejected so a corrupted byte is not mistaken for `false`.
pub fn bool_from_byte(value: u8, offset: usize) -> Result<bool, LinkError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(LinkError::InvalidBool { offset, value }),
    }
}

pub fn read_u8(payload: &[u8], offset: usize) -> Result<u8, LinkError> {
    Ok(window(payload, offset, 1)?[0])
}

pub fn read_bool(payload: &[u8], offset: usize) -> Result<bool, LinkError> {
    bool_from_byte(read_u8(payload, offset)?, offset)
}

pub fn read_u32_le(payload: &[u8], offset: usize) -> Result<u32, LinkError> {
    Ok(window(payload, offset, 4)?.get_u32_le())
}

pub fn read_u64_le(payload: &[u8], offset: usize) -> Result<u64, LinkError> {
    Ok(window(payload, offset, 8)?.get_u64_le())
}

pub fn read_f32_le(payload: &[u8], offset: usize) -> Result<f32, LinkError> {
    Ok(window(payload, offset, 4)?.get_f32_le())
}

pub fn write_u8(buf: &mut BytesMut, value: u8) {
    buf.put_u8(value);
}

pub fn write_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

pub fn write_u32_le(buf: &mut BytesMut, value: u32) {
    buf.put_u32_le(value);
}
