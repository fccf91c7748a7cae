//! Primitive readers and writers for framed message payloads.
//!
//! Every multi-byte integer on the wire is big-endian. Readers split
//! their value off the front of the payload and hand back the rest, so
//! message parsers chain them without tracking offsets.

use zerocopy::FromBytes;

use crate::error::{Error, Result};

use super::types::{I16BE, I32BE, U16BE, U32BE};

fn truncated(have: usize, need: usize) -> Error {
    Error::Protocol(format!(
        "message truncated: {need} bytes needed, {have} left"
    ))
}

/// Split one fixed-width big-endian integer off the front of `data`.
fn take<T: FromBytes>(data: &[u8]) -> Result<(T, &[u8])> {
    T::read_from_prefix(data).map_err(|_| truncated(data.len(), std::mem::size_of::<T>()))
}

/// Read a single byte.
#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&byte, rest)) => Ok((byte, rest)),
        None => Err(truncated(0, 1)),
    }
}

/// Read a big-endian i16.
#[inline]
pub fn read_i16(data: &[u8]) -> Result<(i16, &[u8])> {
    take::<I16BE>(data).map(|(value, rest)| (value.get(), rest))
}

/// Read a big-endian u16.
#[inline]
pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    take::<U16BE>(data).map(|(value, rest)| (value.get(), rest))
}

/// Read a big-endian i32.
#[inline]
pub fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    take::<I32BE>(data).map(|(value, rest)| (value.get(), rest))
}

/// Read a big-endian u32.
#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    take::<U32BE>(data).map(|(value, rest)| (value.get(), rest))
}

/// Read `len` raw bytes.
#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(truncated(data.len(), len));
    }
    Ok(data.split_at(len))
}

/// Read a null-terminated UTF-8 string, dropping the terminator.
#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let end = memchr::memchr(0, data)
        .ok_or_else(|| Error::Protocol("string field missing its null terminator".into()))?;
    let s = simdutf8::basic::from_utf8(&data[..end])
        .map_err(|e| Error::Protocol(format!("string field is not UTF-8: {e}")))?;
    Ok((s, &data[end + 1..]))
}

/// Incremental builder for one framed message.
///
/// Frames are `[tag][i32 length][payload]`, where the length covers
/// itself and the payload but not the tag byte. The length slot is
/// reserved up front and patched by [`finish`](Self::finish), so
/// payload writers never count bytes themselves.
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    len_at: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Open a tagged frame.
    pub fn tagged(buf: &'a mut Vec<u8>, tag: u8) -> Self {
        buf.push(tag);
        Self::untagged(buf)
    }

    /// Open a frame with no tag byte (only the startup message).
    pub fn untagged(buf: &'a mut Vec<u8>) -> Self {
        let len_at = buf.len();
        buf.extend_from_slice(&i32::MIN.to_be_bytes()); // patched by finish()
        Self { buf, len_at }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a string followed by its null terminator.
    pub fn write_cstr(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Patch the reserved length slot and close the frame.
    pub fn finish(self) {
        let len = (self.buf.len() - self.len_at) as i32;
        self.buf[self.len_at..self.len_at + 4].copy_from_slice(&len.to_be_bytes());
    }
}
