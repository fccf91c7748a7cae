//! Inbound frame reassembly.
//!
//! TCP delivers the server's byte stream in arbitrary chunks; nothing
//! aligns chunk boundaries with message boundaries. The reassembler keeps
//! the trailing partial frame between reads and peels off whole
//! `[tag][length][payload]` frames as soon as they are complete.

use crate::error::{Error, Result};

/// A whole inbound frame: type byte plus payload (length field stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    pub payload: Vec<u8>,
}

/// Rolling reassembly buffer.
///
/// Invariant: between calls, `tail` is always a strict prefix of some
/// valid frame.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    tail: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of socket bytes and return every frame completed by
    /// it, in stream order.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        self.tail.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut offset = 0;

        while self.tail.len() - offset >= 5 {
            let header = &self.tail[offset..];
            let length = i32::from_be_bytes([header[1], header[2], header[3], header[4]]);
            if length < 4 {
                return Err(Error::Protocol(format!(
                    "invalid frame length: {length}"
                )));
            }

            let total = 1 + length as usize;
            if self.tail.len() - offset < total {
                break;
            }

            frames.push(Frame {
                tag: header[0],
                payload: header[5..total].to_vec(),
            });
            offset += total;
        }

        self.tail.drain(..offset);
        Ok(frames)
    }

    /// Bytes currently held back as a partial frame.
    pub fn pending(&self) -> usize {
        self.tail.len()
    }
}
