use crate::types::{
    LENGTH_PREFIX_SIZE,
    error::{DatabaseError, Result},
    row::Row,
};

/// A value that can be stored as the payload of a length-prefixed frame.
pub trait Record: Sized {
    fn to_payload(&self) -> Vec<u8>;
    fn from_payload(payload: &[u8]) -> Result<Self>;
}

/// Raw bytes. An empty vector frames as a zero length prefix, which
/// `decode_stream` reads as padding, so empty payloads do not come back.
impl Record for Vec<u8> {
    fn to_payload(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(payload.to_vec())
    }
}

impl Record for Row {
    fn to_payload(&self) -> Vec<u8> {
        self.to_bytes()
    }

    fn from_payload(payload: &[u8]) -> Result<Self> {
        Row::from_bytes(payload)
    }
}

/// A complete frame found in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Offset of the length prefix.
    pub offset: usize,
    pub payload: &'a [u8],
}

impl Frame<'_> {
    pub fn framed_len(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.payload.len()
    }
}

/// Walks `[u32 LE len][payload]` frames, stopping at the first incomplete
/// one. A zero length is page padding and also ends the walk.
pub struct FrameIter<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> FrameIter<'a> {
    /// Bytes covered by the frames yielded so far.
    pub fn consumed(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.buffer.len() - self.offset;
        if remaining < LENGTH_PREFIX_SIZE {
            return None;
        }
        let at = self.offset;
        let length = u32::from_le_bytes([
            self.buffer[at],
            self.buffer[at + 1],
            self.buffer[at + 2],
            self.buffer[at + 3],
        ]) as usize;
        if length == 0 || length > remaining - LENGTH_PREFIX_SIZE {
            return None;
        }
        let start = at + LENGTH_PREFIX_SIZE;
        self.offset = start + length;
        Some(Frame {
            offset: at,
            payload: &self.buffer[start..start + length],
        })
    }
}

pub struct RecordCodec;

impl RecordCodec {
    pub fn frame(payload: &[u8]) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
        buffer.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buffer.extend_from_slice(payload);
        buffer
    }

    pub fn encode<R: Record>(record: &R) -> Vec<u8> {
        Self::frame(&record.to_payload())
    }

    pub fn frames(buffer: &[u8]) -> FrameIter<'_> {
        FrameIter { buffer, offset: 0 }
    }

    /// Decodes every complete frame from the start of `buffer`, returning the
    /// records and the number of bytes they occupy.
    pub fn decode_stream<R: Record>(buffer: &[u8]) -> Result<(Vec<R>, usize)> {
        let mut frames = Self::frames(buffer);
        let mut records = Vec::new();
        for frame in frames.by_ref() {
            records.push(R::from_payload(frame.payload).map_err(|e| {
                DatabaseError::serialization(format!(
                    "Frame at offset {} failed to decode: {}",
                    frame.offset, e
                ))
            })?);
        }
        Ok((records, frames.consumed()))
    }
}
