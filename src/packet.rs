//! Wire format.
//!
//! The stream is a sequence of frames, each a big-endian `u32` length followed
//! by that many payload bytes. A payload opens with [`SeqTsHeader`]: the
//! sender's sequence number (`u32`) and send time (`u64` nanoseconds since
//! the Unix epoch), both big-endian, optionally followed by padding.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;
use crate::time::Timestamp;

pub const HEADER_SIZE: usize = 4 + 8;
pub const LENGTH_PREFIX_SIZE: usize = 4;
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqTsHeader {
    pub seq: u32,
    pub ts: Timestamp,
}

impl SeqTsHeader {
    pub fn new(seq: u32, ts: Timestamp) -> Self {
        Self { seq, ts }
    }

    /// Reads the header off the front of `payload`, ignoring any padding.
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                len: payload.len(),
                min: HEADER_SIZE,
            });
        }
        let mut buf = payload;
        let seq = buf.get_u32();
        let ts = Timestamp(buf.get_u64());
        Ok(Self { seq, ts })
    }

    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32(self.seq);
        dst.put_u64(self.ts.as_nanos());
    }
}

/// Builds a payload of `size` bytes (never less than the header) carrying `header`.
pub fn payload(header: SeqTsHeader, size: usize) -> Bytes {
    let size = size.max(HEADER_SIZE);
    let mut buf = BytesMut::with_capacity(size);
    header.write_to(&mut buf);
    buf.resize(size, 0);
    buf.freeze()
}

pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FrameError::Oversized {
            len: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Splits one complete frame off the front of `src`.
///
/// Returns `Ok(None)` when more bytes are needed; `src` is left untouched in
/// that case apart from reserving room for the rest of the frame.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
    if src.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }
    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::Oversized {
            len,
            max: MAX_FRAME_SIZE,
        });
    }
    if src.len() < LENGTH_PREFIX_SIZE + len {
        src.reserve(LENGTH_PREFIX_SIZE + len - src.len());
        return Ok(None);
    }
    src.advance(LENGTH_PREFIX_SIZE);
    Ok(Some(src.split_to(len).freeze()))
}
