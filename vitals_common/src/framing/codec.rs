//! # Frame Codec
//!
//! Stateful decoder for the framed TCP transport. Each frame on the wire is:
//!
//! ```text
//! +------+------+--------+-------+----------------------+
//! | 0xAB | 0xCD | LENGTH | CRC-8 | PAYLOAD (LENGTH B)   |
//! +------+------+--------+-------+----------------------+
//! ```
//!
//! The decoder never fails on malformed input. Leading garbage is skipped by
//! scanning for the next magic (a buffer of four or more bytes without one is
//! dropped whole), a checksum mismatch drops exactly the claimed frame, and a zero length header is consumed as a no-op. The only errors it
//! surfaces are transport I/O errors from the underlying reader.
//!
//! `FrameCodec` plugs into `tokio_util::codec::FramedRead`, which owns the
//! accumulating buffer for one connection. One codec per connection keeps the
//! scan strictly sequential and in stream order.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::crc8::crc8;

/// Two byte frame preamble.
pub const MAGIC: [u8; 2] = [0xAB, 0xCD];
/// Magic + length + checksum.
pub const HEADER_LEN: usize = 4;
/// Largest payload a single length byte can describe.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Errors raised by the frame codec.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_LEN} byte frame limit")]
    PayloadTooLarge(usize),
}

/// Per-connection decode counters, logged when a connection closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that passed the checksum and were emitted.
    pub frames: u64,
    /// Frames dropped because the checksum did not match.
    pub checksum_failures: u64,
    /// Header-only frames (length 0) consumed as no-ops.
    pub empty_frames: u64,
    /// Bytes thrown away while resynchronising or dropping bad frames.
    pub bytes_discarded: u64,
}

/// Codec for `MAGIC | LENGTH | CRC8 | PAYLOAD` frames.
#[derive(Debug, Default)]
pub struct FrameCodec {
    stats: FrameStats,
}

impl FrameCodec {
    /// Creates a codec with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters accumulated since creation.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

fn find_magic(buf: &[u8]) -> Option<usize> {
    buf.windows(MAGIC.len()).position(|w| w == MAGIC)
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        while src.len() >= HEADER_LEN {
            if !src.starts_with(&MAGIC) {
                match find_magic(src) {
                    None => {
                        self.stats.bytes_discarded += src.len() as u64;
                        src.clear();
                        return Ok(None);
                    }
                    Some(offset) => {
                        self.stats.bytes_discarded += offset as u64;
                        src.advance(offset);
                    }
                }
                if src.len() < HEADER_LEN {
                    return Ok(None);
                }
            }

            let length = src[2] as usize;
            let checksum = src[3];

            if length == 0 {
                self.stats.empty_frames += 1;
                src.advance(HEADER_LEN);
                continue;
            }

            let frame_len = HEADER_LEN + length;
            if src.len() < frame_len {
                src.reserve(frame_len - src.len());
                return Ok(None);
            }

            let frame = src.split_to(frame_len).freeze();
            let payload = frame.slice(HEADER_LEN..);
            if crc8(&payload) != checksum {
                self.stats.checksum_failures += 1;
                self.stats.bytes_discarded += frame_len as u64;
                tracing::trace!(
                    length,
                    expected = checksum,
                    actual = crc8(&payload),
                    "frame checksum mismatch, dropping"
                );
                continue;
            }

            self.stats.frames += 1;
            return Ok(Some(payload));
        }
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // Peer closed mid-frame; the residue can never complete.
                self.stats.bytes_discarded += buf.len() as u64;
                buf.clear();
                Ok(None)
            }
        }
    }
}

impl<'a> Encoder<&'a [u8]> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: &'a [u8], dst: &mut BytesMut) -> Result<(), FrameError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }
        dst.reserve(HEADER_LEN + payload.len());
        dst.put_slice(&MAGIC);
        dst.put_u8(payload.len() as u8);
        dst.put_u8(crc8(payload));
        dst.put_slice(payload);
        Ok(())
    }
}

/// Wraps `payload` into a single wire frame.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    FrameCodec::new().encode(payload, &mut buf)?;
    Ok(buf.freeze())
}
