//! Multipart framing over a byte stream.
//!
//! Each multipart message is a big-endian `u32` frame count followed by, for
//! every frame, a big-endian `u32` length and the frame bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::TransportError;

const LEN: usize = 4;

/// Default limit on one encoded multipart message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// Codec for `Vec<Bytes>` multipart messages.
#[derive(Debug, Clone, Copy)]
pub struct MultipartCodec {
    max_message_bytes: usize,
}

impl Default for MultipartCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_BYTES)
    }
}

impl MultipartCodec {
    #[must_use]
    pub const fn new(max_message_bytes: usize) -> Self {
        Self { max_message_bytes }
    }

    fn too_large(&self, size: usize) -> TransportError {
        TransportError::MessageTooLarge {
            size,
            max: self.max_message_bytes,
        }
    }
}

fn read_len(src: &[u8], at: usize) -> Option<usize> {
    let mut raw = src.get(at..at + LEN)?;
    Some(raw.get_u32() as usize)
}

impl Decoder for MultipartCodec {
    type Item = Vec<Bytes>;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(count) = read_len(src, 0) else {
            return Ok(None);
        };
        if count.saturating_mul(LEN) > self.max_message_bytes {
            return Err(self.too_large(count.saturating_mul(LEN)));
        }

        // Walk the length prefixes without consuming until the whole message
        // is buffered.
        let mut end = LEN;
        for _ in 0..count {
            let Some(len) = read_len(src, end) else {
                return Ok(None);
            };
            end += LEN;
            let total = end.saturating_add(len);
            if total > self.max_message_bytes {
                return Err(self.too_large(total));
            }
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }
            end = total;
        }

        let mut buf = src.split_to(end).freeze();
        buf.advance(LEN);
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            let len = buf.get_u32() as usize;
            frames.push(buf.split_to(len));
        }
        Ok(Some(frames))
    }
}

impl Encoder<Vec<Bytes>> for MultipartCodec {
    type Error = TransportError;

    fn encode(&mut self, frames: Vec<Bytes>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = LEN + frames.iter().map(|f| LEN + f.len()).sum::<usize>();
        if size > self.max_message_bytes {
            return Err(self.too_large(size));
        }
        let count = u32::try_from(frames.len()).map_err(|_| self.too_large(size))?;

        dst.reserve(size);
        dst.put_u32(count);
        for frame in frames {
            let len = u32::try_from(frame.len()).map_err(|_| self.too_large(size))?;
            dst.put_u32(len);
            dst.extend_from_slice(&frame);
        }
        Ok(())
    }
}
