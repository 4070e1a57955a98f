//! Decode-on-demand streamer over one received network message

use bytes::Bytes;
use std::sync::Arc;

use crate::audio::format::{AudioFormat, Frame};
use crate::audio::streamer::{StreamSeeker, Streamer};
use crate::error::StreamError;

/// One message worth of raw PCM and a read cursor into it.
///
/// The cursor counts bytes and always sits on a frame boundary. Trailing bytes
/// that do not make up a whole frame are never decoded and do not count
/// towards [`len`](StreamSeeker::len).
#[derive(Debug, Clone)]
pub struct SegmentStreamer {
    format: Arc<AudioFormat>,
    payload: Bytes,
    cursor: usize,
}

impl SegmentStreamer {
    pub fn new(format: Arc<AudioFormat>, payload: impl Into<Bytes>) -> Self {
        Self {
            format,
            payload: payload.into(),
            cursor: 0,
        }
    }

    /// Payload size in bytes, including any partial trailing frame
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Frames left before the segment is drained
    pub fn remaining(&self) -> usize {
        self.len() - self.position()
    }

    /// No whole frame is left after the cursor
    pub fn is_drained(&self) -> bool {
        self.payload.len() - self.cursor < self.format.width()
    }
}

impl Streamer for SegmentStreamer {
    fn stream(&mut self, frames: &mut [Frame]) -> (usize, bool) {
        if self.is_drained() {
            return (0, false);
        }

        let mut produced = 0;
        for slot in frames.iter_mut() {
            let Some((frame, advance)) = self.format.decode_signed(&self.payload[self.cursor..])
            else {
                break;
            };
            *slot = frame;
            self.cursor += advance;
            produced += 1;
        }

        (produced, true)
    }
}

impl StreamSeeker for SegmentStreamer {
    fn len(&self) -> usize {
        self.payload.len() / self.format.width()
    }

    fn position(&self) -> usize {
        self.cursor / self.format.width()
    }

    fn seek(&mut self, position: i64) -> Result<(), StreamError> {
        let len = self.len();
        if position < 0 || position as u64 > len as u64 {
            return Err(StreamError::SeekOutOfRange { position, len });
        }

        self.cursor = position as usize * self.format.width();
        Ok(())
    }
}
