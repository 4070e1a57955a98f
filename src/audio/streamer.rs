//! Pull contract shared by everything the mixer can play

use crate::audio::format::Frame;
use crate::error::StreamError;

/// A source of frames pulled at the device's cadence.
///
/// `stream` fills a prefix of `frames` and returns how many were written plus a
/// continuation flag. `false` means nothing was left when the call started; a
/// short batch with `true` is a legal last batch.
pub trait Streamer {
    fn stream(&mut self, frames: &mut [Frame]) -> (usize, bool);

    /// Persistent fatal error, if any
    fn err(&self) -> Option<&StreamError> {
        None
    }
}

/// A streamer with a known length that can be repositioned
pub trait StreamSeeker: Streamer {
    /// Total frames
    fn len(&self) -> usize;

    /// Current position in frames
    fn position(&self) -> usize;

    /// Move to `position` (in frames); out-of-range positions leave the streamer untouched
    fn seek(&mut self, position: i64) -> Result<(), StreamError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Streamer + ?Sized> Streamer for Box<S> {
    fn stream(&mut self, frames: &mut [Frame]) -> (usize, bool) {
        (**self).stream(frames)
    }

    fn err(&self) -> Option<&StreamError> {
        (**self).err()
    }
}
