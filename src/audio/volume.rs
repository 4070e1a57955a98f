//! Fixed gain applied to a streamer

use crate::audio::format::Frame;
use crate::audio::streamer::{StreamSeeker, Streamer};
use crate::config::VolumeConfig;
use crate::error::StreamError;

/// Scales every sample by `base ^ level`, or outputs silence when `silent`.
///
/// The level is logarithmic: with base 2, each step of -1 halves the amplitude.
pub struct Volume<S> {
    inner: S,
    gain: f32,
    silent: bool,
}

impl<S: Streamer> Volume<S> {
    pub fn new(inner: S, base: f32, level: f32, silent: bool) -> Self {
        Self {
            inner,
            gain: base.powf(level),
            silent,
        }
    }

    pub fn from_config(inner: S, config: &VolumeConfig) -> Self {
        Self::new(inner, config.base, config.level, config.silent)
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Streamer> Streamer for Volume<S> {
    fn stream(&mut self, frames: &mut [Frame]) -> (usize, bool) {
        let (n, ok) = self.inner.stream(frames);
        let gain = if self.silent { 0.0 } else { self.gain };
        for frame in &mut frames[..n] {
            frame[0] *= gain;
            frame[1] *= gain;
        }
        (n, ok)
    }

    fn err(&self) -> Option<&StreamError> {
        self.inner.err()
    }
}

impl<S: StreamSeeker> StreamSeeker for Volume<S> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn position(&self) -> usize {
        self.inner.position()
    }

    fn seek(&mut self, position: i64) -> Result<(), StreamError> {
        self.inner.seek(position)
    }
}
