//! Voice mixer pulled by the output device callback
//!
//! The playback loop submits streamers; the device callback renders them.
//! Each submitted streamer holds one slot until it is drained, so the number of
//! segments waiting on the device is bounded and a stalled device eventually
//! stops the playback loop from dequeuing.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::audio::format::Frame;
use crate::audio::streamer::Streamer;
use crate::config::PlaybackPolicy;
use crate::constants::MAX_MIXER_SLOTS;
use crate::error::AudioError;

const SILENCE: Frame = [0.0, 0.0];

/// A submitted streamer and the slot it occupies
struct Voice {
    streamer: Box<dyn Streamer + Send>,
    _slot: OwnedSemaphorePermit,
}

struct MixerState {
    voices: VecDeque<Voice>,
    /// Per-voice buffer for `Mix`
    scratch: Vec<Frame>,
    /// Stereo frames for `write_interleaved`
    frames: Vec<Frame>,
}

/// Renders submitted streamers into device-sized frame batches
pub struct Mixer {
    policy: PlaybackPolicy,
    state: Mutex<MixerState>,
    slots: Arc<Semaphore>,
    max_slots: usize,
}

impl Mixer {
    /// Create a mixer accepting at most `max_slots` undrained streamers,
    /// clamped to `1..=MAX_MIXER_SLOTS`
    pub fn new(policy: PlaybackPolicy, max_slots: usize, buffer_frames: usize) -> Self {
        let max_slots = max_slots.clamp(1, MAX_MIXER_SLOTS);
        Self {
            policy,
            state: Mutex::new(MixerState {
                voices: VecDeque::new(),
                scratch: Vec::with_capacity(buffer_frames),
                frames: Vec::with_capacity(buffer_frames),
            }),
            slots: Arc::new(Semaphore::new(max_slots)),
            max_slots,
        }
    }

    /// Add a streamer, waiting while every slot is taken
    pub async fn submit<S>(&self, streamer: S) -> Result<(), AudioError>
    where
        S: Streamer + Send + 'static,
    {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AudioError::PlayFailed("mixer closed".into()))?;

        self.state.lock().voices.push_back(Voice {
            streamer: Box::new(streamer),
            _slot: slot,
        });
        Ok(())
    }

    /// Number of streamers not yet drained
    pub fn active(&self) -> usize {
        self.state.lock().voices.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active() == 0
    }

    /// Wait until every submitted streamer has been drained
    pub async fn wait_idle(&self) {
        let permits = u32::try_from(self.max_slots).unwrap_or(u32::MAX);
        // every slot back means every voice was dropped
        if let Ok(all) = self.slots.acquire_many(permits).await {
            drop(all);
        }
    }

    /// Drop every voice without playing it, freeing its slot.
    ///
    /// Returns how many voices were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.voices.len();
        state.voices.clear();
        dropped
    }

    /// Fill `out` with the next frames; anything not covered by a voice is silence
    pub fn render(&self, out: &mut [Frame]) {
        let mut state = self.state.lock();
        self.render_locked(&mut state, out);
    }

    /// Render into an interleaved device buffer with `channels` channels.
    ///
    /// Mono devices get the average of left and right; channels past the
    /// second are silent.
    pub fn write_interleaved(&self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let mut state = self.state.lock();

        let mut frames = std::mem::take(&mut state.frames);
        frames.clear();
        frames.resize(data.len() / channels, SILENCE);
        self.render_locked(&mut state, &mut frames);

        for (chunk, frame) in data.chunks_mut(channels).zip(frames.iter()) {
            if channels == 1 {
                chunk[0] = (frame[0] + frame[1]) * 0.5;
            } else {
                chunk[0] = frame[0];
                chunk[1] = frame[1];
                chunk[2..].fill(0.0);
            }
        }
        // a trailing partial chunk cannot hold a frame
        let covered = frames.len() * channels;
        data[covered..].fill(0.0);

        state.frames = frames;
    }

    fn render_locked(&self, state: &mut MixerState, out: &mut [Frame]) {
        out.fill(SILENCE);

        match self.policy {
            PlaybackPolicy::Serialize => render_serial(&mut state.voices, out),
            PlaybackPolicy::Mix => {
                let MixerState {
                    voices, scratch, ..
                } = state;
                render_mixed(voices, scratch, out);
            }
        }
    }
}

/// Play the front voice, continuing into the next one after a short batch
fn render_serial(voices: &mut VecDeque<Voice>, out: &mut [Frame]) {
    let mut filled = 0;
    while filled < out.len() {
        let Some(voice) = voices.front_mut() else {
            break;
        };

        let (n, ok) = voice.streamer.stream(&mut out[filled..]);
        filled += n;
        if !ok {
            voices.pop_front();
        } else if n == 0 {
            break;
        }
    }
}

/// Sum one batch from every voice
fn render_mixed(voices: &mut VecDeque<Voice>, scratch: &mut Vec<Frame>, out: &mut [Frame]) {
    scratch.resize(out.len(), SILENCE);

    voices.retain_mut(|voice| {
        let buf = &mut scratch[..out.len()];
        buf.fill(SILENCE);

        let (n, ok) = voice.streamer.stream(buf);
        for (dst, src) in out.iter_mut().zip(&buf[..n]) {
            dst[0] += src[0];
            dst[1] += src[1];
        }
        ok
    });

    for frame in out.iter_mut() {
        frame[0] = frame[0].clamp(-1.0, 1.0);
        frame[1] = frame[1].clamp(-1.0, 1.0);
    }
}
