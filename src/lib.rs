//! # PCM WebSocket Bridge
//!
//! Plays raw PCM audio pushed over a WebSocket on the local output device.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Client A        Client B        Client C          (WebSocket)      │
//! │     │               │               │                               │
//! │     ▼               ▼               ▼                               │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐                         │
//! │  │Connection│   │Connection│   │Connection│   ui::websocket         │
//! │  │ Handler  │   │ Handler  │   │ Handler  │   one task per socket   │
//! │  └────┬─────┘   └────┬─────┘   └────┬─────┘                         │
//! │       │  SegmentStreamer per message │                              │
//! │       ▼              ▼               ▼                              │
//! │  ┌───────────────────────────────────────────┐                      │
//! │  │     Dispatch Queue (audio::queue)         │  bounded, FIFO,      │
//! │  │     enqueue suspends while full           │  backpressure        │
//! │  └─────────────────────┬─────────────────────┘                      │
//! │                        ▼                                            │
//! │  ┌───────────────────────────────────────────┐                      │
//! │  │     Playback Loop (audio::playback)       │  single task         │
//! │  │     dequeue → Volume → Mixer::submit      │                      │
//! │  └─────────────────────┬─────────────────────┘                      │
//! │                        ▼                                            │
//! │  ┌───────────────────────────────────────────┐                      │
//! │  │     Mixer (audio::mixer)                  │  pulled by the cpal  │
//! │  │     render(frames) on device callback     │  output callback     │
//! │  └─────────────────────┬─────────────────────┘                      │
//! │                        ▼                                            │
//! │                 Output device (cpal)                                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate of incoming PCM and of the output device
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Channel count of incoming PCM
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Bytes per sample of incoming PCM (signed)
    pub const DEFAULT_PRECISION: u16 = 1;

    /// Dispatch queue capacity (in segments)
    pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

    /// Output device buffer duration in milliseconds
    pub const DEFAULT_DEVICE_BUFFER_MS: u32 = 100;

    /// Number of segments the mixer accepts ahead of the device
    pub const DEFAULT_MIXER_SLOTS: usize = 8;

    /// Upper bound on `mixer_slots`
    pub const MAX_MIXER_SLOTS: usize = 1024;

    /// How long shutdown waits for the device to drain, on top of its buffer
    pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2000;

    /// Default HTTP/WebSocket port
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Default bind address
    pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

    /// Landing document served for plain HTTP requests
    pub const DEFAULT_INDEX_PATH: &str = "index.html";

    /// Larger WebSocket messages are skipped
    pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1 << 20;

    /// Gain is `VOLUME_BASE ^ VOLUME_LEVEL`
    pub const DEFAULT_VOLUME_BASE: f32 = 2.0;
    pub const DEFAULT_VOLUME_LEVEL: f32 = -2.0;
}
