//! Application configuration
//!
//! Loaded from a TOML file; every section and field is optional and falls back
//! to the values in [`crate::constants`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::format::AudioFormat;
use crate::constants::*;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub queue: QueueConfig,
}

/// HTTP / WebSocket listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub http_port: u16,
    /// Document served to any request that is not a WebSocket upgrade
    pub index_path: PathBuf,
    /// Larger messages are skipped instead of played
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// How the mixer treats segments that are pending at the same time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPolicy {
    /// One segment at a time, in queue order
    #[default]
    Serialize,
    /// Overlay all pending segments
    Mix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes per signed sample
    pub precision: u16,
    pub device_buffer_ms: u32,
    /// Output device name; the host default when unset
    pub output_device: Option<String>,
    pub policy: PlaybackPolicy,
    /// Segments the mixer accepts ahead of the device
    pub mixer_slots: usize,
    /// Extra time, past the device buffer, that shutdown waits for playback to finish
    pub shutdown_grace_ms: u64,
    pub volume: VolumeConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            precision: DEFAULT_PRECISION,
            device_buffer_ms: DEFAULT_DEVICE_BUFFER_MS,
            output_device: None,
            policy: PlaybackPolicy::default(),
            mixer_slots: DEFAULT_MIXER_SLOTS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            volume: VolumeConfig::default(),
        }
    }
}

impl AudioConfig {
    pub fn format(&self) -> Result<AudioFormat> {
        Ok(AudioFormat::new(self.sample_rate, self.channels, self.precision)?)
    }

    pub fn device_buffer(&self) -> Duration {
        Duration::from_millis(u64::from(self.device_buffer_ms))
    }

    /// Device buffer size in frames at the configured rate
    pub fn device_buffer_frames(&self) -> Result<u32> {
        let frames = self.format()?.frames_for(self.device_buffer());
        u32::try_from(frames).map_err(|_| {
            Error::Config(format!(
                "device buffer of {} ms at {} Hz does not fit in a cpal buffer size",
                self.device_buffer_ms, self.sample_rate
            ))
        })
    }

    /// How long shutdown waits for the mixer before dropping what is left
    pub fn drain_timeout(&self) -> Duration {
        self.device_buffer() + Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Fixed gain of `base ^ level` applied to every segment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub enabled: bool,
    pub base: f32,
    pub level: f32,
    pub silent: bool,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base: DEFAULT_VOLUME_BASE,
            level: DEFAULT_VOLUME_LEVEL,
            silent: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    /// Drop a connection whose segment waits longer than this for a slot
    pub enqueue_timeout_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            enqueue_timeout_ms: None,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// `config.toml` in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "pcm-ws-bridge")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load `path` if given (it must exist), else the default path if present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.device_buffer_frames()? == 0 {
            return Err(Error::Config("device buffer must hold at least one frame".into()));
        }
        if self.audio.mixer_slots == 0 || self.audio.mixer_slots > MAX_MIXER_SLOTS {
            return Err(Error::Config(format!(
                "mixer_slots must be between 1 and {}",
                MAX_MIXER_SLOTS
            )));
        }
        if self.audio.volume.base <= 0.0 {
            return Err(Error::Config("volume base must be positive".into()));
        }
        if self.queue.capacity == 0 {
            return Err(Error::Config("queue capacity must be positive".into()));
        }
        if self.server.max_message_bytes == 0 {
            return Err(Error::Config("max_message_bytes must be positive".into()));
        }
        Ok(())
    }
}
