//! Error types for the PCM bridge

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Failed to start playback: {0}")]
    PlayFailed(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),
}

/// Errors reported by pull-based streamers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("seek position {position} out of range [0, {len}]")]
    SeekOutOfRange { position: i64, len: usize },
}

/// Network and hand-off errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Dispatch queue closed")]
    QueueClosed,

    #[error("Timed out waiting for a dispatch queue slot")]
    EnqueueTimeout,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
