//! Audio subsystem module

pub mod device;
pub mod format;
pub mod mixer;
pub mod playback;
pub mod queue;
pub mod segment;
pub mod streamer;
pub mod volume;

pub use device::{get_output_device, list_output_devices, OutputDevice};
pub use format::{AudioFormat, Frame};
pub use mixer::Mixer;
pub use playback::{PlaybackHandle, PlaybackLoop};
pub use queue::{dispatch_queue, QueueReceiver, QueueSender, QueueStats};
pub use segment::SegmentStreamer;
pub use streamer::{StreamSeeker, Streamer};
pub use volume::Volume;
