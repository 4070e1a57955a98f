//! Fixed PCM format descriptor and signed sample decoding

use std::time::Duration;

use crate::error::AudioError;

/// One decoded output frame: left and right amplitude in `[-1.0, 1.0]`
pub type Frame = [f32; 2];

/// Largest supported sample size in bytes (32-bit PCM)
pub const MAX_PRECISION: u16 = 4;

/// Immutable description of the raw PCM carried by each network message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    sample_rate: u32,
    channels: u16,
    precision: u16,
}

impl AudioFormat {
    /// Create a format; rate and channels must be non-zero and precision in `1..=4` bytes
    pub fn new(sample_rate: u32, channels: u16, precision: u16) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidFormat("sample rate must be positive".into()));
        }
        if channels == 0 {
            return Err(AudioError::InvalidFormat("channel count must be positive".into()));
        }
        if precision == 0 || precision > MAX_PRECISION {
            return Err(AudioError::UnsupportedFormat(format!(
                "{} byte samples (expected 1..={})",
                precision, MAX_PRECISION
            )));
        }

        Ok(Self {
            sample_rate,
            channels,
            precision,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Bytes per sample of a single channel
    pub fn precision(&self) -> u16 {
        self.precision
    }

    /// Bytes per frame (all channels)
    pub fn width(&self) -> usize {
        self.channels as usize * self.precision as usize
    }

    /// Number of frames covering `duration` at this format's rate
    pub fn frames_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.sample_rate as f64).round() as usize
    }

    /// Decode one frame of signed little-endian PCM from the start of `bytes`.
    ///
    /// Returns the frame and the number of bytes consumed, or `None` when fewer
    /// than [`width`](Self::width) bytes are available. Mono input is copied to
    /// both output channels; channels beyond the second are skipped.
    pub fn decode_signed(&self, bytes: &[u8]) -> Option<(Frame, usize)> {
        let width = self.width();
        if bytes.len() < width {
            return None;
        }

        let precision = self.precision as usize;
        let mut frame = [0.0f32; 2];
        for (channel, slot) in frame.iter_mut().enumerate() {
            let channel = channel.min(self.channels as usize - 1);
            let start = channel * precision;
            *slot = signed_to_f32(&bytes[start..start + precision]);
        }

        Some((frame, width))
    }
}

/// Scale a little-endian two's complement integer of 1 to 4 bytes into `[-1.0, 1.0]`
fn signed_to_f32(bytes: &[u8]) -> f32 {
    let bits = 8 * bytes.len() as u32;
    let raw = bytes
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, b)| acc | (*b as u32) << (8 * i));

    // sign-extend from `bits` to 32
    let shift = 32 - bits;
    let value = ((raw << shift) as i32) >> shift;
    let scale = (1u64 << (bits - 1)) as f64;

    (value as f64 / scale).clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_validation() {
        assert!(AudioFormat::new(48000, 1, 1).is_ok());
        assert!(matches!(
            AudioFormat::new(0, 1, 1),
            Err(AudioError::InvalidFormat(_))
        ));
        assert!(matches!(
            AudioFormat::new(48000, 0, 1),
            Err(AudioError::InvalidFormat(_))
        ));
        assert!(matches!(
            AudioFormat::new(48000, 1, 5),
            Err(AudioError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_width() {
        assert_eq!(AudioFormat::new(48000, 1, 1).unwrap().width(), 1);
        assert_eq!(AudioFormat::new(48000, 2, 2).unwrap().width(), 4);
        assert_eq!(AudioFormat::new(44100, 6, 3).unwrap().width(), 18);
    }

    #[test]
    fn test_decode_8bit_mono() {
        let format = AudioFormat::new(48000, 1, 1).unwrap();

        let (frame, n) = format.decode_signed(&[0x80, 0x00]).unwrap();
        assert_eq!(n, 1);
        assert_eq!(frame, [-1.0, -1.0]);

        let (frame, _) = format.decode_signed(&[0x40]).unwrap();
        assert_eq!(frame, [0.5, 0.5]);

        let (frame, _) = format.decode_signed(&[0x00]).unwrap();
        assert_eq!(frame, [0.0, 0.0]);
    }

    #[test]
    fn test_decode_16bit_stereo() {
        let format = AudioFormat::new(48000, 2, 2).unwrap();
        // left = 0x4000 (0.5), right = 0xC000 (-0.5)
        let bytes = [0x00, 0x40, 0x00, 0xC0];

        let (frame, n) = format.decode_signed(&bytes).unwrap();
        assert_eq!(n, 4);
        assert_eq!(frame, [0.5, -0.5]);
    }

    #[test]
    fn test_decode_24bit_negative() {
        let format = AudioFormat::new(48000, 1, 3).unwrap();
        let (frame, n) = format.decode_signed(&[0x00, 0x00, 0x80]).unwrap();
        assert_eq!(n, 3);
        assert_eq!(frame[0], -1.0);
    }

    #[test]
    fn test_decode_extra_channels_skipped() {
        let format = AudioFormat::new(48000, 3, 1).unwrap();
        let (frame, n) = format.decode_signed(&[0x40, 0xC0, 0x7F]).unwrap();
        assert_eq!(n, 3);
        assert_eq!(frame, [0.5, -0.5]);
    }

    #[test]
    fn test_decode_short_input() {
        let format = AudioFormat::new(48000, 2, 2).unwrap();
        assert!(format.decode_signed(&[0x00, 0x40, 0x00]).is_none());
        assert!(format.decode_signed(&[]).is_none());
    }

    #[test]
    fn test_frames_for() {
        let format = AudioFormat::new(48000, 1, 1).unwrap();
        assert_eq!(format.frames_for(Duration::from_millis(100)), 4800);
    }
}
