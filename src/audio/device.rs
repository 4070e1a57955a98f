//! Output device enumeration and the device thread that owns the cpal stream

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::format::AudioFormat;
use crate::audio::mixer::Mixer;
use crate::error::AudioError;

/// Sample rates probed when listing devices
const COMMON_SAMPLE_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

/// Description of an output device for logs and diagnostics
#[derive(Debug, Clone)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// Wrapper around cpal device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            name,
        }
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    /// Get default output config
    pub fn default_output_config(&self) -> Result<cpal::SupportedStreamConfig, AudioError> {
        self.inner
            .default_output_config()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))
    }
}

/// List all output devices of the default host
pub fn list_output_devices() -> Vec<OutputDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let Ok(devices) = host.output_devices() else {
        return Vec::new();
    };

    devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            let (sample_rates, channels) = get_output_capabilities(&device);
            Some(OutputDeviceInfo {
                is_default: default_name.as_ref() == Some(&name),
                name,
                sample_rates,
                channels,
            })
        })
        .collect()
}

fn get_output_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            for rate in COMMON_SAMPLE_RATES {
                let supported = cpal::SampleRate(rate) >= config.min_sample_rate()
                    && cpal::SampleRate(rate) <= config.max_sample_rate();
                if supported && !sample_rates.contains(&rate) {
                    sample_rates.push(rate);
                }
            }

            let ch = config.channels();
            if !channels.contains(&ch) {
                channels.push(ch);
            }
        }
    }

    sample_rates.sort();
    channels.sort();
    (sample_rates, channels)
}

/// Get an output device by name, or the host default when `name` is `None`
pub fn get_output_device(name: Option<&str>) -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();

    let Some(name) = name else {
        return host
            .default_output_device()
            .map(AudioDevice::from_cpal)
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()));
    };

    let devices = host
        .output_devices()
        .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    for device in devices {
        if device.name().ok().as_deref() == Some(name) {
            return Ok(AudioDevice::from_cpal(device));
        }
    }

    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// Open output stream running on its own thread.
///
/// The device callback pulls from the mixer. The thread keeps the stream alive
/// until [`stop`](Self::stop) is called or the handle is dropped.
pub struct OutputDevice {
    device_name: String,
    config: StreamConfig,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Receiver<AudioError>,
}

impl OutputDevice {
    /// Build and start an f32 stream at the format's sample rate.
    ///
    /// Blocks until the stream is playing or has failed to start.
    pub fn open(
        device: AudioDevice,
        format: &AudioFormat,
        buffer_frames: u32,
        mixer: Arc<Mixer>,
    ) -> Result<Self, AudioError> {
        let default_config = device.default_output_config()?;
        let config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: cpal::SampleRate(format.sample_rate()),
            buffer_size: cpal::BufferSize::Fixed(buffer_frames),
        };

        let device_name = device.name.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_for_loop = running.clone();
        let (init_tx, init_rx) = bounded::<Result<StreamConfig, AudioError>>(1);
        let (error_tx, error_rx) = bounded::<AudioError>(16);

        let thread_handle = thread::Builder::new()
            .name("playback-device".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();

                let (stream, config) = match build_stream(&cpal_device, config, mixer, error_tx) {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = init_tx.send(Err(AudioError::PlayFailed(e.to_string())));
                    return;
                }
                let _ = init_tx.send(Ok(config));

                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Stream is dropped here, stopping playback
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let config = init_rx
            .recv()
            .map_err(|_| AudioError::StreamError("device thread exited".to_string()))??;

        Ok(Self {
            device_name,
            config,
            running,
            thread_handle: Some(thread_handle),
            error_rx,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// The stream configuration actually in use
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Check for errors reported by the device callback
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.try_recv().ok()
    }

    /// Stop the stream and join the device thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OutputDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build with the requested fixed buffer, falling back to the device default size
fn build_stream(
    device: &cpal::Device,
    config: StreamConfig,
    mixer: Arc<Mixer>,
    error_tx: Sender<AudioError>,
) -> Result<(cpal::Stream, StreamConfig), AudioError> {
    match try_build_stream(device, &config, mixer.clone(), error_tx.clone()) {
        Ok(stream) => Ok((stream, config)),
        Err(e) if matches!(config.buffer_size, cpal::BufferSize::Fixed(_)) => {
            tracing::warn!("Fixed buffer size refused ({}), using device default", e);
            let fallback = StreamConfig {
                buffer_size: cpal::BufferSize::Default,
                ..config
            };
            let stream = try_build_stream(device, &fallback, mixer, error_tx)?;
            Ok((stream, fallback))
        }
        Err(e) => Err(e),
    }
}

fn try_build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mixer: Arc<Mixer>,
    error_tx: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                mixer.write_interleaved(data, channels);
            },
            move |err| {
                tracing::error!("Output stream error: {}", err);
                let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))
}
