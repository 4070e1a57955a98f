//! Playback loop: moves segments from the dispatch queue into the device mixer

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::audio::device::{get_output_device, OutputDevice};
use crate::audio::format::AudioFormat;
use crate::audio::mixer::Mixer;
use crate::audio::queue::QueueReceiver;
use crate::audio::segment::SegmentStreamer;
use crate::audio::streamer::StreamSeeker;
use crate::audio::volume::Volume;
use crate::config::{AudioConfig, VolumeConfig};
use crate::error::Result;

/// Running playback loop and the device it feeds
pub struct PlaybackHandle {
    task: JoinHandle<()>,
    output: OutputDevice,
}

impl PlaybackHandle {
    /// Wait for the loop to finish draining, then close the device
    pub async fn join(mut self) {
        if let Err(e) = (&mut self.task).await {
            tracing::error!("Playback loop panicked: {}", e);
        }
        if let Some(e) = self.output.check_errors() {
            tracing::warn!("Last output stream error: {}", e);
        }
        self.output.stop();
    }
}

pub struct PlaybackLoop;

impl PlaybackLoop {
    /// Open the output device and start the loop.
    ///
    /// A device that cannot be opened is returned as an error; there is no
    /// audio path without it.
    pub fn start(
        config: &AudioConfig,
        format: &AudioFormat,
        receiver: QueueReceiver,
        shutdown: watch::Receiver<bool>,
    ) -> Result<PlaybackHandle> {
        let buffer_frames = config.device_buffer_frames()?;
        let mixer = Arc::new(Mixer::new(
            config.policy,
            config.mixer_slots,
            buffer_frames as usize,
        ));

        let device = get_output_device(config.output_device.as_deref())?;
        let output = OutputDevice::open(device, format, buffer_frames, mixer.clone())?;
        tracing::info!(
            "Opened output device '{}': {} Hz, {} channels, buffer {:?}, policy {:?}",
            output.device_name(),
            output.config().sample_rate.0,
            output.config().channels,
            output.config().buffer_size,
            config.policy,
        );

        let volume = config.volume.enabled.then(|| config.volume.clone());
        let task = tokio::spawn(run(
            receiver,
            mixer,
            volume,
            shutdown,
            config.drain_timeout(),
        ));

        Ok(PlaybackHandle { task, output })
    }
}

/// Dequeue segments and submit them to `mixer` until the queue terminates.
///
/// When `shutdown` flips to `true` the queue is closed, segments already
/// queued are still submitted, and the loop returns once the mixer is idle.
/// If that takes longer than `drain_timeout` (a stalled device), whatever is
/// left is dropped.
pub async fn run(
    receiver: QueueReceiver,
    mixer: Arc<Mixer>,
    volume: Option<VolumeConfig>,
    shutdown: watch::Receiver<bool>,
    drain_timeout: Duration,
) {
    tokio::select! {
        () = play(receiver, &mixer, volume, shutdown.clone()) => {}
        () = shutdown_deadline(shutdown, drain_timeout) => {
            let dropped = mixer.clear();
            tracing::warn!(
                "Output did not drain within {:?} of shutdown, dropped {} unplayed segment(s)",
                drain_timeout,
                dropped
            );
        }
    }
}

async fn play(
    mut receiver: QueueReceiver,
    mixer: &Mixer,
    volume: Option<VolumeConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut closing = *shutdown.borrow();
    if closing {
        receiver.close();
    }

    loop {
        let segment = if closing {
            receiver.dequeue().await
        } else {
            tokio::select! {
                segment = receiver.dequeue() => segment,
                changed = shutdown.changed() => {
                    // a dropped sender also means shut down
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Playback loop closing dispatch queue");
                        receiver.close();
                        closing = true;
                    }
                    continue;
                }
            }
        };

        let Some(segment) = segment else {
            break;
        };

        if let Err(e) = submit(mixer, segment, volume.as_ref()).await {
            tracing::error!("Mixer rejected segment: {}", e);
            break;
        }
    }

    mixer.wait_idle().await;
    let stats = receiver.stats();
    tracing::info!(
        "Playback loop finished: {} segments enqueued, {} played",
        stats.enqueued,
        stats.dequeued
    );
}

/// Resolves `grace` after shutdown is signalled
async fn shutdown_deadline(mut shutdown: watch::Receiver<bool>, grace: Duration) {
    loop {
        if *shutdown.borrow_and_update() {
            break;
        }
        // a dropped sender also means shut down
        if shutdown.changed().await.is_err() {
            break;
        }
    }
    tokio::time::sleep(grace).await;
}

async fn submit(
    mixer: &Mixer,
    segment: SegmentStreamer,
    volume: Option<&VolumeConfig>,
) -> std::result::Result<(), crate::error::AudioError> {
    tracing::trace!("Submitting segment of {} frames", segment.len());
    match volume {
        Some(volume) => mixer.submit(Volume::from_config(segment, volume)).await,
        None => mixer.submit(segment).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::Frame;
    use crate::audio::queue::dispatch_queue;
    use crate::config::PlaybackPolicy;
    use crate::error::NetworkError;

    const GRACE: Duration = Duration::from_secs(5);

    fn segment(byte: u8, len: usize) -> SegmentStreamer {
        SegmentStreamer::new(
            Arc::new(AudioFormat::new(48000, 1, 1).unwrap()),
            vec![byte; len],
        )
    }

    /// Render until the mixer is idle, collecting left-channel samples
    async fn drain(mixer: &Mixer, batch: usize) -> Vec<f32> {
        let mut out = vec![[0.0f32; 2]; batch];
        let mut samples = Vec::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(2)).await;
            mixer.render(&mut out);
            samples.extend(out.iter().map(|f: &Frame| f[0]));
            if mixer.is_idle() {
                break;
            }
        }
        samples
    }

    #[tokio::test]
    async fn test_segments_reach_mixer_in_order() {
        let (tx, rx) = dispatch_queue(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mixer = Arc::new(Mixer::new(PlaybackPolicy::Serialize, 4, 8));
        let task = tokio::spawn(run(rx, mixer.clone(), None, shutdown_rx, GRACE));

        tx.enqueue(segment(0x40, 3)).await.unwrap();
        tx.enqueue(segment(0xC0, 2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let samples = drain(&mixer, 8).await;
        assert_eq!(&samples[..5], &[0.5, 0.5, 0.5, -0.5, -0.5]);

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_volume_applied() {
        let (tx, rx) = dispatch_queue(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mixer = Arc::new(Mixer::new(PlaybackPolicy::Serialize, 4, 8));
        let volume = VolumeConfig::default();
        tokio::spawn(run(rx, mixer.clone(), Some(volume), shutdown_rx, GRACE));

        tx.enqueue(segment(0x40, 2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let samples = drain(&mixer, 4).await;
        assert_eq!(&samples[..2], &[0.125, 0.125]);
    }

    #[tokio::test]
    async fn test_shutdown_signal_closes_queue() {
        let (tx, rx) = dispatch_queue(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mixer = Arc::new(Mixer::new(PlaybackPolicy::Serialize, 4, 8));
        let task = tokio::spawn(run(rx, mixer.clone(), None, shutdown_rx, GRACE));

        tx.enqueue(segment(0x40, 4)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            tx.enqueue(segment(0x40, 4)).await,
            Err(NetworkError::QueueClosed)
        ));
        // still waiting for the mixer to play the submitted segment
        assert!(!task.is_finished());

        let samples = drain(&mixer, 8).await;
        assert_eq!(&samples[..4], &[0.5; 4]);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_queue_still_plays_backlog() {
        let (tx, rx) = dispatch_queue(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);
        let mixer = Arc::new(Mixer::new(PlaybackPolicy::Serialize, 1, 4));

        for _ in 0..3 {
            tx.enqueue(segment(0x40, 4)).await.unwrap();
        }

        let task = tokio::spawn(run(rx, mixer.clone(), None, shutdown_rx, GRACE));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            tx.enqueue(segment(0x40, 4)).await,
            Err(NetworkError::QueueClosed)
        ));

        let mut out = [[0.0f32; 2]; 4];
        let mut played = 0;
        for _ in 0..200 {
            if task.is_finished() {
                break;
            }
            mixer.render(&mut out);
            played += out.iter().filter(|f| f[0] == 0.5).count();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert_eq!(played, 12);
        task.await.unwrap();
        assert_eq!(tx.stats().dequeued, 3);
    }

    #[tokio::test]
    async fn test_shutdown_gives_up_on_stalled_device() {
        let (tx, rx) = dispatch_queue(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mixer = Arc::new(Mixer::new(PlaybackPolicy::Serialize, 1, 8));
        let task = tokio::spawn(run(
            rx,
            mixer.clone(),
            None,
            shutdown_rx,
            Duration::from_millis(50),
        ));

        // the first fills the only slot, the second waits in submit
        tx.enqueue(segment(0x40, 48)).await.unwrap();
        tx.enqueue(segment(0x40, 48)).await.unwrap();
        tx.enqueue(segment(0x40, 48)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mixer.active(), 1);

        // nothing ever renders
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("playback loop hung after shutdown")
            .unwrap();

        assert!(mixer.is_idle());
        assert!(matches!(
            tx.enqueue(segment(0x40, 4)).await,
            Err(NetworkError::QueueClosed)
        ));
    }
}
