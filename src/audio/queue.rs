//! Bounded hand-off of segments from connection handlers to the playback loop
//!
//! Producers suspend while the queue is full, so a slow device pushes back on
//! the network read loops instead of growing memory. Closing the receiver lets
//! the consumer drain what is already queued and then terminate cleanly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::audio::segment::SegmentStreamer;
use crate::error::NetworkError;

/// Counters shared by both ends of a dispatch queue
#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
}

/// Snapshot of queue activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
}

impl QueueStats {
    /// Segments currently waiting in the queue
    pub fn pending(&self) -> u64 {
        self.enqueued.saturating_sub(self.dequeued)
    }
}

/// Create a dispatch queue holding at most `capacity` segments.
///
/// Panics if `capacity` is zero.
pub fn dispatch_queue(capacity: usize) -> (QueueSender, QueueReceiver) {
    assert!(capacity > 0, "dispatch queue capacity must be positive");

    let (tx, rx) = mpsc::channel(capacity);
    let counters = Arc::new(Counters::default());

    (
        QueueSender {
            tx,
            counters: counters.clone(),
        },
        QueueReceiver { rx, counters },
    )
}

/// Producer side; clone one per connection
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<SegmentStreamer>,
    counters: Arc<Counters>,
}

impl QueueSender {
    /// Hand a segment to the playback loop, waiting for a free slot
    pub async fn enqueue(&self, segment: SegmentStreamer) -> Result<(), NetworkError> {
        self.tx
            .send(segment)
            .await
            .map_err(|_| NetworkError::QueueClosed)?;
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Like [`enqueue`](Self::enqueue) but gives up after `timeout`; the segment is dropped
    pub async fn enqueue_timeout(
        &self,
        segment: SegmentStreamer,
        timeout: Duration,
    ) -> Result<(), NetworkError> {
        match tokio::time::timeout(timeout, self.enqueue(segment)).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::EnqueueTimeout),
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn stats(&self) -> QueueStats {
        snapshot(&self.counters)
    }
}

/// Consumer side, owned by the playback loop
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<SegmentStreamer>,
    counters: Arc<Counters>,
}

impl QueueReceiver {
    /// Next segment in FIFO order; `None` once closed (or every sender dropped) and empty
    pub async fn dequeue(&mut self) -> Option<SegmentStreamer> {
        let segment = self.rx.recv().await?;
        self.counters.dequeued.fetch_add(1, Ordering::Relaxed);
        Some(segment)
    }

    /// Reject further enqueues; segments already queued are still delivered
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn stats(&self) -> QueueStats {
        snapshot(&self.counters)
    }
}

fn snapshot(counters: &Counters) -> QueueStats {
    QueueStats {
        enqueued: counters.enqueued.load(Ordering::Relaxed),
        dequeued: counters.dequeued.load(Ordering::Relaxed),
    }
}
