//! Connection handler: every inbound WebSocket message becomes one segment

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::audio::format::AudioFormat;
use crate::audio::segment::SegmentStreamer;
use crate::error::NetworkError;
use crate::ui::server::AppState;

/// Messages the bridge sends to clients
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once on connect: the PCM layout every payload must use
    Format {
        sample_rate: u32,
        channels: u16,
        precision: u16,
    },
}

impl From<&AudioFormat> for ServerMessage {
    fn from(format: &AudioFormat) -> Self {
        ServerMessage::Format {
            sample_rate: format.sample_rate(),
            channels: format.channels(),
            precision: format.precision(),
        }
    }
}

/// Write half of a socket; the transport allows one writer at a time
pub struct SocketWriter<S> {
    sink: Mutex<S>,
}

impl<S> SocketWriter<S>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    pub fn new(sink: S) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub async fn send(&self, message: Message) -> Result<(), NetworkError> {
        let mut sink = self.sink.lock().await;
        sink.send(message)
            .await
            .map_err(|e| NetworkError::SendFailed(e.to_string()))
    }

    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<(), NetworkError> {
        let text =
            serde_json::to_string(value).map_err(|e| NetworkError::SendFailed(e.to_string()))?;
        self.send(Message::Text(text)).await
    }

    /// Send a close frame and flush; the peer may already be gone
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(None)).await {
            tracing::debug!("Close frame not sent: {}", e);
        }
        let _ = sink.close().await;
    }

    pub fn into_inner(self) -> S {
        self.sink.into_inner()
    }
}

/// What one connection delivered before it ended
#[derive(Debug, Default)]
pub struct ConnectionSummary {
    pub segments: u64,
    pub bytes: u64,
    /// Messages skipped for exceeding the size limit
    pub oversized: u64,
    /// Why the connection ended, `None` for a clean close
    pub error: Option<NetworkError>,
}

/// Serve one upgraded connection until it closes or fails
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, peer: String) {
    let (sink, stream) = socket.split();
    let writer = SocketWriter::new(sink);

    tracing::info!("Client {} connected", peer);

    if let Err(e) = writer.send_json(&ServerMessage::from(&*state.format)).await {
        tracing::warn!("Client {}: {}", peer, e);
        return;
    }

    let summary = receive_segments(stream, &state).await;
    match &summary.error {
        None => tracing::info!(
            "Client {} disconnected after {} segments ({} bytes)",
            peer,
            summary.segments,
            summary.bytes
        ),
        Some(e) => tracing::warn!(
            "Client {} dropped after {} segments ({} bytes): {}",
            peer,
            summary.segments,
            summary.bytes,
            e
        ),
    }

    writer.close().await;
}

/// Read messages and hand each payload to the dispatch queue.
///
/// Stops on close, on the first read error, or when the queue refuses a
/// segment. Nothing is retried. Empty and oversized messages are skipped.
pub async fn receive_segments<St>(mut stream: St, state: &AppState) -> ConnectionSummary
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut summary = ConnectionSummary::default();

    while let Some(message) = stream.next().await {
        let payload = match message {
            Ok(Message::Binary(data)) => Bytes::from(data),
            Ok(Message::Text(text)) => Bytes::from(text),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                summary.error = Some(NetworkError::ReceiveFailed(e.to_string()));
                break;
            }
        };

        if payload.is_empty() {
            tracing::trace!("Skipping empty message");
            continue;
        }
        if payload.len() > state.max_message_bytes {
            tracing::warn!(
                "Skipping {}-byte message, limit is {} bytes",
                payload.len(),
                state.max_message_bytes
            );
            summary.oversized += 1;
            continue;
        }

        let len = payload.len() as u64;
        let segment = SegmentStreamer::new(state.format.clone(), payload);
        let result = match state.enqueue_timeout {
            Some(timeout) => state.queue.enqueue_timeout(segment, timeout).await,
            None => state.queue.enqueue(segment).await,
        };

        if let Err(e) = result {
            summary.error = Some(e);
            break;
        }

        summary.segments += 1;
        summary.bytes += len;
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::{dispatch_queue, QueueReceiver};
    use crate::audio::streamer::StreamSeeker;
    use crate::config::AppConfig;
    use futures_util::stream;
    use std::time::Duration;

    fn state(capacity: usize, timeout: Option<Duration>) -> (AppState, QueueReceiver) {
        state_with_config(capacity, timeout, AppConfig::default())
    }

    fn state_with_config(
        capacity: usize,
        timeout: Option<Duration>,
        mut config: AppConfig,
    ) -> (AppState, QueueReceiver) {
        config.queue.enqueue_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        let (tx, rx) = dispatch_queue(capacity);
        let state = AppState::new(&config, config.audio.format().unwrap(), tx);
        (state, rx)
    }

    fn ok(message: Message) -> Result<Message, axum::Error> {
        Ok(message)
    }

    #[tokio::test]
    async fn test_each_message_becomes_a_segment() {
        let (state, mut rx) = state(8, None);
        let messages = stream::iter(vec![
            ok(Message::Binary(vec![1; 10])),
            ok(Message::Ping(vec![])),
            ok(Message::Binary(vec![])),
            ok(Message::Text("abc".to_string())),
            ok(Message::Binary(vec![2; 4])),
            ok(Message::Close(None)),
            ok(Message::Binary(vec![3; 7])),
        ]);

        let summary = receive_segments(messages, &state).await;
        assert_eq!(summary.segments, 3);
        assert_eq!(summary.bytes, 17);
        assert!(summary.error.is_none());

        assert_eq!(rx.dequeue().await.unwrap().len(), 10);
        assert_eq!(rx.dequeue().await.unwrap().len(), 3);
        let last = rx.dequeue().await.unwrap();
        assert_eq!(last.len(), 4);
        assert_eq!(last.position(), 0);
        assert_eq!(rx.stats().pending(), 0);
    }

    #[tokio::test]
    async fn test_oversized_message_skipped() {
        let mut config = AppConfig::default();
        config.server.max_message_bytes = 8;
        let (state, mut rx) = state_with_config(8, None, config);
        let messages = stream::iter(vec![
            ok(Message::Binary(vec![1; 8])),
            ok(Message::Binary(vec![2; 9])),
            ok(Message::Text("x".repeat(100))),
            ok(Message::Binary(vec![3; 2])),
        ]);

        let summary = receive_segments(messages, &state).await;
        assert_eq!(summary.segments, 2);
        assert_eq!(summary.bytes, 10);
        assert_eq!(summary.oversized, 2);
        assert!(summary.error.is_none());

        assert_eq!(rx.dequeue().await.unwrap().len(), 8);
        assert_eq!(rx.dequeue().await.unwrap().len(), 2);
        assert_eq!(rx.stats().pending(), 0);
    }

    #[tokio::test]
    async fn test_read_error_ends_connection() {
        let (state, mut rx) = state(8, None);
        let messages = stream::iter(vec![
            ok(Message::Binary(vec![1; 2])),
            Err(axum::Error::new(std::io::Error::other("reset"))),
            ok(Message::Binary(vec![1; 2])),
        ]);

        let summary = receive_segments(messages, &state).await;
        assert_eq!(summary.segments, 1);
        assert!(matches!(
            summary.error,
            Some(NetworkError::ReceiveFailed(_))
        ));
        assert!(rx.dequeue().await.is_some());
    }

    #[tokio::test]
    async fn test_closed_queue_ends_connection() {
        let (state, mut rx) = state(8, None);
        rx.close();

        let messages = stream::iter(vec![ok(Message::Binary(vec![1; 2]))]);
        let summary = receive_segments(messages, &state).await;
        assert_eq!(summary.segments, 0);
        assert!(matches!(summary.error, Some(NetworkError::QueueClosed)));
    }

    #[tokio::test]
    async fn test_enqueue_timeout_ends_connection() {
        let (state, _rx) = state(1, Some(Duration::from_millis(10)));
        let messages = stream::iter(vec![
            ok(Message::Binary(vec![1; 2])),
            ok(Message::Binary(vec![1; 2])),
            ok(Message::Binary(vec![1; 2])),
        ]);

        let summary = receive_segments(messages, &state).await;
        assert_eq!(summary.segments, 1);
        assert!(matches!(summary.error, Some(NetworkError::EnqueueTimeout)));
    }

    #[tokio::test]
    async fn test_writer_sends_format() {
        let writer = SocketWriter::new(Vec::<Message>::new());
        let format = AudioFormat::new(48000, 1, 1).unwrap();
        writer
            .send_json(&ServerMessage::from(&format))
            .await
            .unwrap();
        writer.close().await;

        let sent = writer.into_inner();
        assert_eq!(sent.len(), 2);
        let Message::Text(text) = &sent[0] else {
            panic!("expected text message");
        };
        let value: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "format", "sample_rate": 48000, "channels": 1, "precision": 1})
        );
        assert!(matches!(sent[1], Message::Close(None)));
    }
}
