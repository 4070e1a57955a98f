//! Web server: one fallback route that either upgrades to a WebSocket or serves
//! the landing document

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Request, State},
    response::{IntoResponse, Response},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::audio::format::AudioFormat;
use crate::audio::queue::QueueSender;
use crate::config::{AppConfig, ServerConfig};
use crate::error::{NetworkError, Result};
use crate::ui::websocket::handle_socket;

/// State shared by every request
pub struct AppState {
    /// Format every incoming payload is decoded with
    pub format: Arc<AudioFormat>,
    pub queue: QueueSender,
    pub enqueue_timeout: Option<Duration>,
    /// Messages larger than this are skipped
    pub max_message_bytes: usize,
    pub index_path: PathBuf,
}

impl AppState {
    pub fn new(config: &AppConfig, format: AudioFormat, queue: QueueSender) -> Self {
        Self {
            format: Arc::new(format),
            queue,
            enqueue_timeout: config.queue.enqueue_timeout_ms.map(Duration::from_millis),
            max_message_bytes: config.server.max_message_bytes,
            index_path: config.server.index_path.clone(),
        }
    }
}

pub struct WebServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .fallback(handle_request)
            .with_state(self.state.clone())
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.config.bind_address, self.config.http_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;

        tracing::info!("Listening on http://{}", listener.local_addr()?);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        Ok(())
    }
}

async fn handle_request(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    ws: Option<WebSocketUpgrade>,
    request: Request,
) -> Response {
    let peer = peer
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if let Some(ws) = ws {
        tracing::debug!("WebSocket upgrade from {}", peer);
        return ws.on_upgrade(move |socket| handle_socket(socket, state, peer));
    }

    match ServeFile::new(&state.index_path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::dispatch_queue;
    use axum::body::{to_bytes, Body};
    use axum::http::{self, StatusCode};

    fn server(index_path: PathBuf) -> WebServer {
        let mut config = AppConfig::default();
        config.server.index_path = index_path;
        let (tx, _rx) = dispatch_queue(4);
        let format = config.audio.format().unwrap();
        let state = AppState::new(&config, format, tx);
        WebServer::new(config.server.clone(), state)
    }

    fn temp_index(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("pcm-ws-bridge-{}-{}.html", name, std::process::id()));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_plain_request_gets_landing_page() {
        let path = temp_index("landing", "<html>hi</html>");
        let router = server(path.clone()).router();

        for uri in ["/", "/anything/else"] {
            let response = router
                .clone()
                .oneshot(http::Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let body = to_bytes(response.into_body(), 1024).await.unwrap();
            assert_eq!(&body[..], b"<html>hi</html>");
        }

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_missing_landing_page() {
        let router = server(PathBuf::from("/nonexistent/index.html")).router();
        let response = router
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_state_from_config() {
        let mut config = AppConfig::default();
        config.queue.enqueue_timeout_ms = Some(250);
        config.server.max_message_bytes = 4096;
        let (tx, _rx) = dispatch_queue(4);
        let state = AppState::new(&config, config.audio.format().unwrap(), tx);

        assert_eq!(state.enqueue_timeout, Some(Duration::from_millis(250)));
        assert_eq!(state.max_message_bytes, 4096);
        assert_eq!(state.format.width(), 1);
        assert_eq!(state.index_path, PathBuf::from("index.html"));
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = AppConfig::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.http_port = taken.local_addr().unwrap().port();
        let (tx, _rx) = dispatch_queue(4);
        let state = AppState::new(&config, config.audio.format().unwrap(), tx);

        let result = WebServer::new(config.server.clone(), state)
            .run(async {})
            .await;
        assert!(matches!(
            result,
            Err(crate::error::Error::Network(NetworkError::BindFailed(_)))
        ));
    }
}
