//! HTTP front end: landing page and WebSocket ingest

pub mod server;
pub mod websocket;

pub use server::{AppState, WebServer};
pub use websocket::{ConnectionSummary, SocketWriter};
