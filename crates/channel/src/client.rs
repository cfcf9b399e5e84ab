//! WebSocket client for the annotation push channel.
//!
//! [`ChannelClient`] holds the connection configuration for one stream.
//! Call [`ChannelClient::connect`] to establish a live
//! [`ChannelConnection`], and share a [`ChannelStatus`] with readers
//! that need the connected flag without touching the socket.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use tokio_tungstenite::{connect_async, MaybeTlsStream};

use sightline_core::VideoId;

/// Configuration handle for one annotation channel.
///
/// There is a single logical connection per selected stream id; the
/// owning session decides when to reconnect.
pub struct ChannelClient {
    video_id: VideoId,
    ws_url: String,
}

/// A live WebSocket connection to the annotation channel.
pub struct ChannelConnection {
    /// Stream this connection carries annotations for.
    pub video_id: VideoId,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl ChannelClient {
    /// Create a client for `video_id` against a WebSocket base URL,
    /// e.g. `ws://host:8702`.
    pub fn new(video_id: VideoId, ws_url: impl Into<String>) -> Self {
        Self {
            video_id,
            ws_url: ws_url.into(),
        }
    }

    /// Stream id this client is bound to.
    pub fn video_id(&self) -> VideoId {
        self.video_id
    }

    /// Full endpoint URL, `{base}/ws/{video_id}`.
    pub fn endpoint(&self) -> String {
        format!("{}/ws/{}", self.ws_url.trim_end_matches('/'), self.video_id)
    }

    /// Connect to the channel endpoint for this stream.
    pub async fn connect(&self) -> Result<ChannelConnection, ChannelError> {
        let url = self.endpoint();
        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ChannelError::Connection(format!("Failed to connect to annotation channel at {url}: {e}"))
        })?;

        tracing::info!(video_id = self.video_id, url = %url, "Annotation channel connected");

        Ok(ChannelConnection {
            video_id: self.video_id,
            ws_stream,
        })
    }
}

/// Shared connected/last-error flags for one channel.
///
/// The processor is the only writer; the owning session and any UI
/// read it. Transport failures land here instead of crossing component
/// boundaries as errors.
#[derive(Default)]
pub struct ChannelStatus {
    connected: AtomicBool,
    last_error: Mutex<Option<String>>,
    reconnect_attempts: AtomicU32,
}

impl ChannelStatus {
    /// Whether the channel currently has a live connection.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// The most recent transport error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("status poisoned").clone()
    }

    /// Failed connection attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Acquire)
    }

    /// Record one failed connection attempt.
    pub fn record_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::AcqRel);
    }

    /// Mark the channel connected, clearing any stale error and the
    /// attempt counter.
    pub fn set_connected(&self) {
        self.connected.store(true, Ordering::Release);
        self.reconnect_attempts.store(0, Ordering::Release);
        *self.last_error.lock().expect("status poisoned") = None;
    }

    /// Mark the channel disconnected, recording the reason if one is
    /// known.
    pub fn set_disconnected(&self, reason: Option<String>) {
        self.connected.store(false, Ordering::Release);
        if let Some(reason) = reason {
            *self.last_error.lock().expect("status poisoned") = Some(reason);
        }
    }
}

/// Errors that can occur on the annotation channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
