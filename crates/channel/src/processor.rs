//! Annotation channel receive loop.
//!
//! Reads raw frames from a live channel connection, parses them into
//! typed [`ChannelMessage`]s, appends `bboxes` payloads to the
//! [`AnnotationBuffer`], and forwards session-level messages on a
//! broadcast channel. A 30-second keep-alive ping is interleaved with
//! the reads.
//!
//! Every transport failure is contained here: the loop logs, clears
//! the buffer, flips the status flag, and returns. Nothing escapes to
//! the caller.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use sightline_core::{AnnotationBuffer, VideoId};

use crate::client::{ChannelConnection, ChannelStatus};
use crate::messages::{parse_message, ChannelMessage};

/// Interval between keep-alive pings.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Session-level notifications surfaced by the processor.
///
/// Annotation payloads never appear here — they go straight into the
/// buffer. These carry everything the owning session may care about.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The connection is live and processing messages.
    Connected { video_id: VideoId },
    /// Initial stream metadata pushed by the backend.
    StreamInfo(serde_json::Value),
    /// The producer reported an error on its side.
    ProducerError(String),
    /// The connection dropped; the annotation buffer has been cleared.
    Disconnected {
        video_id: VideoId,
        reason: Option<String>,
    },
}

/// Process messages from a channel connection until it drops or the
/// token is cancelled.
///
/// On exit the annotation buffer is cleared and `status` reads
/// disconnected — the reconnect path never observes batches from a
/// previous connection.
pub async fn process_messages(
    conn: ChannelConnection,
    buffer: &AnnotationBuffer,
    status: &ChannelStatus,
    event_tx: &broadcast::Sender<ChannelEvent>,
    cancel: &CancellationToken,
) {
    let video_id = conn.video_id;
    let mut ws_stream = conn.ws_stream;

    status.set_connected();
    let _ = event_tx.send(ChannelEvent::Connected { video_id });

    let mut ping = tokio::time::interval(PING_INTERVAL);
    // The first tick fires immediately; skip it so pings start after
    // one full interval.
    ping.tick().await;

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(video_id, "Channel processor cancelled");
                break None;
            }
            _ = ping.tick() => {
                if let Err(e) = ws_stream.send(Message::Text(r#"{"type":"ping"}"#.into())).await {
                    tracing::warn!(video_id, error = %e, "Keep-alive ping failed");
                    break Some(format!("ping failed: {e}"));
                }
            }
            msg = ws_stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_text_message(&text, video_id, buffer, event_tx);
                }
                Some(Ok(Message::Binary(_))) => {
                    // The channel is JSON-only; tolerate and ignore.
                    tracing::trace!(video_id, "Ignoring binary channel frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Handled automatically by tungstenite.
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(video_id, ?frame, "Annotation channel closed");
                    break frame.map(|f| f.reason.to_string());
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    tracing::error!(video_id, error = %e, "Channel receive error");
                    break Some(e.to_string());
                }
                None => {
                    tracing::info!(video_id, "Annotation channel stream ended");
                    break None;
                }
            }
        }
    };

    // Transport taxonomy: disconnects reset the buffer and flip the
    // flag; the owning session decides whether to reconnect.
    buffer.clear();
    status.set_disconnected(reason.clone());
    let _ = event_tx.send(ChannelEvent::Disconnected { video_id, reason });
}

/// Dispatch a single parsed text frame.
fn handle_text_message(
    text: &str,
    video_id: VideoId,
    buffer: &AnnotationBuffer,
    event_tx: &broadcast::Sender<ChannelEvent>,
) {
    match parse_message(text) {
        Ok(ChannelMessage::Bboxes(data)) => {
            if data.video_id != video_id {
                tracing::warn!(
                    video_id,
                    got = data.video_id,
                    "Dropping batch for a different stream",
                );
                return;
            }
            tracing::trace!(video_id, pts = data.pts, boxes = data.bboxes.len(), "Batch received");
            buffer.push(data.into_batch());
        }
        Ok(ChannelMessage::StreamInfo(info)) => {
            tracing::debug!(video_id, "Stream info received");
            let _ = event_tx.send(ChannelEvent::StreamInfo(info));
        }
        Ok(ChannelMessage::Pong) => {
            tracing::trace!(video_id, "Pong");
        }
        Ok(ChannelMessage::Error(data)) => {
            tracing::warn!(video_id, message = %data.message, "Producer reported an error");
            let _ = event_tx.send(ChannelEvent::ProducerError(data.message));
        }
        Ok(ChannelMessage::Unknown) => {
            tracing::debug!(video_id, "Ignoring unknown channel message type");
        }
        Err(e) => {
            // Malformed payloads are dropped and logged, never fatal.
            tracing::warn!(video_id, error = %e, raw_message = %text, "Malformed channel message");
        }
    }
}
