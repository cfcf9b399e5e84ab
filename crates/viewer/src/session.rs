//! Viewer session orchestration.
//!
//! [`ViewerSession`] wires the pieces together for one selected stream:
//! the annotation channel task (connect -> process -> reconnect), the
//! capture pipeline with its cadence ticker, and the synchronizer the
//! host's render tick queries. Teardown is atomic from the caller's
//! view: `stop()` cancels the master token, joins every task with a
//! bounded timeout, and drops the buffers.

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use sightline_capture::{CapturePipeline, CaptureSnapshot, FfmpegEncoder, PipelineHandle};
use sightline_channel::{
    process_messages, Backoff, ChannelClient, ChannelEvent, ChannelStatus, ReconnectConfig,
};
use sightline_core::{
    active_boxes, AnnotationBuffer, BoundingBox, FrameSource, PlaybackClock, SyncParams,
    VideoGeometry,
};
use sightline_export::{assemble_clip, ExportedClip};
use sightline_overlay::{OverlayRenderer, OverlayStyle};

use crate::compositor::CompositingFrameSource;
use crate::config::SessionConfig;

/// Broadcast channel capacity for session events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long `stop()` waits for the channel task.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Pipeline(#[from] sightline_capture::PipelineError),

    #[error(transparent)]
    Export(#[from] sightline_export::ExportError),
}

/// One running viewer session for one stream.
pub struct ViewerSession {
    config: SessionConfig,
    clock: Arc<dyn PlaybackClock>,
    geometry: Arc<dyn VideoGeometry>,
    buffer: Arc<AnnotationBuffer>,
    status: Arc<ChannelStatus>,
    renderer: Arc<OverlayRenderer>,
    sync_params: SyncParams,
    event_tx: broadcast::Sender<ChannelEvent>,
    cancel: CancellationToken,
    channel_task: tokio::task::JoinHandle<()>,
    pipeline: PipelineHandle,
}

impl ViewerSession {
    /// Start the channel task and the capture pipeline.
    ///
    /// `clock`, `geometry`, and `frame_source` are the host's
    /// collaborators (see [`crate::surface`] for headless
    /// implementations). The pipeline captures through a
    /// [`CompositingFrameSource`] so recorded frames carry the same
    /// overlay the operator sees. Returns immediately; connection
    /// establishment and retries happen in the background.
    pub fn start(
        config: SessionConfig,
        clock: Arc<dyn PlaybackClock>,
        geometry: Arc<dyn VideoGeometry>,
        frame_source: Arc<dyn FrameSource>,
    ) -> Self {
        let buffer = Arc::new(AnnotationBuffer::new(config.annotation_capacity));
        let status = Arc::new(ChannelStatus::default());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let client = ChannelClient::new(config.video_id, config.backend_ws_url.clone());
        let channel_cancel = cancel.child_token();
        let channel_buffer = Arc::clone(&buffer);
        let channel_status = Arc::clone(&status);
        let channel_event_tx = event_tx.clone();
        let channel_task = tokio::spawn(async move {
            run_channel_loop(
                client,
                &channel_buffer,
                &channel_status,
                &channel_event_tx,
                &channel_cancel,
            )
            .await;
            tracing::info!("Channel task exited");
        });

        let renderer = Arc::new(OverlayRenderer::new(OverlayStyle {
            min_confidence: config.min_confidence,
            ..OverlayStyle::default()
        }));
        let sync_params = config.sync_params();

        let capture_source = Arc::new(CompositingFrameSource::new(
            frame_source,
            Arc::clone(&clock),
            Arc::clone(&buffer),
            Arc::clone(&renderer),
            sync_params,
        ));
        let pipeline = CapturePipeline::spawn(
            Box::new(FfmpegEncoder::new()),
            capture_source,
            config.capture_config(),
            cancel.child_token(),
        );

        tracing::info!(
            video_id = config.video_id,
            backend = %config.backend_ws_url,
            "Viewer session started",
        );

        Self {
            config,
            clock,
            geometry,
            buffer,
            status,
            renderer,
            sync_params,
            event_tx,
            cancel,
            channel_task,
            pipeline,
        }
    }

    /// Subscribe to session-level channel events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.event_tx.subscribe()
    }

    /// Connection status of the annotation channel.
    pub fn channel_status(&self) -> &ChannelStatus {
        &self.status
    }

    /// Number of batches currently buffered.
    pub fn buffered_batches(&self) -> usize {
        self.buffer.len()
    }

    /// The active bounding-box set for the current playback position.
    ///
    /// Pure read for the host's render tick; empty before the first
    /// presented frame.
    pub fn active_boxes(&self) -> Vec<BoundingBox> {
        let Some(current_pts) = self.clock.current_pts() else {
            return Vec::new();
        };
        active_boxes(&self.buffer.snapshot(), current_pts, &self.sync_params)
    }

    /// Render the current active set onto a transparent raster of the
    /// displayed dimensions, ready for the host to blend over the
    /// video. Box coordinates are mapped from the original raster to
    /// the displayed one through the host's geometry; `None` until the
    /// geometry knows both.
    pub fn render_overlay(&self) -> Option<RgbaImage> {
        let original = self.geometry.original_dimensions()?;
        let displayed = self.geometry.displayed_dimensions()?;
        Some(self.renderer.render(&self.active_boxes(), original, displayed))
    }

    /// Export the trailing replay window as a playable clip.
    ///
    /// Flushes the pipeline (best-effort), snapshots the retained
    /// chunks, and assembles the clip. The live ring buffer is never
    /// mutated; encoding continues while the clip is built.
    pub async fn export_clip(&self) -> Result<ExportedClip, SessionError> {
        let snapshot: CaptureSnapshot = self.pipeline.prepare_export().await?;
        Ok(assemble_clip(&snapshot, self.config.video_id)?)
    }

    /// Stop every task and drop the buffers.
    pub async fn stop(self) {
        self.cancel.cancel();
        if tokio::time::timeout(STOP_TIMEOUT, self.channel_task)
            .await
            .is_err()
        {
            tracing::warn!("Channel task did not stop in time");
        }
        self.pipeline.shutdown().await;
        self.buffer.clear();
        tracing::info!(video_id = self.config.video_id, "Viewer session stopped");
    }
}

/// Core channel loop: connect -> process messages -> back off -> retry.
///
/// Runs until the cancellation token is triggered. A connection that
/// survives resets the backoff ladder; failed attempts are counted on
/// the shared status so the host can display retry progress.
async fn run_channel_loop(
    client: ChannelClient,
    buffer: &AnnotationBuffer,
    status: &ChannelStatus,
    event_tx: &broadcast::Sender<ChannelEvent>,
    cancel: &CancellationToken,
) {
    let mut backoff = Backoff::new(ReconnectConfig::default());

    loop {
        if cancel.is_cancelled() {
            return;
        }

        match client.connect().await {
            Ok(conn) => {
                backoff.reset();
                // Processes until the connection drops; clears the
                // buffer and flips the status flag on the way out.
                process_messages(conn, buffer, status, event_tx, cancel).await;
            }
            Err(e) => {
                status.record_attempt();
                status.set_disconnected(Some(e.to_string()));
                tracing::warn!(
                    video_id = client.video_id(),
                    attempt = backoff.attempt() + 1,
                    error = %e,
                    "Connection failed",
                );
                if !backoff.wait(cancel).await {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use futures::{SinkExt, StreamExt};
    use sightline_core::RasterFrame;
    use sightline_export::ExportError;
    use tokio_tungstenite::tungstenite::Message;

    use crate::surface::{SharedClock, SharedSurface};

    fn test_config(ws_url: String) -> SessionConfig {
        SessionConfig {
            backend_ws_url: ws_url,
            video_id: 1,
            ..SessionConfig::default()
        }
    }

    fn start_session(config: SessionConfig, clock: Arc<SharedClock>) -> ViewerSession {
        let surface = SharedSurface::new();
        ViewerSession::start(config, clock, surface.clone(), surface)
    }

    #[tokio::test]
    async fn export_without_any_captured_frame_reports_no_keyframe() {
        // Nothing listens on this port; capture never sees a frame.
        let config = test_config("ws://127.0.0.1:9".into());
        let session = start_session(config, SharedClock::new());

        let result = session.export_clip().await;
        assert_matches!(result, Err(SessionError::Export(ExportError::NoKeyframe)));
        session.stop().await;
    }

    #[tokio::test]
    async fn active_boxes_is_empty_before_the_first_presented_frame() {
        let config = test_config("ws://127.0.0.1:9".into());
        let session = start_session(config, SharedClock::new());

        assert!(session.active_boxes().is_empty());
        session.stop().await;
    }

    #[tokio::test]
    async fn overlay_is_unavailable_until_geometry_is_known() {
        let config = test_config("ws://127.0.0.1:9".into());
        let surface = SharedSurface::new();
        let session = ViewerSession::start(
            config,
            SharedClock::new(),
            surface.clone(),
            surface.clone(),
        );

        assert!(session.render_overlay().is_none());

        surface.present(RasterFrame::black(64, 48));
        let overlay = session.render_overlay().expect("geometry known");
        assert_eq!((overlay.width(), overlay.height()), (64, 48));

        session.stop().await;
    }

    #[tokio::test]
    async fn batches_from_the_channel_become_active_boxes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let batch = serde_json::json!({
                "type": "bboxes",
                "video_id": 1,
                "pts": 90_000,
                "bboxes": [{
                    "pts": 90_000,
                    "top_left_corner": 10 * 640 + 20,
                    "bottom_right_corner": 50 * 640 + 120,
                    "class_name": "person",
                    "confidence": 0.9,
                }],
                "stream_start_time_ms": 0,
                "timestamp": 0,
            });
            ws.send(Message::Text(batch.to_string().into()))
                .await
                .unwrap();
            // Keep the connection open until the client goes away.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let clock = SharedClock::new();
        let session = start_session(test_config(format!("ws://{addr}")), clock.clone());
        clock.set_pts(90_000);

        let mut events = session.subscribe();
        loop {
            match tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("no channel event")
                .expect("event channel closed")
            {
                ChannelEvent::Connected { .. } => break,
                _ => continue,
            }
        }

        // Delivery is asynchronous; poll briefly.
        let mut boxes = Vec::new();
        for _ in 0..100 {
            boxes = session.active_boxes();
            if !boxes.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].class_label, "person");

        session.stop().await;
        server.abort();
    }

    #[tokio::test]
    async fn failed_connects_are_counted_on_the_status() {
        // Nothing listens on this port; every attempt fails fast.
        let config = test_config("ws://127.0.0.1:9".into());
        let session = start_session(config, SharedClock::new());

        let mut attempts = 0;
        for _ in 0..100 {
            attempts = session.channel_status().reconnect_attempts();
            if attempts > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(attempts > 0);
        assert!(session.channel_status().last_error().is_some());

        session.stop().await;
    }

    #[tokio::test]
    async fn stop_clears_the_annotation_buffer() {
        let config = test_config("ws://127.0.0.1:9".into());
        let session = start_session(config, SharedClock::new());
        let buffer = Arc::clone(&session.buffer);
        session.stop().await;
        assert!(buffer.is_empty());
    }
}
