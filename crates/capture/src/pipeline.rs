//! Capture pipeline state machine.
//!
//! A single task owns the encoder and the chunk ring buffer and walks
//! `Idle → Configuring → Encoding → (Flushing) → Idle`. Cadence comes
//! from a dedicated interval task posting tick messages, so the encode
//! rate is decoupled from whatever drives rendering. Ticks and
//! commands share one ordered channel; the pipeline task is the sole
//! writer to the ring buffer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sightline_core::{FrameSource, RasterFrame};

use crate::chunk::{ChunkRingBuffer, CodecId, DecoderConfig};
use crate::encoder::{Encoder, EncoderError, EncoderProfile};

/// How long shutdown waits for the pipeline tasks to finish.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for one capture pipeline.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Codecs to try in order when configuring the encoder.
    pub codec_preference: Vec<CodecId>,
    /// Capture cadence in frames per second.
    pub fps: u32,
    /// Target bitrate in bits per second.
    pub bitrate_bps: u32,
    /// Trailing window retained by the ring buffer.
    pub window: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            codec_preference: vec![CodecId::Vp9, CodecId::Vp8],
            fps: 30,
            bitrate_bps: 4_000_000,
            window: Duration::from_secs(30),
        }
    }
}

/// Point-in-time copy of the ring buffer handed to the export
/// assembler. Never aliases the live buffer.
#[derive(Debug, Clone)]
pub struct CaptureSnapshot {
    /// Retained chunks, oldest first.
    pub chunks: Vec<crate::chunk::EncodedChunk>,
    /// Decoder config for the chunks, when one was ever produced.
    pub decoder_config: Option<DecoderConfig>,
    /// Cadence the chunks were captured at.
    pub fps: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The pipeline task has stopped (cancelled or panicked).
    #[error("Capture pipeline is not running")]
    Stopped,
}

enum PipelineMsg {
    Tick,
    PrepareExport(oneshot::Sender<CaptureSnapshot>),
}

enum PipelineState {
    /// Waiting for the first frame with valid dimensions.
    Idle,
    Encoding {
        profile: EncoderProfile,
        decoder_config: DecoderConfig,
        ring: ChunkRingBuffer,
        /// Frames submitted since (re)configuration; drives keyframe
        /// cadence and pipeline-local timestamps.
        sample_index: u64,
    },
    /// Both profiles failed. Capture is dead for this session; playback
    /// and annotation sync are unaffected.
    Failed,
}

/// Handle to a running capture pipeline.
pub struct PipelineHandle {
    msg_tx: mpsc::UnboundedSender<PipelineMsg>,
    cancel: CancellationToken,
    pipeline_task: JoinHandle<()>,
    ticker_task: JoinHandle<()>,
}

impl PipelineHandle {
    /// Flush the encoder (best-effort) and copy out the retained
    /// chunks. An idle or failed pipeline yields an empty snapshot.
    pub async fn prepare_export(&self) -> Result<CaptureSnapshot, PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.msg_tx
            .send(PipelineMsg::PrepareExport(reply_tx))
            .map_err(|_| PipelineError::Stopped)?;
        reply_rx.await.map_err(|_| PipelineError::Stopped)
    }

    /// Stop the ticker and the pipeline task, closing the encoder.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let join = async {
            let _ = self.ticker_task.await;
            let _ = self.pipeline_task.await;
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, join).await.is_err() {
            tracing::warn!("Capture pipeline did not stop in time");
        }
    }
}

/// Spawns the pipeline task and its cadence ticker.
pub struct CapturePipeline;

impl CapturePipeline {
    pub fn spawn(
        encoder: Box<dyn Encoder>,
        frame_source: Arc<dyn FrameSource>,
        config: CaptureConfig,
        cancel: CancellationToken,
    ) -> PipelineHandle {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();

        let interval = Duration::from_micros(1_000_000 / config.fps.max(1) as u64);
        let ticker_cancel = cancel.clone();
        let tick_tx = msg_tx.clone();
        let ticker_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if tick_tx.send(PipelineMsg::Tick).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let pipeline_cancel = cancel.clone();
        let pipeline_task = tokio::spawn(async move {
            run_pipeline(encoder, frame_source, config, msg_rx, pipeline_cancel).await;
        });

        PipelineHandle {
            msg_tx,
            cancel,
            pipeline_task,
            ticker_task,
        }
    }
}

async fn run_pipeline(
    mut encoder: Box<dyn Encoder>,
    frame_source: Arc<dyn FrameSource>,
    config: CaptureConfig,
    mut msg_rx: mpsc::UnboundedReceiver<PipelineMsg>,
    cancel: CancellationToken,
) {
    let mut state = PipelineState::Idle;

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = msg_rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        match msg {
            PipelineMsg::Tick => {
                handle_tick(&mut state, encoder.as_mut(), frame_source.as_ref(), &config).await;
            }
            PipelineMsg::PrepareExport(reply) => {
                let snapshot = prepare_snapshot(&mut state, encoder.as_mut(), &config).await;
                // The caller may have given up waiting.
                let _ = reply.send(snapshot);
            }
        }
    }

    encoder.close().await;
    tracing::debug!("Capture pipeline stopped");
}

async fn handle_tick(
    state: &mut PipelineState,
    encoder: &mut dyn Encoder,
    frame_source: &dyn FrameSource,
    config: &CaptureConfig,
) {
    if matches!(state, PipelineState::Failed) {
        return;
    }
    let Some(frame) = frame_source.capture() else {
        return;
    };
    if frame.width == 0 || frame.height == 0 {
        return;
    }

    // A dimension change invalidates the configured codec and every
    // retained chunk; tear down and reconfigure for the new raster.
    if let PipelineState::Encoding { profile, .. } = state {
        if (frame.width, frame.height) != (profile.width, profile.height) {
            tracing::info!(
                from_w = profile.width,
                from_h = profile.height,
                to_w = frame.width,
                to_h = frame.height,
                "Raster dimensions changed, reconfiguring capture",
            );
            *state = PipelineState::Idle;
        }
    }

    if matches!(state, PipelineState::Idle) {
        match configure_with_fallback(encoder, config, frame.width, frame.height).await {
            Some((profile, decoder_config)) => {
                *state = PipelineState::Encoding {
                    profile,
                    decoder_config,
                    ring: ChunkRingBuffer::new(config.window),
                    sample_index: 0,
                };
            }
            None => {
                tracing::error!("All encoder profiles failed, capture disabled");
                *state = PipelineState::Failed;
                return;
            }
        }
    }

    let submitted = match state {
        PipelineState::Encoding {
            profile,
            ring,
            sample_index,
            ..
        } => submit_frame(encoder, &frame, profile, ring, sample_index).await,
        _ => return,
    };

    // A failed submit leaves the raw byte stream mid-frame; nothing
    // encoded after it would decode. Drop back to Idle so the next
    // tick configures a fresh encoder and ring.
    if !submitted {
        tracing::warn!("Restarting capture after failed submit");
        *state = PipelineState::Idle;
    }
}

/// Try the codec preference list in order; at most one fallback.
async fn configure_with_fallback(
    encoder: &mut dyn Encoder,
    config: &CaptureConfig,
    width: u32,
    height: u32,
) -> Option<(EncoderProfile, DecoderConfig)> {
    for codec in &config.codec_preference {
        let profile = EncoderProfile {
            codec: *codec,
            width,
            height,
            fps: config.fps,
            bitrate_bps: config.bitrate_bps,
        };
        match encoder.configure(&profile).await {
            Ok(decoder_config) => return Some((profile, decoder_config)),
            Err(EncoderError::Unsupported(reason)) => {
                tracing::warn!(codec = ?codec, reason = %reason, "Encoder profile unsupported");
            }
            Err(e) => {
                tracing::warn!(codec = ?codec, error = %e, "Encoder configuration failed");
            }
        }
    }
    None
}

/// Returns `false` when the submit failed and the encoder can no
/// longer be trusted.
async fn submit_frame(
    encoder: &mut dyn Encoder,
    frame: &RasterFrame,
    profile: &EncoderProfile,
    ring: &mut ChunkRingBuffer,
    sample_index: &mut u64,
) -> bool {
    let force_keyframe = *sample_index % profile.keyframe_interval() == 0;
    let timestamp_us = *sample_index as i64 * profile.frame_interval_us();
    match encoder.submit(frame, force_keyframe, timestamp_us).await {
        Ok(chunks) => {
            for chunk in chunks {
                ring.push(chunk);
            }
            *sample_index += 1;
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Frame submit failed");
            false
        }
    }
}

async fn prepare_snapshot(
    state: &mut PipelineState,
    encoder: &mut dyn Encoder,
    config: &CaptureConfig,
) -> CaptureSnapshot {
    match state {
        PipelineState::Encoding {
            profile,
            decoder_config,
            ring,
            ..
        } => {
            // Flushing state: failure is logged, the export proceeds
            // with whatever is already retained.
            match encoder.flush().await {
                Ok(chunks) => {
                    for chunk in chunks {
                        ring.push(chunk);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Encoder flush failed before export");
                }
            }
            CaptureSnapshot {
                chunks: ring.snapshot(),
                decoder_config: ring
                    .cached_config()
                    .cloned()
                    .or_else(|| Some(decoder_config.clone())),
                fps: profile.fps,
            }
        }
        _ => CaptureSnapshot {
            chunks: Vec::new(),
            decoder_config: None,
            fps: config.fps,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::EncodedChunk;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Encoder double: one chunk per submit, honest timestamps and
    /// keyframe flags, optionally rejecting codecs as unsupported.
    struct MockEncoder {
        reject: Vec<CodecId>,
        configured: Arc<Mutex<Vec<CodecId>>>,
        closed: Arc<AtomicBool>,
        fail_submits: Arc<AtomicBool>,
    }

    impl MockEncoder {
        fn new(reject: Vec<CodecId>) -> Self {
            Self {
                reject,
                configured: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
                fail_submits: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl Encoder for MockEncoder {
        async fn configure(
            &mut self,
            profile: &EncoderProfile,
        ) -> Result<DecoderConfig, EncoderError> {
            self.configured.lock().unwrap().push(profile.codec);
            if self.reject.contains(&profile.codec) {
                return Err(EncoderError::Unsupported("mock rejection".into()));
            }
            Ok(DecoderConfig {
                codec: profile.codec,
                width: profile.width,
                height: profile.height,
            })
        }

        async fn submit(
            &mut self,
            _frame: &RasterFrame,
            force_keyframe: bool,
            timestamp_us: i64,
        ) -> Result<Vec<EncodedChunk>, EncoderError> {
            if self.fail_submits.load(Ordering::SeqCst) {
                return Err(EncoderError::Closed);
            }
            Ok(vec![EncodedChunk {
                timestamp_us,
                duration_us: None,
                is_keyframe: force_keyframe,
                payload: Bytes::from_static(b"chunk"),
                decoder_config: None,
            }])
        }

        async fn flush(&mut self) -> Result<Vec<EncodedChunk>, EncoderError> {
            Ok(Vec::new())
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Frame source double with switchable dimensions.
    struct MockFrameSource {
        dims: Mutex<Option<(u32, u32)>>,
    }

    impl MockFrameSource {
        fn new(width: u32, height: u32) -> Self {
            Self {
                dims: Mutex::new(Some((width, height))),
            }
        }

        fn set_dims(&self, dims: Option<(u32, u32)>) {
            *self.dims.lock().unwrap() = dims;
        }
    }

    impl FrameSource for MockFrameSource {
        fn capture(&self) -> Option<RasterFrame> {
            let (w, h) = (*self.dims.lock().unwrap())?;
            Some(RasterFrame::black(w, h))
        }
    }

    fn test_config() -> CaptureConfig {
        CaptureConfig {
            codec_preference: vec![CodecId::Vp9, CodecId::Vp8],
            fps: 2,
            bitrate_bps: 1_000_000,
            window: Duration::from_secs(30),
        }
    }

    /// Drive `run_pipeline` directly with hand-fed ticks so tests do
    /// not depend on wall-clock cadence.
    struct Harness {
        msg_tx: mpsc::UnboundedSender<PipelineMsg>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn spawn(encoder: MockEncoder, source: Arc<MockFrameSource>, config: CaptureConfig) -> Self {
            let (msg_tx, msg_rx) = mpsc::unbounded_channel();
            let cancel = CancellationToken::new();
            let task_cancel = cancel.clone();
            let task = tokio::spawn(async move {
                run_pipeline(Box::new(encoder), source, config, msg_rx, task_cancel).await;
            });
            Self {
                msg_tx,
                cancel,
                task,
            }
        }

        fn tick(&self, n: usize) {
            for _ in 0..n {
                self.msg_tx.send(PipelineMsg::Tick).unwrap();
            }
        }

        async fn snapshot(&self) -> CaptureSnapshot {
            let (tx, rx) = oneshot::channel();
            self.msg_tx.send(PipelineMsg::PrepareExport(tx)).unwrap();
            rx.await.unwrap()
        }

        async fn stop(self) {
            self.cancel.cancel();
            self.task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn configures_on_first_frame_and_encodes() {
        let encoder = MockEncoder::new(vec![]);
        let harness = Harness::spawn(
            encoder,
            Arc::new(MockFrameSource::new(640, 480)),
            test_config(),
        );
        harness.tick(3);

        let snap = harness.snapshot().await;
        assert_eq!(snap.chunks.len(), 3);
        assert!(snap.chunks[0].is_keyframe);
        assert_eq!(snap.chunks[0].timestamp_us, 0);
        assert_eq!(snap.chunks[1].timestamp_us, 500_000);
        let config = snap.decoder_config.unwrap();
        assert_eq!(config.codec, CodecId::Vp9);
        assert_eq!((config.width, config.height), (640, 480));
        harness.stop().await;
    }

    #[tokio::test]
    async fn falls_back_once_when_primary_is_unsupported() {
        let encoder = MockEncoder::new(vec![CodecId::Vp9]);
        let configured = encoder.configured.clone();
        let harness = Harness::spawn(
            encoder,
            Arc::new(MockFrameSource::new(640, 480)),
            test_config(),
        );
        harness.tick(1);

        let snap = harness.snapshot().await;
        assert_eq!(snap.decoder_config.unwrap().codec, CodecId::Vp8);
        assert_eq!(
            *configured.lock().unwrap(),
            vec![CodecId::Vp9, CodecId::Vp8]
        );
        harness.stop().await;
    }

    #[tokio::test]
    async fn both_profiles_failing_disables_capture() {
        let encoder = MockEncoder::new(vec![CodecId::Vp9, CodecId::Vp8]);
        let configured = encoder.configured.clone();
        let harness = Harness::spawn(
            encoder,
            Arc::new(MockFrameSource::new(640, 480)),
            test_config(),
        );
        harness.tick(5);

        let snap = harness.snapshot().await;
        assert!(snap.chunks.is_empty());
        assert!(snap.decoder_config.is_none());
        // Failed is terminal: later ticks never retry configuration.
        assert_eq!(configured.lock().unwrap().len(), 2);
        harness.stop().await;
    }

    #[tokio::test]
    async fn dimension_change_restarts_the_ring() {
        let encoder = MockEncoder::new(vec![]);
        let source = Arc::new(MockFrameSource::new(640, 480));
        let harness = Harness::spawn(encoder, source.clone(), test_config());
        harness.tick(4);
        // Barrier so the resize cannot race the earlier ticks.
        let _ = harness.snapshot().await;

        source.set_dims(Some((1280, 720)));
        harness.tick(2);

        let snap = harness.snapshot().await;
        assert_eq!(snap.chunks.len(), 2);
        // Timestamps are re-based at reconfiguration.
        assert_eq!(snap.chunks[0].timestamp_us, 0);
        assert!(snap.chunks[0].is_keyframe);
        let config = snap.decoder_config.unwrap();
        assert_eq!((config.width, config.height), (1280, 720));
        harness.stop().await;
    }

    #[tokio::test]
    async fn keyframes_follow_the_two_second_cadence() {
        // fps=2 -> keyframe_interval=4 samples.
        let encoder = MockEncoder::new(vec![]);
        let harness = Harness::spawn(
            encoder,
            Arc::new(MockFrameSource::new(320, 240)),
            test_config(),
        );
        harness.tick(9);

        let snap = harness.snapshot().await;
        let keyframes: Vec<bool> = snap.chunks.iter().map(|c| c.is_keyframe).collect();
        assert_eq!(
            keyframes,
            vec![true, false, false, false, true, false, false, false, true]
        );
        harness.stop().await;
    }

    #[tokio::test]
    async fn missing_frames_are_skipped_without_state_change() {
        let encoder = MockEncoder::new(vec![]);
        let source = Arc::new(MockFrameSource::new(640, 480));
        let harness = Harness::spawn(encoder, source.clone(), test_config());
        harness.tick(2);
        let _ = harness.snapshot().await;

        source.set_dims(None);
        harness.tick(3);
        // Barrier so the dims restore cannot race the gap ticks.
        let _ = harness.snapshot().await;
        source.set_dims(Some((640, 480)));
        harness.tick(1);

        let snap = harness.snapshot().await;
        // 2 before the gap, 1 after; no reconfiguration happened.
        assert_eq!(snap.chunks.len(), 3);
        assert_eq!(snap.chunks[2].timestamp_us, 1_000_000);
        harness.stop().await;
    }

    #[tokio::test]
    async fn failed_submit_restarts_the_encoder() {
        let encoder = MockEncoder::new(vec![]);
        let configured = encoder.configured.clone();
        let fail_submits = encoder.fail_submits.clone();
        let harness = Harness::spawn(
            encoder,
            Arc::new(MockFrameSource::new(640, 480)),
            test_config(),
        );
        harness.tick(2);
        let _ = harness.snapshot().await;

        // The broken encoder must not keep accepting frames.
        fail_submits.store(true, Ordering::SeqCst);
        harness.tick(1);
        let _ = harness.snapshot().await;
        fail_submits.store(false, Ordering::SeqCst);
        harness.tick(2);

        let snap = harness.snapshot().await;
        // Fresh ring after recovery: re-based timestamps, new keyframe.
        assert_eq!(snap.chunks.len(), 2);
        assert_eq!(snap.chunks[0].timestamp_us, 0);
        assert!(snap.chunks[0].is_keyframe);
        assert_eq!(configured.lock().unwrap().len(), 2);
        harness.stop().await;
    }

    #[tokio::test]
    async fn cancellation_closes_the_encoder() {
        let encoder = MockEncoder::new(vec![]);
        let closed = encoder.closed.clone();
        let harness = Harness::spawn(
            encoder,
            Arc::new(MockFrameSource::new(640, 480)),
            test_config(),
        );
        harness.tick(1);
        harness.stop().await;
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn spawned_pipeline_shuts_down_cleanly() {
        let encoder = MockEncoder::new(vec![]);
        let handle = CapturePipeline::spawn(
            Box::new(encoder),
            Arc::new(MockFrameSource::new(640, 480)),
            test_config(),
            CancellationToken::new(),
        );
        let snap = handle.prepare_export().await.unwrap();
        assert_eq!(snap.fps, 2);
        handle.shutdown().await;
    }
}
