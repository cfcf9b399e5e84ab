//! Annotation channel message types and parser.
//!
//! The backend pushes flat JSON messages tagged by a `"type"` field.
//! Only `bboxes` carries annotation payload; `stream_info`, `pong` and
//! `error` are session-level and the rest are tolerated and ignored.

use chrono::Utc;
use serde::Deserialize;
use sightline_core::{AnnotationBatch, BoundingBox, Pts, VideoId};

/// All known channel message types.
///
/// Deserialized via the internally-tagged `"type"` field; the remaining
/// fields of each message sit beside the tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    /// One batch of detection boxes for a presentation timestamp.
    Bboxes(BoxBatchData),

    /// Initial stream metadata; forwarded to the owning session.
    StreamInfo(serde_json::Value),

    /// Keep-alive response to our periodic ping.
    Pong,

    /// Producer-side error report.
    Error(ErrorData),

    /// Any other `type` value. Accepted and ignored, never treated as
    /// malformed.
    #[serde(other)]
    Unknown,
}

/// Payload of a `bboxes` message.
#[derive(Debug, Clone, Deserialize)]
pub struct BoxBatchData {
    pub video_id: VideoId,
    /// Presentation timestamp of the annotated frame, 90 kHz ticks.
    pub pts: Pts,
    #[serde(default)]
    pub bboxes: Vec<BoxData>,
    /// Wall-clock start of the stream in epoch milliseconds.
    pub stream_start_time_ms: i64,
    /// Producer-side send timestamp.
    pub timestamp: i64,
}

/// A single box within a `bboxes` message.
///
/// Corner fields are linear row-major pixel offsets into the original
/// frame raster.
#[derive(Debug, Clone, Deserialize)]
pub struct BoxData {
    pub pts: Pts,
    pub top_left_corner: i64,
    pub bottom_right_corner: i64,
    pub class_name: String,
    pub confidence: f64,
    /// Absolute detection time; not all producers send it.
    #[serde(default)]
    pub absolute_timestamp_ms: Option<i64>,
}

/// Payload of an `error` message.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub message: String,
}

impl BoxBatchData {
    /// Convert the wire payload into an immutable [`AnnotationBatch`],
    /// stamping the arrival time.
    pub fn into_batch(self) -> AnnotationBatch {
        let boxes = self
            .bboxes
            .into_iter()
            .map(|b| BoundingBox {
                top_left_offset: b.top_left_corner,
                bottom_right_offset: b.bottom_right_corner,
                class_label: b.class_name,
                confidence: b.confidence,
            })
            .collect();
        AnnotationBatch {
            pts: self.pts,
            boxes,
            stream_start_time_ms: self.stream_start_time_ms,
            received_at: Utc::now(),
        }
    }
}

/// Parse a channel WebSocket text message into a typed enum.
///
/// Returns `Err` for malformed JSON or payloads missing required
/// fields. Callers log and drop malformed messages, never abort.
pub fn parse_message(text: &str) -> Result<ChannelMessage, serde_json::Error> {
    serde_json::from_str(text)
}
