//! Bounding boxes, annotation batches, and the capacity-bounded buffer.
//!
//! The [`AnnotationBuffer`] is the only state shared between the
//! annotation channel and the render/capture paths. It has exactly one
//! writer (the channel processor) and any number of readers; readers
//! take an [`AnnotationSnapshot`] and never mutate the buffer.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::types::Pts;

/// Default maximum number of batches retained in the buffer.
pub const DEFAULT_CAPACITY: usize = 500;

/// One detected object within a frame.
///
/// Corner positions are linear row-major pixel offsets into the
/// *original* frame raster, not (x, y) pairs. Use
/// [`BoundingBox::corners`] to decode them.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    /// Linear offset of the top-left corner.
    pub top_left_offset: i64,
    /// Linear offset of the bottom-right corner.
    pub bottom_right_offset: i64,
    /// Detector class label, e.g. `"person"`.
    pub class_label: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
}

impl BoundingBox {
    /// Decode the linear corner offsets into `((x1, y1), (x2, y2))`
    /// pixel coordinates for a raster of the given width.
    ///
    /// Returns `None` when `original_width` is zero, since the row/col
    /// split is undefined without a raster width.
    pub fn corners(&self, original_width: u32) -> Option<((i64, i64), (i64, i64))> {
        if original_width == 0 {
            return None;
        }
        let w = original_width as i64;
        let (x1, y1) = (self.top_left_offset % w, self.top_left_offset / w);
        let (x2, y2) = (self.bottom_right_offset % w, self.bottom_right_offset / w);
        Some(((x1, y1), (x2, y2)))
    }
}

/// One batch of detections for a single presentation timestamp.
///
/// Immutable once constructed; the buffer hands out `Arc`s.
#[derive(Debug, Clone)]
pub struct AnnotationBatch {
    /// Presentation timestamp in 90 kHz ticks.
    pub pts: Pts,
    /// All boxes detected in the frame at `pts`, in detector order.
    pub boxes: Vec<BoundingBox>,
    /// Wall-clock start of the stream, as reported by the producer.
    pub stream_start_time_ms: i64,
    /// When this batch arrived on the channel (UTC).
    pub received_at: DateTime<Utc>,
}

/// Immutable view of the buffer contents at one point in time, in
/// arrival order.
pub type AnnotationSnapshot = Vec<Arc<AnnotationBatch>>;

/// Append-only, capacity-bounded batch buffer.
///
/// Batches are kept in arrival order, which is only approximately
/// timestamp order — consumers must tolerate out-of-order entries.
/// When the buffer is full the oldest batch is evicted.
pub struct AnnotationBuffer {
    inner: RwLock<VecDeque<Arc<AnnotationBatch>>>,
    capacity: usize,
}

impl AnnotationBuffer {
    /// Create a buffer holding at most `capacity` batches.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a batch, evicting the oldest entry if the buffer is full.
    ///
    /// Only the channel processor calls this.
    pub fn push(&self, batch: AnnotationBatch) {
        let mut inner = self.inner.write().expect("annotation buffer poisoned");
        if inner.len() >= self.capacity {
            inner.pop_front();
        }
        inner.push_back(Arc::new(batch));
    }

    /// Drop every batch, e.g. when the channel disconnects.
    pub fn clear(&self) {
        self.inner
            .write()
            .expect("annotation buffer poisoned")
            .clear();
    }

    /// Number of batches currently held.
    pub fn len(&self) -> usize {
        self.inner.read().expect("annotation buffer poisoned").len()
    }

    /// Whether the buffer holds no batches.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take an immutable snapshot of the current contents.
    ///
    /// The snapshot is a cheap `Arc` clone per batch; later writes do
    /// not affect it.
    pub fn snapshot(&self) -> AnnotationSnapshot {
        self.inner
            .read()
            .expect("annotation buffer poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for AnnotationBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
