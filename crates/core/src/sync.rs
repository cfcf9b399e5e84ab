//! Playback synchronizer: correlates the annotation buffer against the
//! video surface's advancing playback clock.
//!
//! The computation is a pure function of `(snapshot, current_pts,
//! params)` — no state is carried between render ticks, so the host can
//! call [`active_boxes`] every tick and always gets the same answer for
//! the same inputs.

use crate::annotation::{AnnotationSnapshot, BoundingBox};
use crate::types::Pts;

/// Tolerance and retention parameters for the active-set computation.
#[derive(Debug, Clone, Copy)]
pub struct SyncParams {
    /// Clock ticks covered by one video frame (see
    /// [`crate::types::ticks_per_frame`]).
    pub ticks_per_frame: i64,
    /// How many frames an annotation stays on screen after its PTS has
    /// passed. Operator-configurable; raising it trades staleness for
    /// continuity when detection cadence lags the video frame rate.
    pub retention_frames: u32,
}

impl SyncParams {
    /// Absorbs minor clock and measurement jitter between the video
    /// surface's reported position and the producer's timestamps.
    pub fn tolerance(&self) -> i64 {
        2 * self.ticks_per_frame
    }

    /// Window behind the playhead within which a batch remains active.
    pub fn retention_window(&self) -> i64 {
        self.retention_frames as i64 * self.ticks_per_frame
    }

    /// Whether a batch at `pts` is active at playback position
    /// `current_pts`.
    pub fn is_active(&self, pts: Pts, current_pts: Pts) -> bool {
        pts <= current_pts + self.tolerance() && pts >= current_pts - self.retention_window()
    }
}

/// Compute the active bounding-box set for the current render tick.
///
/// Returns the union of the boxes of every active batch, in buffer
/// (arrival) order. Batches older than the retention window are
/// intentionally dropped from the set even if they arrived late — the
/// window is the only reconciliation rule.
pub fn active_boxes(
    snapshot: &AnnotationSnapshot,
    current_pts: Pts,
    params: &SyncParams,
) -> Vec<BoundingBox> {
    snapshot
        .iter()
        .filter(|batch| params.is_active(batch.pts, current_pts))
        .flat_map(|batch| batch.boxes.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::annotation::AnnotationBatch;

    fn params(retention_frames: u32) -> SyncParams {
        SyncParams {
            ticks_per_frame: 3_000,
            retention_frames,
        }
    }

    fn batch(pts: Pts, n_boxes: usize) -> Arc<AnnotationBatch> {
        let boxes = (0..n_boxes)
            .map(|i| BoundingBox {
                top_left_offset: i as i64,
                bottom_right_offset: i as i64 + 100,
                class_label: "person".into(),
                confidence: 0.8,
            })
            .collect();
        Arc::new(AnnotationBatch {
            pts,
            boxes,
            stream_start_time_ms: 0,
            received_at: Utc::now(),
        })
    }

    #[test]
    fn exact_pts_match_is_always_active() {
        // Tolerance and window must never exclude an exact match.
        for retention_frames in 1..=10 {
            let p = params(retention_frames);
            for current_pts in [0, 3_000, 90_000, 1_000_000] {
                assert!(
                    p.is_active(current_pts, current_pts),
                    "pts == current_pts must be active (retention_frames={retention_frames})"
                );
            }
        }
    }

    #[test]
    fn retention_window_scenario() {
        // retention_frames=1, ticks_per_frame=3000,
        // current=90000: batch at 90000 active, batch at 86000 not
        // (window lower bound is 87000).
        let p = params(1);
        assert!(p.is_active(90_000, 90_000));
        assert!(!p.is_active(86_000, 90_000));
        // Boundary: exactly at the window edge is still active.
        assert!(p.is_active(87_000, 90_000));
    }

    #[test]
    fn tolerance_admits_slightly_future_batches() {
        let p = params(1);
        // Up to 2 frames ahead of the playhead is within tolerance.
        assert!(p.is_active(90_000 + 6_000, 90_000));
        assert!(!p.is_active(90_000 + 6_001, 90_000));
    }

    #[test]
    fn active_set_is_union_of_active_batches() {
        let snapshot = vec![batch(87_000, 2), batch(90_000, 3), batch(50_000, 4)];
        let boxes = active_boxes(&snapshot, 90_000, &params(1));
        // 87000 and 90000 active, 50000 far outside the window.
        assert_eq!(boxes.len(), 5);
    }

    #[test]
    fn recomputation_is_idempotent() {
        let snapshot = vec![batch(90_000, 1)];
        let p = params(1);
        let first = active_boxes(&snapshot, 90_000, &p);
        let second = active_boxes(&snapshot, 90_000, &p);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_snapshot_yields_empty_set() {
        assert!(active_boxes(&Vec::new(), 90_000, &params(1)).is_empty());
    }

    #[test]
    fn out_of_order_arrival_does_not_matter() {
        // Active-set membership depends on pts only, not arrival order.
        let forward = vec![batch(87_000, 1), batch(90_000, 1)];
        let reversed = vec![batch(90_000, 1), batch(87_000, 1)];
        let p = params(1);
        assert_eq!(
            active_boxes(&forward, 90_000, &p).len(),
            active_boxes(&reversed, 90_000, &p).len()
        );
    }
}
