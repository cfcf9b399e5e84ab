//! Presentation-timestamp clock and frame-rate conversions.

/// Presentation timestamps are tick counts on a fixed 90 kHz clock, the
/// same rate the annotation producer stamps its batches with.
pub type Pts = i64;

/// Stream identifiers assigned by the backend that owns the streams.
pub type VideoId = i64;

/// Ticks per second of the presentation clock.
pub const CLOCK_RATE: i64 = 90_000;

/// Number of clock ticks covered by one frame at the given nominal
/// source frame rate.
///
/// Falls back to 30 fps when `fps` is zero so that a missing stream
/// rate never produces a zero-width tolerance window.
pub fn ticks_per_frame(fps: u32) -> i64 {
    let fps = if fps == 0 { 30 } else { fps as i64 };
    CLOCK_RATE / fps
}

/// Convert a tick count to whole microseconds.
pub fn ticks_to_micros(ticks: i64) -> i64 {
    ticks * 1_000_000 / CLOCK_RATE
}
