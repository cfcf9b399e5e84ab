//! Clip container writing.
//!
//! The canonical clip artifact is IVF: a 32-byte file header followed
//! by 12-byte frame headers, with the header written before any frame
//! data so a player can read codec, dimensions, and timebase without a
//! trailing seek. The frame count is patched in `finalize`.

use bytes::Bytes;

use sightline_capture::{DecoderConfig, EncodedChunk};

/// Offset of the frame-count field inside the IVF file header.
const FRAME_COUNT_OFFSET: usize = 24;

/// Container writer for assembled clips.
///
/// Chunks must be added oldest first with zero-based timestamps.
pub trait Muxer {
    fn add_chunk(&mut self, chunk: &EncodedChunk);

    /// Consume buffered state and return the finished container bytes.
    fn finalize(&mut self) -> Bytes;
}

/// IVF muxer with a microsecond timebase.
pub struct IvfMuxer {
    buf: Vec<u8>,
    frame_count: u32,
}

impl IvfMuxer {
    pub fn new(config: &DecoderConfig) -> Self {
        let mut buf = Vec::with_capacity(64 * 1024);
        buf.extend_from_slice(b"DKIF");
        buf.extend_from_slice(&0u16.to_le_bytes()); // version
        buf.extend_from_slice(&32u16.to_le_bytes()); // header length
        buf.extend_from_slice(&config.codec.fourcc());
        buf.extend_from_slice(&(config.width as u16).to_le_bytes());
        buf.extend_from_slice(&(config.height as u16).to_le_bytes());
        // Timebase 1/1_000_000: frame pts are in microseconds.
        buf.extend_from_slice(&1_000_000u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // frame count, patched later
        buf.extend_from_slice(&0u32.to_le_bytes()); // unused
        Self {
            buf,
            frame_count: 0,
        }
    }
}

impl Muxer for IvfMuxer {
    fn add_chunk(&mut self, chunk: &EncodedChunk) {
        self.buf
            .extend_from_slice(&(chunk.payload.len() as u32).to_le_bytes());
        self.buf
            .extend_from_slice(&(chunk.timestamp_us.max(0) as u64).to_le_bytes());
        self.buf.extend_from_slice(&chunk.payload);
        self.frame_count += 1;
    }

    fn finalize(&mut self) -> Bytes {
        self.buf[FRAME_COUNT_OFFSET..FRAME_COUNT_OFFSET + 4]
            .copy_from_slice(&self.frame_count.to_le_bytes());
        Bytes::from(std::mem::take(&mut self.buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightline_capture::CodecId;

    fn config() -> DecoderConfig {
        DecoderConfig {
            codec: CodecId::Vp9,
            width: 1920,
            height: 1080,
        }
    }

    fn chunk(timestamp_us: i64, payload: &'static [u8]) -> EncodedChunk {
        EncodedChunk {
            timestamp_us,
            duration_us: Some(33_333),
            is_keyframe: true,
            payload: Bytes::from_static(payload),
            decoder_config: None,
        }
    }

    #[test]
    fn header_precedes_all_frame_data() {
        let mut muxer = IvfMuxer::new(&config());
        muxer.add_chunk(&chunk(0, b"aaaa"));
        muxer.add_chunk(&chunk(33_333, b"bb"));
        let bytes = muxer.finalize();

        assert_eq!(&bytes[0..4], b"DKIF");
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 32);
        assert_eq!(&bytes[8..12], b"VP90");
        assert_eq!(u16::from_le_bytes([bytes[12], bytes[13]]), 1920);
        assert_eq!(u16::from_le_bytes([bytes[14], bytes[15]]), 1080);
        // Frame count patched in finalize.
        assert_eq!(
            u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
            2
        );
    }

    #[test]
    fn frame_headers_carry_size_and_pts() {
        let mut muxer = IvfMuxer::new(&config());
        muxer.add_chunk(&chunk(500_000, b"payload"));
        let bytes = muxer.finalize();

        let frame = &bytes[32..];
        let size = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        assert_eq!(size, 7);
        let pts = u64::from_le_bytes([
            frame[4], frame[5], frame[6], frame[7], frame[8], frame[9], frame[10], frame[11],
        ]);
        assert_eq!(pts, 500_000);
        assert_eq!(&frame[12..12 + 7], b"payload");
    }

    #[test]
    fn empty_clip_has_zero_frames() {
        let mut muxer = IvfMuxer::new(&config());
        let bytes = muxer.finalize();
        assert_eq!(bytes.len(), 32);
        assert_eq!(
            u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
            0
        );
    }
}
