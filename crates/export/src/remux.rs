//! Optional fast-start remux of the IVF artifact.
//!
//! Best-effort: when ffmpeg is present the clip is repackaged with the
//! stream metadata up front (`-movflags +faststart` for MP4), so
//! playback can begin before the file is fully downloaded. Failure
//! here never invalidates the IVF artifact.

use std::io::Write;

use sightline_capture::CodecId;

/// Remux failures, shaped after the rest of our ffmpeg invocations.
#[derive(Debug, thiserror::Error)]
pub enum RemuxError {
    #[error("ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Container the clip was remuxed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemuxContainer {
    /// MP4 with the moov atom moved to the front.
    Mp4,
    /// WebM; VP8 has no defined MP4 mapping.
    Webm,
}

impl RemuxContainer {
    pub fn for_codec(codec: CodecId) -> Self {
        match codec {
            CodecId::Vp9 => RemuxContainer::Mp4,
            CodecId::Vp8 => RemuxContainer::Webm,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            RemuxContainer::Mp4 => "mp4",
            RemuxContainer::Webm => "webm",
        }
    }
}

/// Stream-copy the IVF clip into a fast-start container.
///
/// Returns the remuxed bytes; the caller keeps the IVF artifact
/// regardless of the outcome.
pub async fn remux_faststart(
    ivf: &[u8],
    codec: CodecId,
) -> Result<(Vec<u8>, RemuxContainer), RemuxError> {
    let container = RemuxContainer::for_codec(codec);

    let dir = tempfile::tempdir()?;
    let input_path = dir.path().join("clip.ivf");
    let output_path = dir.path().join(format!("clip.{}", container.extension()));
    {
        let mut input = std::fs::File::create(&input_path)?;
        input.write_all(ivf)?;
    }

    let mut cmd = tokio::process::Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
        .arg("-i")
        .arg(&input_path)
        .args(["-c", "copy"]);
    if container == RemuxContainer::Mp4 {
        cmd.args(["-movflags", "+faststart"]);
    }
    cmd.arg(&output_path);

    let output = cmd.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RemuxError::NotFound(e)
        } else {
            RemuxError::Io(e)
        }
    })?;

    if !output.status.success() {
        return Err(RemuxError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let bytes = std::fs::read(&output_path)?;
    tracing::debug!(
        container = container.extension(),
        bytes = bytes.len(),
        "Clip remuxed",
    );
    Ok((bytes, container))
}
