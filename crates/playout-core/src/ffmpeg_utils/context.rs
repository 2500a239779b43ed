//! FFmpeg input context wrapper for asset sources.

use crate::error::{FfmpegError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::input;
use std::path::Path;

/// Wrapper around an open asset for reading.
pub struct InputContext {
    inner: ffmpeg::format::context::Input,
    source_path: std::path::PathBuf,
}

impl InputContext {
    /// Open an asset for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let inner =
            input(&path).map_err(|e| FfmpegError::OpenInput(format!("{:?}: {}", path, e)))?;

        tracing::debug!(path = %path.display(), "opened asset");

        Ok(Self {
            inner,
            source_path: path.to_path_buf(),
        })
    }

    pub fn source_path(&self) -> &std::path::Path {
        &self.source_path
    }

    pub fn duration_ms(&self) -> i64 {
        (self.inner.duration() as i128 * 1000 / ffmpeg::ffi::AV_TIME_BASE as i128) as i64
    }

    pub fn inner(&self) -> &ffmpeg::format::context::Input {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut ffmpeg::format::context::Input {
        &mut self.inner
    }

    pub fn streams(&self) -> impl Iterator<Item = ffmpeg::Stream<'_>> + '_ {
        self.inner.streams().into_iter()
    }

    pub fn best_video_stream(&self) -> Option<usize> {
        self.inner
            .streams()
            .best(ffmpeg::media::Type::Video)
            .map(|s| s.index())
    }

    pub fn best_audio_stream(&self) -> Option<usize> {
        self.inner
            .streams()
            .best(ffmpeg::media::Type::Audio)
            .map(|s| s.index())
    }

    /// Seek precisely to `offset_ms` into the asset. Unlike a keyframe-only
    /// seek, the caller is expected to decode and discard frames up to the
    /// true offset after this returns — FFmpeg's seek is keyframe-granular,
    /// not frame-accurate.
    pub fn seek_precise_to_ms(&mut self, offset_ms: i64) -> Result<()> {
        let ts = offset_ms * i64::from(ffmpeg::ffi::AV_TIME_BASE) / 1000;
        self.inner
            .seek(ts, ..ts)
            .map_err(|e| FfmpegError::Seek(format!("seek to {}ms failed: {}", offset_ms, e)))
    }
}
