#![allow(dead_code)]

//! Audio resampler for the producer pump.
//!
//! Converts decoded PCM frames to the house format: 48 kHz, stereo, signed
//! 16-bit interleaved.

use crate::error::{FfmpegError, PlayoutError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::{Sample, Type};

/// House audio sample rate.
pub const HOUSE_SAMPLE_RATE: u32 = 48000;
/// House channel layout.
pub const HOUSE_CHANNEL_LAYOUT: ChannelLayout = ChannelLayout::STEREO;
/// House sample format: interleaved signed 16-bit PCM.
pub const HOUSE_SAMPLE_FORMAT: Sample = Sample::I16(Type::Packed);

pub struct AudioResampler {
    context: resampling::Context,
    output_rate: u32,
}

impl AudioResampler {
    /// Build a resampler converting `src_frame`'s format to house format at
    /// `target_rate` (normally [`HOUSE_SAMPLE_RATE`], but the session's
    /// declared sample rate governs so a non-default house format still
    /// round-trips).
    pub fn new(src_frame: &ffmpeg::util::frame::Audio, target_rate: u32) -> Result<Self> {
        let src_layout = if src_frame.channel_layout().bits() == 0 {
            match src_frame.channels() {
                1 => ChannelLayout::MONO,
                _ => ChannelLayout::STEREO,
            }
        } else {
            src_frame.channel_layout()
        };

        let context = resampling::Context::get(
            src_frame.format(),
            src_layout,
            src_frame.rate(),
            HOUSE_SAMPLE_FORMAT,
            HOUSE_CHANNEL_LAYOUT,
            target_rate,
        )
        .map_err(|e| {
            PlayoutError::Ffmpeg(FfmpegError::ResamplerCreate(format!(
                "resampling context: {}",
                e
            )))
        })?;

        Ok(Self {
            context,
            output_rate: target_rate,
        })
    }

    /// Convert one input frame into zero or more house-format frames. An
    /// empty result means the resampler is still accumulating input and
    /// will produce output on a later call.
    pub fn convert(
        &mut self,
        frame: &ffmpeg::util::frame::Audio,
    ) -> Result<Vec<ffmpeg::util::frame::Audio>> {
        let mut out = ffmpeg::util::frame::Audio::empty();

        self.context.run(frame, &mut out).map_err(|e| {
            PlayoutError::Ffmpeg(FfmpegError::ReadFrame(format!("resampling error: {}", e)))
        })?;

        if out.samples() == 0 {
            return Ok(vec![]);
        }

        Ok(vec![out])
    }

    /// Flush any samples buffered inside the resampler. A no-op pass-through
    /// context (source already matched house format) has nothing buffered
    /// and returns an empty vec rather than an error.
    pub fn flush(&mut self) -> Result<Vec<ffmpeg::util::frame::Audio>> {
        let mut out = ffmpeg::util::frame::Audio::empty();
        match self.context.flush(&mut out) {
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("resampler flush returned non-fatal error: {}", e);
                return Ok(vec![]);
            }
        }

        if out.samples() == 0 {
            return Ok(vec![]);
        }

        Ok(vec![out])
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }
}

/// Whether a decoded frame already matches house format, in which case the
/// pipeline can skip resampling.
pub fn needs_resampling(frame: &ffmpeg::util::frame::Audio, target_rate: u32) -> bool {
    frame.rate() != target_rate
        || frame.format() != HOUSE_SAMPLE_FORMAT
        || frame.channel_layout() != HOUSE_CHANNEL_LAYOUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_house_sample_rate() {
        assert_eq!(HOUSE_SAMPLE_RATE, 48000);
    }
}
