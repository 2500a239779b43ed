//! Pad producer: generates black video frames and silent audio on demand.
//!
//! Pad segments have no asset to decode, so frames are synthesized directly
//! in house format. Audio sample counts per tick rarely divide evenly into
//! the frame rate (e.g. 48000 Hz / 29.97 fps), so a per-segment fractional
//! remainder accumulator keeps the synthesized audio phase-continuous
//! instead of drifting or producing audible clicks at segment boundaries.

use uuid::Uuid;

use crate::session::{AudioFrame, VideoFrame};
use crate::tick::FrameRate;

/// Synthesizes black/silent frames for a single pad segment.
pub struct PadProducer {
    segment_origin_id: Uuid,
    width: u32,
    height: u32,
    sample_rate: u32,
    channels: u16,
    fps: FrameRate,
    /// Accumulated fractional sample remainder, in units of `fps.num`
    /// (so `remainder / fps.num` is the fractional sample count owed).
    sample_remainder: i64,
}

impl PadProducer {
    pub fn new(
        segment_origin_id: Uuid,
        width: u32,
        height: u32,
        sample_rate: u32,
        channels: u16,
        fps: FrameRate,
    ) -> Self {
        Self {
            segment_origin_id,
            width,
            height,
            sample_rate,
            channels,
            fps,
            sample_remainder: 0,
        }
    }

    pub fn segment_origin_id(&self) -> Uuid {
        self.segment_origin_id
    }

    /// One black video frame for `pts_us`.
    pub fn next_video_frame(&self, pts_us: i64, duration_us: i64) -> VideoFrame {
        let luma_len = (self.width * self.height) as usize;
        let chroma_len = luma_len / 4;
        let mut data = Vec::with_capacity(luma_len + 2 * chroma_len);
        data.extend(std::iter::repeat(16u8).take(luma_len));
        data.extend(std::iter::repeat(128u8).take(2 * chroma_len));

        VideoFrame {
            pts_us,
            duration_us,
            width: self.width,
            height: self.height,
            data: std::sync::Arc::new(data),
        }
    }

    /// One silent audio frame sized for exactly one tick at `fps`, carrying
    /// forward any fractional sample owed from the previous call so the
    /// synthesized stream never drifts from the house sample rate.
    pub fn next_audio_frame(&mut self, pts_us: i64) -> AudioFrame {
        // exact_samples_per_tick = sample_rate * fps.den / fps.num
        let numerator = (self.sample_rate as i64) * self.fps.den + self.sample_remainder;
        let nb_samples = numerator / self.fps.num;
        self.sample_remainder = numerator - nb_samples * self.fps.num;

        let total = nb_samples as usize * self.channels as usize;
        let samples = vec![0i16; total];

        AudioFrame {
            pts_us,
            nb_samples: nb_samples as usize,
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples: std::sync::Arc::new(samples),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_frame_is_black_in_yuv420p() {
        let pad = PadProducer::new(Uuid::new_v4(), 4, 4, 48000, 2, FrameRate::new(30, 1));
        let frame = pad.next_video_frame(0, 33_333);
        assert_eq!(frame.data[0], 16);
        assert_eq!(*frame.data.last().unwrap(), 128);
    }

    #[test]
    fn test_audio_frame_is_silent() {
        let mut pad = PadProducer::new(Uuid::new_v4(), 4, 4, 48000, 2, FrameRate::new(30, 1));
        let frame = pad.next_audio_frame(0);
        assert!(frame.samples.iter().all(|&s| s == 0));
        assert_eq!(frame.nb_samples, 1600);
    }

    #[test]
    fn test_sample_remainder_keeps_phase_continuous_over_ntsc() {
        // 48000 / (30000/1001) = 1601.6 samples/tick; over 5 ticks the
        // accumulated remainder must make the total sample count exact.
        let mut pad = PadProducer::new(Uuid::new_v4(), 4, 4, 48000, 2, FrameRate::new(30000, 1001));
        let mut total = 0usize;
        for i in 0..5 {
            total += pad.next_audio_frame(i).nb_samples;
        }
        // exact total = ceil/round of 5 * 48000 * 1001 / 30000 = 8008.333..
        // integer accumulation must land within one sample of the true value
        let exact = (5i64 * 48000 * 1001) as f64 / 30000.0;
        assert!((total as f64 - exact).abs() < 1.0);
    }
}
