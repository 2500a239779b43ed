//! Data model: session, program format, blocks, segments, frames.
//!
//! Everything here is immutable once constructed, except the fields that
//! the spec explicitly calls out as mutable (segment lifecycle state lives
//! in `segment_fsm`, not here).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tick::FrameRate;

/// Video format portion of the program format JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    #[serde(with = "frame_rate_str")]
    pub frame_rate: FrameRate,
}

/// Audio format portion of the program format JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    S16,
}

/// The immutable program format JSON exchanged with the control plane.
///
/// ```json
/// { "video": {"width": int, "height": int, "frame_rate": "num/den"},
///   "audio": {"sample_rate": int, "channels": int, "sample_format": "s16"} }
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramFormat {
    pub video: VideoFormat,
    pub audio: AudioFormat,
}

mod frame_rate_str {
    use super::FrameRate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(fps: &FrameRate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{}/{}", fps.num, fps.den))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<FrameRate, D::Error> {
        let raw = String::deserialize(d)?;
        let (num, den) = raw
            .split_once('/')
            .ok_or_else(|| serde::de::Error::custom("frame_rate must be \"num/den\""))?;
        let num: i64 = num
            .parse()
            .map_err(|_| serde::de::Error::custom("invalid frame_rate numerator"))?;
        let den: i64 = den
            .parse()
            .map_err(|_| serde::de::Error::custom("invalid frame_rate denominator"))?;
        Ok(FrameRate::new(num, den))
    }
}

/// Immutable, session-fixed configuration. No subsystem may rewrite these
/// fields after `Session::new` runs.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub session_id: Uuid,
    pub format: ProgramFormat,
    pub epoch_utc_us: i64,
    pub epoch_mono_ns: i64,
}

impl Session {
    pub fn new(format: ProgramFormat, epoch_utc_us: i64, epoch_mono_ns: i64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            format,
            epoch_utc_us,
            epoch_mono_ns,
        }
    }

    pub fn fps(&self) -> FrameRate {
        self.format.video.frame_rate
    }
}

/// The type of substitution a segment represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    Content,
    Pad,
    Filler,
    Emergency,
}

/// Transition applied at a segment boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    None,
    Fade { duration_ms: i64 },
}

/// Seam classification: does authority hand off to another segment within
/// the same block, or does the block itself end here?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeamType {
    Segment,
    Block,
}

/// A time-bounded slice of a block, referencing a media asset (or empty for
/// pad segments).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: Uuid,
    pub segment_index: usize,
    pub asset_uri: String,
    pub asset_start_offset_ms: i64,
    pub segment_duration_ms: i64,
    pub segment_type: SegmentType,
    pub transition_in: Transition,
    pub transition_out: Transition,
}

impl Segment {
    pub fn is_pad(&self) -> bool {
        matches!(self.segment_type, SegmentType::Pad)
    }
}

/// Immutable once admitted: an ordered run of segments bounded by UTC times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub block_id: Uuid,
    pub start_utc_ms: i64,
    pub end_utc_ms: i64,
    pub segments: Vec<Segment>,
}

impl Block {
    /// Sum of segment durations; callers validate this equals
    /// `end_utc_ms - start_utc_ms` at admission time (spec §6: admission is
    /// deadline-driven, so a malformed block is a caller fault, not
    /// something the engine silently repairs).
    pub fn declared_duration_ms(&self) -> i64 {
        self.segments.iter().map(|s| s.segment_duration_ms).sum()
    }

    /// Seam type for the segment at `index`: `Block` if it is the last
    /// segment in the block, else `Segment`.
    pub fn seam_type_for(&self, index: usize) -> SeamType {
        if index + 1 >= self.segments.len() {
            SeamType::Block
        } else {
            SeamType::Segment
        }
    }
}

/// One decoded, rescaled video frame in house format.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pts_us: i64,
    pub duration_us: i64,
    pub width: u32,
    pub height: u32,
    /// Planar pixel data in the session's pixel format.
    pub data: std::sync::Arc<Vec<u8>>,
}

/// One decoded, resampled audio frame in house format (interleaved s16).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub pts_us: i64,
    pub nb_samples: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: std::sync::Arc<Vec<i16>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_format() -> ProgramFormat {
        ProgramFormat {
            video: VideoFormat {
                width: 1920,
                height: 1080,
                frame_rate: FrameRate::new(30000, 1001),
            },
            audio: AudioFormat {
                sample_rate: 48000,
                channels: 2,
                sample_format: SampleFormat::S16,
            },
        }
    }

    #[test]
    fn test_program_format_json_round_trip() {
        let fmt = sample_format();
        let json = serde_json::to_string(&fmt).unwrap();
        let parsed: ProgramFormat = serde_json::from_str(&json).unwrap();
        assert_eq!(fmt, parsed);
    }

    #[test]
    fn test_program_format_json_shape() {
        let fmt = sample_format();
        let json = serde_json::to_value(fmt).unwrap();
        assert_eq!(json["video"]["frame_rate"], "30000/1001");
        assert_eq!(json["audio"]["sample_format"], "s16");
    }

    #[test]
    fn test_seam_type_last_segment_is_block() {
        let block = Block {
            block_id: Uuid::new_v4(),
            start_utc_ms: 0,
            end_utc_ms: 10_000,
            segments: vec![
                Segment {
                    segment_id: Uuid::new_v4(),
                    segment_index: 0,
                    asset_uri: "a".into(),
                    asset_start_offset_ms: 0,
                    segment_duration_ms: 5000,
                    segment_type: SegmentType::Content,
                    transition_in: Transition::None,
                    transition_out: Transition::None,
                },
                Segment {
                    segment_id: Uuid::new_v4(),
                    segment_index: 1,
                    asset_uri: "b".into(),
                    asset_start_offset_ms: 0,
                    segment_duration_ms: 5000,
                    segment_type: SegmentType::Content,
                    transition_in: Transition::None,
                    transition_out: Transition::None,
                },
            ],
        };
        assert_eq!(block.seam_type_for(0), SeamType::Segment);
        assert_eq!(block.seam_type_for(1), SeamType::Block);
        assert_eq!(block.declared_duration_ms(), 10_000);
    }
}
