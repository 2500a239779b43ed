//! FFmpeg utility functions.

use ffmpeg_next as ffmpeg;

/// Convert a timestamp from one timebase to another. Essential whenever a
/// decoded frame's pts must be expressed in house microseconds.
pub fn rescale_ts(ts: i64, from: ffmpeg::Rational, to: ffmpeg::Rational) -> i64 {
    unsafe { ffmpeg::ffi::av_rescale_q(ts, from.into(), to.into()) }
}

pub fn codec_name(codec_id: ffmpeg::codec::Id) -> &'static str {
    codec_id.name()
}

/// True average frame rate reported by the container, distinct from the
/// nominal `r_frame_rate`. Used by the VFR drop guard: if this diverges
/// from the nominal rate by more than 10%, the nominal rate is not
/// authoritative and the producer must fall back to this one.
pub fn avg_frame_rate(stream: &ffmpeg::Stream) -> Option<ffmpeg::Rational> {
    let afr = stream.avg_frame_rate();
    if afr.numerator() > 0 && afr.denominator() > 0 {
        Some(afr)
    } else {
        None
    }
}

pub fn is_video_codec(codec_id: ffmpeg::codec::Id) -> bool {
    matches!(
        codec_id,
        ffmpeg::codec::Id::H264
            | ffmpeg::codec::Id::HEVC
            | ffmpeg::codec::Id::VP9
            | ffmpeg::codec::Id::AV1
            | ffmpeg::codec::Id::MPEG4
            | ffmpeg::codec::Id::MPEG2VIDEO
            | ffmpeg::codec::Id::VP8
    )
}

pub fn is_audio_codec(codec_id: ffmpeg::codec::Id) -> bool {
    matches!(
        codec_id,
        ffmpeg::codec::Id::AAC
            | ffmpeg::codec::Id::AC3
            | ffmpeg::codec::Id::EAC3
            | ffmpeg::codec::Id::OPUS
            | ffmpeg::codec::Id::VORBIS
            | ffmpeg::codec::Id::MP3
            | ffmpeg::codec::Id::FLAC
            | ffmpeg::codec::Id::PCM_S16LE
            | ffmpeg::codec::Id::PCM_S24LE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_codec() {
        assert!(is_video_codec(ffmpeg::codec::Id::H264));
        assert!(!is_video_codec(ffmpeg::codec::Id::AAC));
    }

    #[test]
    fn test_is_audio_codec() {
        assert!(is_audio_codec(ffmpeg::codec::Id::AAC));
        assert!(!is_audio_codec(ffmpeg::codec::Id::H264));
    }
}
