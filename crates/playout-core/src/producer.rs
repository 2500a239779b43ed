//! The producer pump: demuxes, decodes, and resamples one asset into the
//! video/audio ring buffers.
//!
//! Demux is interleaved (a single packet reader feeding two decoders), so a
//! video-only stall cannot starve the audio decoder and vice versa. When a
//! ring buffer is full, the corresponding decoded frame is held in a small
//! deferred queue rather than dropped — audio is never dropped per the
//! symmetric backpressure contract, and dropping video would violate frame
//! authority continuity just the same.

use std::collections::VecDeque;
use std::path::Path;

use ffmpeg_next as ffmpeg;
use uuid::Uuid;

use crate::error::{FfmpegError, PlayoutError, Result};
use crate::ffmpeg_utils::context::InputContext;
use crate::ffmpeg_utils::utils::rescale_ts;
use crate::ring_buffer::RingBuffer;
use crate::session::{AudioFrame, VideoFrame};
use crate::transcode::{AudioDecoder, AudioResampler, VideoDecoder, VideoRescaler};

/// Which streams `pump_once` should service on a given call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpMode {
    /// Service both video and audio, interleaved as packets arrive.
    Normal,
    /// Video buffer is full or the segment has no more video; drain audio
    /// only, so audio does not stall behind a blocked video path.
    AudioOnly,
    /// The demuxer has reached EOF; flush decoder and resampler internals
    /// until both report no more output.
    EofFlush,
}

/// What happened during one `pump_once` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// At least one frame was pushed to a ring buffer.
    Progress,
    /// No packet could be read because a buffer was full (backpressure).
    Backpressured,
    /// The demuxer has no more packets and decoders are drained.
    Eof,
}

/// Authoritative frame rate for the asset, accounting for the VFR drop
/// guard: if `avg_frame_rate` diverges from `r_frame_rate` by more than 10%,
/// the container's nominal rate cannot be trusted and the average is used
/// instead.
pub fn authoritative_frame_rate(
    r_frame_rate: ffmpeg::Rational,
    avg_frame_rate: Option<ffmpeg::Rational>,
) -> ffmpeg::Rational {
    let Some(avg) = avg_frame_rate else {
        return r_frame_rate;
    };
    if r_frame_rate.denominator() == 0 || r_frame_rate.numerator() == 0 {
        return avg;
    }
    let r = r_frame_rate.numerator() as f64 / r_frame_rate.denominator() as f64;
    let a = avg.numerator() as f64 / avg.denominator() as f64;
    if r == 0.0 {
        return avg;
    }
    let divergence = ((r - a) / r).abs();
    if divergence > 0.10 {
        avg
    } else {
        r_frame_rate
    }
}

struct DeferredVideo {
    frame: VideoFrame,
}

/// A raw video packet read while in [`PumpMode::AudioOnly`], held for replay
/// once the mode returns to `Normal` rather than discarded — dropping it
/// would violate the symmetric backpressure contract just as surely as
/// dropping a decoded frame would.
struct DeferredVideoPacket {
    packet: ffmpeg::codec::packet::Packet,
}

struct DeferredAudio {
    frame: AudioFrame,
}

/// Pumps one asset's video/audio packets into house-format ring buffers.
pub struct Producer {
    input: InputContext,
    video_stream_index: Option<usize>,
    audio_stream_index: Option<usize>,
    video_decoder: Option<VideoDecoder>,
    audio_decoder: Option<AudioDecoder>,
    video_rescaler: Option<VideoRescaler>,
    audio_resampler: Option<AudioResampler>,
    segment_origin_id: Uuid,
    house_width: u32,
    house_height: u32,
    house_sample_rate: u32,
    deferred_video: VecDeque<DeferredVideo>,
    deferred_audio: VecDeque<DeferredAudio>,
    deferred_video_packets: VecDeque<DeferredVideoPacket>,
    eof_reached: bool,
    decoders_drained: bool,
}

impl Producer {
    pub fn open<P: AsRef<Path>>(
        path: P,
        segment_origin_id: Uuid,
        house_width: u32,
        house_height: u32,
        house_sample_rate: u32,
    ) -> Result<Self> {
        let input = InputContext::open(path)?;

        let video_stream_index = input.best_video_stream();
        let audio_stream_index = input.best_audio_stream();

        let video_decoder = match video_stream_index {
            Some(idx) => {
                let stream = input
                    .inner()
                    .stream(idx)
                    .ok_or(FfmpegError::NoVideoStream)?;
                Some(VideoDecoder::open(&stream)?)
            }
            None => None,
        };

        let audio_decoder = match audio_stream_index {
            Some(idx) => {
                let stream = input
                    .inner()
                    .stream(idx)
                    .ok_or(FfmpegError::NoAudioStream)?;
                Some(AudioDecoder::open(&stream)?)
            }
            None => None,
        };

        Ok(Self {
            input,
            video_stream_index,
            audio_stream_index,
            video_decoder,
            audio_decoder,
            video_rescaler: None,
            audio_resampler: None,
            segment_origin_id,
            house_width,
            house_height,
            house_sample_rate,
            deferred_video: VecDeque::new(),
            deferred_audio: VecDeque::new(),
            deferred_video_packets: VecDeque::new(),
            eof_reached: false,
            decoders_drained: false,
        })
    }

    /// Seek the underlying asset to `offset_ms`. Looping at EOF back to the
    /// start of the same asset is rejected — a segment that wants to repeat
    /// content must be scheduled as a distinct segment, not expressed as a
    /// seek wraparound.
    pub fn seek_precise_to_ms(&mut self, offset_ms: i64) -> Result<()> {
        self.input.seek_precise_to_ms(offset_ms)
    }

    pub fn segment_origin_id(&self) -> Uuid {
        self.segment_origin_id
    }

    /// Drive one unit of work according to `mode`, pushing decoded frames
    /// into `video_buf`/`audio_buf`. Deferred frames (held back by a full
    /// buffer on a previous call) are retried before any new packet is read.
    pub fn pump_once(
        &mut self,
        mode: PumpMode,
        video_buf: &RingBuffer<VideoFrame>,
        audio_buf: &RingBuffer<AudioFrame>,
    ) -> Result<PumpOutcome> {
        let mut progressed = false;

        progressed |= self.drain_deferred(video_buf, audio_buf);
        if mode == PumpMode::Normal {
            progressed |= self.drain_deferred_video_packets(video_buf)?;
        }

        if mode == PumpMode::EofFlush {
            return self.pump_eof_flush(video_buf, audio_buf);
        }

        if self.eof_reached {
            return self.pump_eof_flush(video_buf, audio_buf);
        }

        let wants_video = mode == PumpMode::Normal && self.video_decoder.is_some();
        let wants_audio = self.audio_decoder.is_some();

        if !wants_video && !wants_audio {
            return Ok(PumpOutcome::Eof);
        }

        let Some((stream_index, packet)) = self.read_next_packet()? else {
            self.eof_reached = true;
            return self.pump_eof_flush(video_buf, audio_buf);
        };

        if Some(stream_index) == self.video_stream_index {
            if mode == PumpMode::Normal {
                progressed |= self.feed_video_packet(&packet, video_buf)?;
            } else {
                // AudioOnly: the packet was already pulled off the demuxer and
                // must not be discarded (INV-BACKPRESSURE-SYMMETRIC) — hold it
                // for replay once video service resumes.
                self.deferred_video_packets.push_back(DeferredVideoPacket { packet });
            }
        } else if Some(stream_index) == self.audio_stream_index {
            progressed |= self.feed_audio_packet(&packet, audio_buf)?;
        }

        if progressed {
            Ok(PumpOutcome::Progress)
        } else {
            Ok(PumpOutcome::Backpressured)
        }
    }

    fn read_next_packet(&mut self) -> Result<Option<(usize, ffmpeg::codec::packet::Packet)>> {
        let mut packets = self.input.inner_mut().packets();
        match packets.next() {
            Some((stream, packet)) => Ok(Some((stream.index(), packet))),
            None => Ok(None),
        }
    }

    fn feed_video_packet(
        &mut self,
        packet: &ffmpeg::codec::packet::Packet,
        video_buf: &RingBuffer<VideoFrame>,
    ) -> Result<bool> {
        if video_buf.size() >= video_buf.capacity() {
            return Ok(false);
        }

        let Some(decoder) = self.video_decoder.as_mut() else {
            return Ok(false);
        };
        decoder.send_packet(packet)?;

        let mut progressed = false;
        while let Some(frame) = decoder.receive_frame()? {
            let house = self.rescale_video_frame(decoder, &frame)?;
            if !video_buf.try_push(house.clone(), self.segment_origin_id) {
                self.deferred_video.push_back(DeferredVideo { frame: house });
                break;
            }
            progressed = true;
        }
        Ok(progressed)
    }

    fn feed_audio_packet(
        &mut self,
        packet: &ffmpeg::codec::packet::Packet,
        audio_buf: &RingBuffer<AudioFrame>,
    ) -> Result<bool> {
        if audio_buf.size() >= audio_buf.capacity() {
            return Ok(false);
        }

        let Some(decoder) = self.audio_decoder.as_mut() else {
            return Ok(false);
        };
        decoder.send_packet(packet)?;

        let mut progressed = false;
        while let Some(frame) = decoder.receive_frame()? {
            for house in self.resample_audio_frame(&frame)? {
                if !audio_buf.try_push(house.clone(), self.segment_origin_id) {
                    self.deferred_audio.push_back(DeferredAudio { frame: house });
                    break;
                }
                progressed = true;
            }
        }
        Ok(progressed)
    }

    fn rescale_video_frame(
        &mut self,
        decoder: &VideoDecoder,
        frame: &ffmpeg::util::frame::Video,
    ) -> Result<VideoFrame> {
        if self.video_rescaler.is_none() {
            self.video_rescaler = Some(VideoRescaler::new(
                frame.format(),
                decoder.width(),
                decoder.height(),
                self.house_width,
                self.house_height,
            )?);
        }
        let rescaler = self.video_rescaler.as_mut().unwrap();
        let out = rescaler.rescale(frame)?;

        let tb = ffmpeg::Rational(1, 1_000_000);
        let pts_us = frame
            .pts()
            .map(|pts| rescale_ts(pts, ffmpeg::Rational(1, 1), tb))
            .unwrap_or(0);

        Ok(VideoFrame {
            pts_us,
            duration_us: 0,
            width: rescaler.width(),
            height: rescaler.height(),
            data: std::sync::Arc::new(out.data(0).to_vec()),
        })
    }

    fn resample_audio_frame(
        &mut self,
        frame: &ffmpeg::util::frame::Audio,
    ) -> Result<Vec<AudioFrame>> {
        if self.audio_resampler.is_none() {
            self.audio_resampler = Some(AudioResampler::new(frame, self.house_sample_rate)?);
        }
        let resampler = self.audio_resampler.as_mut().unwrap();
        let outputs = resampler.convert(frame)?;

        Ok(outputs
            .iter()
            .map(|out| AudioFrame {
                pts_us: 0,
                nb_samples: out.samples(),
                sample_rate: self.house_sample_rate,
                channels: out.channels(),
                samples: std::sync::Arc::new(samples_as_i16(out)),
            })
            .collect())
    }

    fn drain_deferred(
        &mut self,
        video_buf: &RingBuffer<VideoFrame>,
        audio_buf: &RingBuffer<AudioFrame>,
    ) -> bool {
        let mut progressed = false;
        while let Some(front) = self.deferred_video.front() {
            if video_buf.try_push(front.frame.clone(), self.segment_origin_id) {
                self.deferred_video.pop_front();
                progressed = true;
            } else {
                break;
            }
        }
        while let Some(front) = self.deferred_audio.front() {
            if audio_buf.try_push(front.frame.clone(), self.segment_origin_id) {
                self.deferred_audio.pop_front();
                progressed = true;
            } else {
                break;
            }
        }
        progressed
    }

    /// Replay packets deferred while in `AudioOnly` mode, in the order they
    /// were read, stopping as soon as the video buffer has no room so a
    /// still-full buffer doesn't force a retry loop.
    fn drain_deferred_video_packets(&mut self, video_buf: &RingBuffer<VideoFrame>) -> Result<bool> {
        let mut progressed = false;
        while video_buf.size() < video_buf.capacity() {
            let Some(deferred) = self.deferred_video_packets.pop_front() else {
                break;
            };
            progressed |= self.feed_video_packet(&deferred.packet, video_buf)?;
        }
        Ok(progressed)
    }

    fn pump_eof_flush(
        &mut self,
        video_buf: &RingBuffer<VideoFrame>,
        audio_buf: &RingBuffer<AudioFrame>,
    ) -> Result<PumpOutcome> {
        if !self.deferred_video_packets.is_empty() {
            let progressed = self.drain_deferred_video_packets(video_buf)?;
            return Ok(if progressed {
                PumpOutcome::Progress
            } else {
                PumpOutcome::Backpressured
            });
        }

        if !self.deferred_video.is_empty() || !self.deferred_audio.is_empty() {
            let progressed = self.drain_deferred(video_buf, audio_buf);
            return Ok(if progressed {
                PumpOutcome::Progress
            } else {
                PumpOutcome::Backpressured
            });
        }

        if self.decoders_drained {
            return Ok(PumpOutcome::Eof);
        }

        let mut progressed = false;

        if let Some(decoder) = self.video_decoder.as_mut() {
            decoder.send_eof()?;
            while let Some(frame) = decoder.receive_frame()? {
                let house = {
                    let rescaler = self.video_rescaler.as_mut();
                    match rescaler {
                        Some(r) => {
                            let out = r.rescale(&frame)?;
                            VideoFrame {
                                pts_us: 0,
                                duration_us: 0,
                                width: r.width(),
                                height: r.height(),
                                data: std::sync::Arc::new(out.data(0).to_vec()),
                            }
                        }
                        None => continue,
                    }
                };
                if !video_buf.try_push(house.clone(), self.segment_origin_id) {
                    self.deferred_video.push_back(DeferredVideo { frame: house });
                } else {
                    progressed = true;
                }
            }
        }

        if let Some(decoder) = self.audio_decoder.as_mut() {
            decoder.send_eof()?;
            while let Some(frame) = decoder.receive_frame()? {
                if let Some(resampler) = self.audio_resampler.as_mut() {
                    for out in resampler.convert(&frame)? {
                        let house = AudioFrame {
                            pts_us: 0,
                            nb_samples: out.samples(),
                            sample_rate: self.house_sample_rate,
                            channels: out.channels(),
                            samples: std::sync::Arc::new(samples_as_i16(&out)),
                        };
                        if !audio_buf.try_push(house.clone(), self.segment_origin_id) {
                            self.deferred_audio.push_back(DeferredAudio { frame: house });
                        } else {
                            progressed = true;
                        }
                    }
                }
            }
            if let Some(resampler) = self.audio_resampler.as_mut() {
                for out in resampler.flush()? {
                    let house = AudioFrame {
                        pts_us: 0,
                        nb_samples: out.samples(),
                        sample_rate: self.house_sample_rate,
                        channels: out.channels(),
                        samples: std::sync::Arc::new(samples_as_i16(&out)),
                    };
                    if !audio_buf.try_push(house.clone(), self.segment_origin_id) {
                        self.deferred_audio.push_back(DeferredAudio { frame: house });
                    } else {
                        progressed = true;
                    }
                }
            }
        }

        self.decoders_drained = true;

        if progressed {
            Ok(PumpOutcome::Progress)
        } else if !self.deferred_video.is_empty() || !self.deferred_audio.is_empty() {
            Ok(PumpOutcome::Backpressured)
        } else {
            Ok(PumpOutcome::Eof)
        }
    }
}

fn samples_as_i16(frame: &ffmpeg::util::frame::Audio) -> Vec<i16> {
    let bytes = frame.data(0);
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_ne_bytes([b[0], b[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vfr_drop_guard_keeps_nominal_within_tolerance() {
        let r = ffmpeg::Rational(30, 1);
        let avg = Some(ffmpeg::Rational(2997, 100));
        let result = authoritative_frame_rate(r, avg);
        assert_eq!(result, r);
    }

    #[test]
    fn test_vfr_drop_guard_switches_on_large_divergence() {
        let r = ffmpeg::Rational(30, 1);
        let avg = Some(ffmpeg::Rational(24, 1));
        let result = authoritative_frame_rate(r, avg);
        assert_eq!(result, avg.unwrap());
    }

    #[test]
    fn test_vfr_drop_guard_no_avg_keeps_nominal() {
        let r = ffmpeg::Rational(30, 1);
        let result = authoritative_frame_rate(r, None);
        assert_eq!(result, r);
    }
}
