#![allow(dead_code)]

//! Video decoder and rescaler for the producer pump.
//!
//! Decoded frames are rescaled to the house pixel format and frame size so
//! downstream ring buffers never have to special-case per-asset geometry.

use crate::error::{FfmpegError, PlayoutError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::format::Pixel;

/// House pixel format: planar YUV 4:2:0, matching broadcast graphics
/// compositing conventions.
pub const HOUSE_PIXEL_FORMAT: Pixel = Pixel::YUV420P;

pub struct VideoDecoder {
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
}

impl VideoDecoder {
    pub fn open(stream: &ffmpeg::format::stream::Stream) -> Result<Self> {
        let stream_index = stream.index();
        let context =
            ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
                PlayoutError::Ffmpeg(FfmpegError::DecoderNotFound(format!(
                    "codec context for stream {}: {}",
                    stream_index, e
                )))
            })?;

        let decoder = context.decoder().video().map_err(|e| {
            PlayoutError::Ffmpeg(FfmpegError::DecoderCreate(format!(
                "video decoder for stream {}: {}",
                stream_index, e
            )))
        })?;

        Ok(Self {
            decoder,
            stream_index,
        })
    }

    pub fn send_packet(&mut self, packet: &ffmpeg::codec::packet::Packet) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::InvalidData) => {
                tracing::debug!(stream_index = self.stream_index, "skipping invalid packet");
                Ok(())
            }
            Err(e) => Err(PlayoutError::Ffmpeg(FfmpegError::DecodePacket(format!(
                "stream {}: {}",
                self.stream_index, e
            )))),
        }
    }

    pub fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(()),
            Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(PlayoutError::Ffmpeg(FfmpegError::ReadFrame(format!(
                "send_eof on stream {}: {}",
                self.stream_index, e
            )))),
        }
    }

    pub fn receive_frame(&mut self) -> Result<Option<ffmpeg::util::frame::Video>> {
        let mut frame = ffmpeg::util::frame::Video::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(PlayoutError::Ffmpeg(FfmpegError::ReadFrame(format!(
                "receive_frame on stream {}: {}",
                self.stream_index, e
            )))),
        }
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    /// The stream's nominal frame rate.
    pub fn r_frame_rate(&self) -> ffmpeg::Rational {
        self.decoder.frame_rate().unwrap_or(ffmpeg::Rational(0, 1))
    }
}

/// Rescales decoded video frames to the house pixel format and target
/// geometry.
pub struct VideoRescaler {
    context: scaling::Context,
    width: u32,
    height: u32,
}

impl VideoRescaler {
    pub fn new(
        src_format: Pixel,
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
    ) -> Result<Self> {
        let context = scaling::Context::get(
            src_format,
            src_width,
            src_height,
            HOUSE_PIXEL_FORMAT,
            dst_width,
            dst_height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| {
            PlayoutError::Ffmpeg(FfmpegError::RescalerCreate(format!(
                "{}x{} -> {}x{}: {}",
                src_width, src_height, dst_width, dst_height, e
            )))
        })?;

        Ok(Self {
            context,
            width: dst_width,
            height: dst_height,
        })
    }

    pub fn rescale(&mut self, frame: &ffmpeg::util::frame::Video) -> Result<ffmpeg::util::frame::Video> {
        let mut out = ffmpeg::util::frame::Video::empty();
        self.context.run(frame, &mut out).map_err(|e| {
            PlayoutError::Ffmpeg(FfmpegError::ReadFrame(format!("rescale failed: {}", e)))
        })?;
        Ok(out)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}
