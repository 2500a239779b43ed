#![allow(dead_code)]

//! Audio decoder for the producer pump.
//!
//! Wraps an FFmpeg `AVCodecContext` to decode compressed audio packets into
//! raw PCM frames, ready for resampling to house format.

use crate::error::{FfmpegError, PlayoutError, Result};
use ffmpeg_next as ffmpeg;

pub struct AudioDecoder {
    decoder: ffmpeg::decoder::Audio,
    stream_index: usize,
}

impl AudioDecoder {
    /// Open a decoder for `stream`, using its own codec parameters.
    pub fn open(stream: &ffmpeg::format::stream::Stream) -> Result<Self> {
        let stream_index = stream.index();
        let context =
            ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
                PlayoutError::Ffmpeg(FfmpegError::DecoderNotFound(format!(
                    "codec context for stream {}: {}",
                    stream_index, e
                )))
            })?;

        let decoder = context.decoder().audio().map_err(|e| {
            PlayoutError::Ffmpeg(FfmpegError::DecoderCreate(format!(
                "audio decoder for stream {}: {}",
                stream_index, e
            )))
        })?;

        Ok(Self {
            decoder,
            stream_index,
        })
    }

    /// Send a compressed packet to the decoder. Invalid-data errors are
    /// non-fatal — they occur on seek pre-roll and are simply dropped.
    pub fn send_packet(&mut self, packet: &ffmpeg::codec::packet::Packet) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::InvalidData) => {
                tracing::debug!(stream_index = self.stream_index, "skipping pre-roll packet");
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

    pub fn receive_frame(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let mut frame = ffmpeg::util::frame::Audio::empty();
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

    pub fn sample_rate(&self) -> u32 {
        self.decoder.rate()
    }

    pub fn channels(&self) -> u16 {
        self.decoder.channels()
    }

    pub fn channel_layout(&self) -> ffmpeg::util::channel_layout::ChannelLayout {
        self.decoder.channel_layout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_aac_decoder() {
        assert!(ffmpeg::codec::decoder::find(ffmpeg::codec::Id::AAC).is_some());
    }

    #[test]
    fn test_find_ac3_decoder() {
        assert!(ffmpeg::codec::decoder::find(ffmpeg::codec::Id::AC3).is_some());
    }
}
