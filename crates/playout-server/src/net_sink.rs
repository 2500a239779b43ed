//! Concrete output sink: delivers routed frames over a TCP or Unix domain
//! socket connection to a downstream consumer (encoder/muxer process).
//!
//! Wire format is deliberately minimal — a 1-byte kind tag, an 8-byte
//! big-endian PTS in microseconds, a 4-byte big-endian payload length, then
//! the raw planar/interleaved payload. The encoder/muxer on the other end of
//! this connection is out of scope; this only has to honor the `Sink`
//! contract over a real transport instead of the in-process test doubles.

use std::io::Write;
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use playout_core::error::{PlayoutError, Result};
use playout_core::session::{AudioFrame, VideoFrame};
use playout_core::sink::Sink;

const KIND_VIDEO: u8 = 0;
const KIND_AUDIO: u8 = 1;

enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Uds(UnixStream),
}

impl Transport {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Transport::Tcp(s) => s.write_all(buf),
            #[cfg(unix)]
            Transport::Uds(s) => s.write_all(buf),
        }
    }
}

/// A [`Sink`] that writes frames to a connected downstream consumer.
pub struct NetSink {
    transport: Transport,
}

impl NetSink {
    pub fn connect_tcp(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| PlayoutError::Resource(format!("sink connect to {} failed: {}", addr, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| PlayoutError::Resource(format!("sink set_nodelay failed: {}", e)))?;
        Ok(Self {
            transport: Transport::Tcp(stream),
        })
    }

    #[cfg(unix)]
    pub fn connect_uds(path: &str) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .map_err(|e| PlayoutError::Resource(format!("sink connect to {} failed: {}", path, e)))?;
        Ok(Self {
            transport: Transport::Uds(stream),
        })
    }

    fn write_frame(&mut self, kind: u8, pts_us: i64, payload: &[u8]) -> Result<()> {
        let mut header = Vec::with_capacity(13);
        header.push(kind);
        header.extend_from_slice(&pts_us.to_be_bytes());
        header.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        self.transport
            .write_all(&header)
            .map_err(|e| PlayoutError::Resource(format!("sink header write failed: {}", e)))?;
        self.transport
            .write_all(payload)
            .map_err(|e| PlayoutError::Resource(format!("sink payload write failed: {}", e)))
    }
}

impl Sink for NetSink {
    fn on_video_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        self.write_frame(KIND_VIDEO, frame.pts_us, &frame.data)
    }

    fn on_audio_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        let mut bytes = Vec::with_capacity(frame.samples.len() * 2);
        for sample in frame.samples.iter() {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        self.write_frame(KIND_AUDIO, frame.pts_us, &bytes)
    }
}
