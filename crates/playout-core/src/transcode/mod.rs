//! Decode/resample/rescale stack that converts compressed asset streams into
//! house-format video and audio frames.

pub mod audio_decoder;
pub mod resampler;
pub mod video_decoder;

pub use audio_decoder::AudioDecoder;
pub use resampler::AudioResampler;
pub use video_decoder::{VideoDecoder, VideoRescaler};
