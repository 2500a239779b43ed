use thiserror::Error;

/// Main error type for the playout engine core.
#[derive(Error, Debug)]
pub enum PlayoutError {
    /// An error originating from the underlying FFmpeg library.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A caller-supplied argument failed validation (bad block plan, unknown
    /// segment type, non-monotonic timestamps).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A requested resource (channel, asset, sink) was not found or not
    /// attached when an operation required it.
    #[error("Resource error: {0}")]
    Resource(String),

    /// Opening a source container failed.
    #[error("Open error: {0}")]
    OpenError(String),

    /// A seek operation failed or would require looping at EOF.
    #[error("Seek error: {0}")]
    SeekError(String),

    /// A decode operation failed on an already-open source.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// A named invariant was violated. Carries the invariant tag so contract
    /// tests and evidence records can assert on it directly.
    #[error("Invariant violated: {tag}: {detail}")]
    InvariantViolation { tag: &'static str, detail: String },

    /// The evidence spool has reached its configured byte cap; the record
    /// was not written.
    #[error("Evidence spool is full")]
    SpoolFull,
}

/// FFmpeg-specific errors, kept distinct from engine-level errors so call
/// sites can tell "the container broke" from "our own bookkeeping broke".
#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    #[error("Failed to find stream info: {0}")]
    FindStreamInfo(String),

    #[error("No video stream found in source")]
    NoVideoStream,

    #[error("No audio stream found in source")]
    NoAudioStream,

    #[error("Failed to find decoder: codec_id={0}")]
    DecoderNotFound(String),

    #[error("Failed to create decoder: {0}")]
    DecoderCreate(String),

    #[error("Failed to create resampler: {0}")]
    ResamplerCreate(String),

    #[error("Failed to create rescaler: {0}")]
    RescalerCreate(String),

    #[error("Failed to decode packet: {0}")]
    DecodePacket(String),

    #[error("Failed to read frame: {0}")]
    ReadFrame(String),

    #[error("Invalid or unexpected timebase")]
    InvalidTimebase,

    #[error("Seek failed: {0}")]
    Seek(String),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, PlayoutError>;
