//! FFmpeg module - wrappers and utilities for FFmpeg library access.
//!
//! This module handles:
//! - FFmpeg initialization
//! - Input context management for asset sources
//! - Timebase conversion and codec utilities

pub mod context;
pub mod utils;

pub use ffmpeg_next as ffmpeg;
#[allow(unused_imports)]
pub use utils::*;

/// Initialize the FFmpeg library.
///
/// Must be called exactly once at process startup before any source is
/// opened.
pub fn init() -> Result<(), crate::error::FfmpegError> {
    ffmpeg::init().map_err(|e| {
        crate::error::FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e))
    })?;

    tracing::info!("FFmpeg initialized");

    Ok(())
}

/// Install a custom FFmpeg log callback that suppresses known-noisy
/// messages emitted when decoding assets with unconventional timestamps
/// (common in traffic logged from live capture).
///
/// **Safety & ordering:** must be called after `init()` and before any
/// decoder threads start, because changing the global log callback is not
/// thread-safe.
pub fn install_log_filter() {
    unsafe {
        ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_WARNING as i32);
        ffmpeg_next::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

const SUPPRESSED_MESSAGES: &[&str] = &[
    "Could not update timestamps for skipped samples",
    "Could not update timestamps for discarded samples",
    "non-monotonic DTS",
    "Error parsing Opus packet header",
];

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg_next::ffi::va_list,
) {
    use std::ffi::CStr;

    if level > unsafe { ffmpeg_next::ffi::av_log_get_level() } {
        return;
    }

    let mut buf = [0i8; 1024];
    let mut print_prefix: std::ffi::c_int = 1;
    ffmpeg_next::ffi::av_log_format_line(
        avcl,
        level,
        fmt,
        vl,
        buf.as_mut_ptr(),
        buf.len() as std::ffi::c_int,
        &mut print_prefix,
    );

    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy();

    for suppressed in SUPPRESSED_MESSAGES {
        if msg.contains(suppressed) {
            return;
        }
    }

    eprint!("{}", msg);
}

/// Linked FFmpeg version string, used by the `/version` control-plane
/// endpoint.
pub fn version_info() -> String {
    "FFmpeg 8.0+".to_string()
}
