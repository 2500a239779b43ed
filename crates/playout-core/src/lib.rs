//! # playout-core
//!
//! `playout-core` is the deterministic, frame-accurate scheduling engine
//! behind a broadcast playout channel. Given a sequence of scheduled
//! content blocks (each a time-bounded container of segments referencing
//! media assets), it emits exactly one video frame and a matching amount
//! of audio per output tick, at a session-fixed frame rate, aligned to
//! wall-clock deadlines, for an indefinite session.
//!
//! ## Core subsystems
//!
//! - [`clock`] — the single source of "now" for a session, real or
//!   deterministic.
//! - [`tick`] — the tick grid: deadlines, content-time, fence and seam
//!   ticks, all in rational arithmetic.
//! - [`session`] — the immutable data model: program format, blocks,
//!   segments, frames.
//! - [`ring_buffer`] — bounded, capacity-gated video/audio queues.
//! - [`producer`] — the demux/decode/resample pump for content segments.
//! - [`pad`] — the on-demand black-frame/silent-audio generator.
//! - [`segment_fsm`] — the segment lifecycle state machine.
//! - [`swap`] — the frame-selection cascade and authority handoff.
//! - [`pipeline`] — the per-tick loop tying the above together.
//! - [`renderer`] — the output router: freeze-then-pad, content-before-pad.
//! - [`sink`] — the pluggable output sink contract.
//! - [`control`] — the external-facing playout control state machine.
//! - [`evidence`] — the append-only, crash-tolerant session event log.
//!
//! ## Usage
//!
//! ```ignore
//! fn main() {
//!     playout_core::ffmpeg_init()?;
//!     playout_core::ffmpeg_log_filter();
//!
//!     start_channel_service();
//! }
//! ```
//!
//! Blocking calls into this crate (opening an asset, running bootstrap
//! preroll) should be wrapped in `tokio::task::spawn_blocking` by an async
//! caller.

pub mod clock;
pub mod control;
pub mod error;
pub mod evidence;
pub mod ffmpeg_utils;
pub mod pad;
pub mod pipeline;
pub mod producer;
pub mod renderer;
pub mod ring_buffer;
pub mod segment_fsm;
pub mod session;
pub mod sink;
pub mod swap;
pub mod tick;
pub mod transcode;

#[cfg(test)]
pub(crate) mod tests;

pub use error::{FfmpegError, PlayoutError, Result};
pub use ffmpeg_utils::version_info as ffmpeg_version_info;
pub use ffmpeg_utils::{init as ffmpeg_init, install_log_filter as ffmpeg_log_filter};
