//! Integration testing module.
//!
//! End-to-end scenario tests for the playout pipeline, built entirely on
//! synthetic frames (no real asset decode) so they run without FFmpeg I/O:
//! - two-segment content continuity
//! - content -> pad and pad -> content seams
//! - the frame-authority vacuum exception
//! - deterministic-vs-real-time parity

pub mod scenarios;
