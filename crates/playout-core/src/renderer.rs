//! Renderer / output router.
//!
//! Consumes the one video frame and one audio payload the swap cascade
//! chose for a tick and routes it to the active sink, enforcing:
//! real-time hold (freeze-then-pad under underrun), content-before-pad,
//! and buffer-equilibrium observability.

use crate::session::VideoFrame;

/// Default freeze window before the renderer gives up holding the last real
/// frame and falls back to pad. Left as the engine's chosen default per an
/// explicit open-question resolution; deployments needing a different
/// value should override it at session construction.
pub const DEFAULT_FREEZE_WINDOW_US: i64 = 250_000;

/// Target equilibrium buffer depth `N`; the healthy band is `[1, 2N]`.
pub const DEFAULT_EQUILIBRIUM_TARGET: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderDecision {
    /// A genuine content/pad frame was available and is emitted as-is.
    Emit,
    /// Buffer underran within the freeze window: the previous frame is
    /// re-emitted.
    Freeze,
    /// Freeze window exceeded: emit pad instead of stale content.
    PadFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquilibriumViolation {
    TooLow,
    TooHigh,
}

/// Tracks state across ticks that a stateless per-tick cascade decision
/// cannot: whether any real content frame has ever been emitted, how long
/// the renderer has been frozen, and the last real frame held for freezing.
pub struct Renderer {
    freeze_window_us: i64,
    equilibrium_target: usize,
    has_emitted_real_content: bool,
    underrun_since_us: Option<i64>,
    last_real_frame: Option<VideoFrame>,
}

impl Renderer {
    pub fn new(freeze_window_us: i64, equilibrium_target: usize) -> Self {
        Self {
            freeze_window_us,
            equilibrium_target,
            has_emitted_real_content: false,
            underrun_since_us: None,
            last_real_frame: None,
        }
    }

    /// Decide how to handle a tick given whether a frame is available now.
    /// `now_us` is the tick's content/monotonic clock reading, used purely
    /// to measure how long an underrun has persisted.
    pub fn decide(&mut self, frame_available: bool, is_known_empty_segment: bool, now_us: i64) -> RenderDecision {
        if frame_available {
            self.underrun_since_us = None;
            self.has_emitted_real_content = true;
            return RenderDecision::Emit;
        }

        // content-before-pad: a known-empty segment may boot directly into
        // pad even though no real content has ever been emitted.
        if !self.has_emitted_real_content && !is_known_empty_segment {
            // Nothing to freeze yet and no content precedent: still must
            // produce *something*, so fall through to pad rather than
            // inventing a content frame.
            return RenderDecision::PadFallback;
        }

        let since = *self.underrun_since_us.get_or_insert(now_us);
        if now_us - since <= self.freeze_window_us && self.last_real_frame.is_some() {
            RenderDecision::Freeze
        } else {
            RenderDecision::PadFallback
        }
    }

    /// Record the frame actually emitted on a real-content tick, so a
    /// subsequent underrun can freeze on it.
    pub fn record_real_frame(&mut self, frame: VideoFrame) {
        self.last_real_frame = Some(frame);
    }

    pub fn last_real_frame(&self) -> Option<&VideoFrame> {
        self.last_real_frame.as_ref()
    }

    /// Sample one buffer depth and flag a sustained violation of the
    /// `[1, 2N]` equilibrium band. No hysteresis: the same bounds apply to
    /// both detecting and clearing a violation.
    pub fn check_equilibrium(&self, depth: usize) -> Option<EquilibriumViolation> {
        if depth < 1 {
            Some(EquilibriumViolation::TooLow)
        } else if depth > 2 * self.equilibrium_target {
            Some(EquilibriumViolation::TooHigh)
        } else {
            None
        }
    }

    /// A diagnostic-only check: emitting pad while the input buffer depth
    /// is high indicates the cascade is taking the pad branch when it
    /// need not be.
    pub fn pad_while_depth_high(&self, emitting_pad: bool, depth: usize) -> bool {
        emitting_pad && depth > self.equilibrium_target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> VideoFrame {
        VideoFrame {
            pts_us: 0,
            duration_us: 33_333,
            width: 4,
            height: 4,
            data: std::sync::Arc::new(vec![0u8; 24]),
        }
    }

    #[test]
    fn test_emit_when_frame_available() {
        let mut renderer = Renderer::new(DEFAULT_FREEZE_WINDOW_US, DEFAULT_EQUILIBRIUM_TARGET);
        assert_eq!(renderer.decide(true, false, 0), RenderDecision::Emit);
    }

    #[test]
    fn test_content_before_pad_without_precedent_falls_to_pad() {
        let mut renderer = Renderer::new(DEFAULT_FREEZE_WINDOW_US, DEFAULT_EQUILIBRIUM_TARGET);
        assert_eq!(renderer.decide(false, false, 0), RenderDecision::PadFallback);
    }

    #[test]
    fn test_known_empty_segment_boots_directly_to_pad() {
        let mut renderer = Renderer::new(DEFAULT_FREEZE_WINDOW_US, DEFAULT_EQUILIBRIUM_TARGET);
        // No content has ever been emitted, but this segment is declared
        // known-empty, so freeze logic (not the no-precedent guard) runs;
        // with no last_real_frame, it still falls to pad.
        assert_eq!(renderer.decide(false, true, 0), RenderDecision::PadFallback);
    }

    #[test]
    fn test_freeze_within_window_then_pad_fallback_after() {
        let mut renderer = Renderer::new(1000, DEFAULT_EQUILIBRIUM_TARGET);
        renderer.decide(true, false, 0);
        renderer.record_real_frame(sample_frame());

        assert_eq!(renderer.decide(false, false, 500), RenderDecision::Freeze);
        assert_eq!(
            renderer.decide(false, false, 2000),
            RenderDecision::PadFallback
        );
    }

    #[test]
    fn test_equilibrium_band_is_symmetric_no_hysteresis() {
        let renderer = Renderer::new(DEFAULT_FREEZE_WINDOW_US, 3);
        assert_eq!(renderer.check_equilibrium(0), Some(EquilibriumViolation::TooLow));
        assert_eq!(renderer.check_equilibrium(1), None);
        assert_eq!(renderer.check_equilibrium(6), None);
        assert_eq!(
            renderer.check_equilibrium(7),
            Some(EquilibriumViolation::TooHigh)
        );
    }

    #[test]
    fn test_pad_while_depth_high_is_flagged() {
        let renderer = Renderer::new(DEFAULT_FREEZE_WINDOW_US, 3);
        assert!(renderer.pad_while_depth_high(true, 5));
        assert!(!renderer.pad_while_depth_high(true, 1));
        assert!(!renderer.pad_while_depth_high(false, 5));
    }
}
