//! Segment lifecycle state machine.
//!
//! `Proposed` segments exist only as schedule entries. `Primed` means a
//! producer has been attached and is filling ring buffers ahead of the seam.
//! `Authoritative` means this segment currently owns tick authority.
//! `Draining` means authority has moved on but buffered frames from this
//! segment may still be in flight. `Retired` means its buffers are clear and
//! its producer has been torn down.

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Proposed,
    Primed,
    Authoritative,
    Draining,
    Retired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("illegal segment transition: {from:?} -> {to:?}")]
    Illegal { from: SegmentState, to: SegmentState },
}

/// Tracks one segment's lifecycle state alongside its buffer fill levels,
/// which `seam_ready` consults before authority can hand off to it.
pub struct SegmentLifecycle {
    pub segment_id: Uuid,
    state: SegmentState,
}

impl SegmentLifecycle {
    pub fn new(segment_id: Uuid) -> Self {
        Self {
            segment_id,
            state: SegmentState::Proposed,
        }
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    /// Attempt to move to `to`. Only the forward path
    /// `Proposed -> Primed -> Authoritative -> Draining -> Retired` is legal;
    /// anything else is a programming error surfaced as `TransitionError`
    /// rather than silently clamped, since a skipped or reversed transition
    /// here means the swap mechanism itself has a bug.
    pub fn transition(&mut self, to: SegmentState) -> Result<(), TransitionError> {
        let legal = matches!(
            (self.state, to),
            (SegmentState::Proposed, SegmentState::Primed)
                | (SegmentState::Primed, SegmentState::Authoritative)
                | (SegmentState::Authoritative, SegmentState::Draining)
                | (SegmentState::Draining, SegmentState::Retired)
        );
        if !legal {
            return Err(TransitionError::Illegal {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

/// A segment is seam-ready when its buffers hold at least `min_video` video
/// frames and `min_audio` audio frames — the minimum prefeed margin the
/// swap cascade requires before it will consider handing authority over,
/// distinct from (and smaller than) the bootstrap preroll threshold.
pub fn seam_ready(video_buffered: usize, audio_buffered: usize, min_video: usize, min_audio: usize) -> bool {
    video_buffered >= min_video && audio_buffered >= min_audio
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_forward_path() {
        let mut seg = SegmentLifecycle::new(Uuid::new_v4());
        assert!(seg.transition(SegmentState::Primed).is_ok());
        assert!(seg.transition(SegmentState::Authoritative).is_ok());
        assert!(seg.transition(SegmentState::Draining).is_ok());
        assert!(seg.transition(SegmentState::Retired).is_ok());
    }

    #[test]
    fn test_illegal_skip_is_rejected() {
        let mut seg = SegmentLifecycle::new(Uuid::new_v4());
        assert!(seg.transition(SegmentState::Authoritative).is_err());
    }

    #[test]
    fn test_illegal_backwards_is_rejected() {
        let mut seg = SegmentLifecycle::new(Uuid::new_v4());
        seg.transition(SegmentState::Primed).unwrap();
        seg.transition(SegmentState::Authoritative).unwrap();
        assert!(seg.transition(SegmentState::Primed).is_err());
    }

    #[test]
    fn test_seam_ready_requires_both_streams() {
        assert!(!seam_ready(5, 0, 2, 2));
        assert!(!seam_ready(0, 5, 2, 2));
        assert!(seam_ready(2, 2, 2, 2));
    }
}
