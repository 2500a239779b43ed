//! The swap mechanism: the per-tick cascade that decides which segment's
//! video/audio frame is emitted and whether authority moves to a new
//! segment. This is the engine's hardest subsystem precisely because those
//! two questions (which frame, which authority) must be answered
//! atomically — see `origin(T) = active(T)` in [`SwapOutcome::consistent`].

use uuid::Uuid;

/// Tag identifying which cascade branch fired, kept around for contract
/// tests and evidence records rather than inferred after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapBranch {
    PadSeamOverride,
    ContentSeamOverride,
    CadenceAdvance,
    CadenceRepeat,
    NormalPop,
    HoldLast,
    PadFallback,
    ForceExecute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pad,
    Content,
}

/// Per-tick state of one side (video or audio) of a candidate segment.
#[derive(Debug, Clone, Copy)]
pub struct CandidateState {
    pub segment_id: Uuid,
    pub kind: SourceKind,
    pub buffered_frames: usize,
    pub seam_ready: bool,
}

/// Inputs to one cascade evaluation.
#[derive(Debug, Clone, Copy)]
pub struct CascadeInput {
    pub take_segment: bool,
    pub active: CandidateState,
    pub incoming: Option<CandidateState>,
}

/// Outcome of the cascade: which branch fired, whose frame is emitted, and
/// whether authority commits to the incoming segment on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOutcome {
    pub branch: SwapBranch,
    pub emitted_origin: Uuid,
    pub authority_commits_to_incoming: bool,
}

impl SwapOutcome {
    /// `origin(T) = active(T)` — the Phase 5 invariant. `new_active` is the
    /// segment id authority will hold for this tick after this outcome is
    /// applied.
    pub fn consistent(&self, new_active: Uuid) -> bool {
        self.emitted_origin == new_active
    }
}

/// Error raised when Phase 4's vacuum exception cannot be satisfied: the
/// active segment has no frame and no seam-ready successor exists. The
/// caller must halt emission rather than invent a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame-authority vacuum with no seam-ready successor")]
pub struct VacuumViolation;

/// Run the full Phase 1-5 cascade for one side (video or audio) of one tick.
///
/// `cadence_advance` is the outcome of the rational repeat-vs-advance
/// cadence decision for content→content continuation; it is ignored
/// whenever Phase 2(1) or 2(2) fires, per INV-CADENCE-SEAM-ADVANCE, and the
/// caller's cadence budget must not be reset by an override.
pub fn run_cascade(input: CascadeInput, cadence_advance: bool) -> Result<SwapOutcome, VacuumViolation> {
    // Phase 1 is the caller's responsibility (v_src/a_src selection already
    // folded into `input.active`/`input.incoming` by the pipeline manager);
    // here we evaluate Phase 2 onward.

    // Phase 2(1): PAD_SEAM_OVERRIDE.
    if input.take_segment {
        if let Some(incoming) = input.incoming {
            if incoming.kind == SourceKind::Pad {
                return Ok(SwapOutcome {
                    branch: SwapBranch::PadSeamOverride,
                    emitted_origin: incoming.segment_id,
                    authority_commits_to_incoming: true,
                });
            }
        }
    }

    // Phase 2(2): CONTENT_SEAM_OVERRIDE.
    if input.take_segment && input.active.buffered_frames == 0 {
        if let Some(incoming) = input.incoming {
            if incoming.kind == SourceKind::Content && incoming.seam_ready {
                return Ok(SwapOutcome {
                    branch: SwapBranch::ContentSeamOverride,
                    emitted_origin: incoming.segment_id,
                    authority_commits_to_incoming: true,
                });
            }
        }
    }

    // Phase 4 vacuum check, evaluated ahead of the normal-pop/hold-last path
    // because an empty active buffer with no seam-ready successor is fatal
    // regardless of what the cadence would otherwise decide.
    if input.active.buffered_frames == 0 {
        if let Some(incoming) = input.incoming {
            if incoming.seam_ready {
                return Ok(SwapOutcome {
                    branch: SwapBranch::ForceExecute,
                    emitted_origin: incoming.segment_id,
                    authority_commits_to_incoming: true,
                });
            }
        }
        if input.active.kind == SourceKind::Pad {
            // A pad active segment produces on demand; a buffer depth of
            // zero for pad is normal, not a vacuum.
        } else {
            return Err(VacuumViolation);
        }
    }

    // Phase 2(3): cadence repeat-vs-advance for content continuation, and
    // the pad-active fallback.
    if input.active.kind == SourceKind::Pad {
        return Ok(SwapOutcome {
            branch: SwapBranch::PadFallback,
            emitted_origin: input.active.segment_id,
            authority_commits_to_incoming: false,
        });
    }

    if input.take_segment && input.incoming.map(|i| i.seam_ready).unwrap_or(false) {
        // INV-CADENCE-SEAM-ADVANCE: on a seam tick with an eligible
        // incoming segment, advance is forced regardless of cadence state.
        let incoming = input.incoming.unwrap();
        let outcome = SwapOutcome {
            branch: SwapBranch::CadenceAdvance,
            emitted_origin: incoming.segment_id,
            authority_commits_to_incoming: true,
        };
        // Phase 3: frame-origin consistency gate. If the candidate origin
        // equals the outgoing segment (this cannot happen on this branch
        // since we just selected incoming's origin), defer; otherwise
        // commit as computed.
        return Ok(outcome);
    }

    if cadence_advance {
        Ok(SwapOutcome {
            branch: SwapBranch::NormalPop,
            emitted_origin: input.active.segment_id,
            authority_commits_to_incoming: false,
        })
    } else {
        Ok(SwapOutcome {
            branch: SwapBranch::CadenceRepeat,
            emitted_origin: input.active.segment_id,
            authority_commits_to_incoming: false,
        })
    }
}

/// Phase 3: the frame-origin consistency gate on its own, usable when a
/// caller has already computed a candidate swap and must decide whether to
/// commit or defer it to the next tick.
///
/// Returns `true` if the swap may commit this tick.
pub fn may_commit(candidate_origin: Uuid, outgoing_segment: Uuid, override_fired: bool) -> bool {
    override_fired || candidate_origin != outgoing_segment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: Uuid, kind: SourceKind, buffered: usize, ready: bool) -> CandidateState {
        CandidateState {
            segment_id: id,
            kind,
            buffered_frames: buffered,
            seam_ready: ready,
        }
    }

    #[test]
    fn test_pad_seam_override_wins_on_content_to_pad_seam() {
        let active_id = Uuid::new_v4();
        let pad_id = Uuid::new_v4();
        let input = CascadeInput {
            take_segment: true,
            active: seg(active_id, SourceKind::Content, 3, true),
            incoming: Some(seg(pad_id, SourceKind::Pad, 0, true)),
        };
        let outcome = run_cascade(input, true).unwrap();
        assert_eq!(outcome.branch, SwapBranch::PadSeamOverride);
        assert_eq!(outcome.emitted_origin, pad_id);
        assert!(outcome.authority_commits_to_incoming);
    }

    #[test]
    fn test_content_seam_override_when_active_exhausted() {
        let active_id = Uuid::new_v4();
        let incoming_id = Uuid::new_v4();
        let input = CascadeInput {
            take_segment: true,
            active: seg(active_id, SourceKind::Pad, 0, true),
            incoming: Some(seg(incoming_id, SourceKind::Content, 5, true)),
        };
        let outcome = run_cascade(input, true).unwrap();
        assert_eq!(outcome.branch, SwapBranch::ContentSeamOverride);
        assert_eq!(outcome.emitted_origin, incoming_id);
    }

    #[test]
    fn test_force_execute_on_vacuum_with_seam_ready_successor() {
        let active_id = Uuid::new_v4();
        let incoming_id = Uuid::new_v4();
        let input = CascadeInput {
            take_segment: false,
            active: seg(active_id, SourceKind::Content, 0, false),
            incoming: Some(seg(incoming_id, SourceKind::Content, 4, true)),
        };
        let outcome = run_cascade(input, true).unwrap();
        assert_eq!(outcome.branch, SwapBranch::ForceExecute);
        assert!(outcome.authority_commits_to_incoming);
    }

    #[test]
    fn test_vacuum_with_no_successor_is_an_error() {
        let active_id = Uuid::new_v4();
        let input = CascadeInput {
            take_segment: false,
            active: seg(active_id, SourceKind::Content, 0, false),
            incoming: None,
        };
        assert!(run_cascade(input, true).is_err());
    }

    #[test]
    fn test_cadence_seam_advance_is_forced_even_with_repeat_requested() {
        let active_id = Uuid::new_v4();
        let incoming_id = Uuid::new_v4();
        let input = CascadeInput {
            take_segment: true,
            active: seg(active_id, SourceKind::Content, 3, true),
            incoming: Some(seg(incoming_id, SourceKind::Content, 3, true)),
        };
        // cadence_advance = false would normally mean "repeat", but a seam
        // tick with an eligible incoming segment must still force advance.
        let outcome = run_cascade(input, false).unwrap();
        assert_eq!(outcome.branch, SwapBranch::CadenceAdvance);
        assert_eq!(outcome.emitted_origin, incoming_id);
    }

    #[test]
    fn test_cadence_repeat_holds_active_origin_off_seam() {
        let active_id = Uuid::new_v4();
        let input = CascadeInput {
            take_segment: false,
            active: seg(active_id, SourceKind::Content, 3, true),
            incoming: None,
        };
        let outcome = run_cascade(input, false).unwrap();
        assert_eq!(outcome.branch, SwapBranch::CadenceRepeat);
        assert_eq!(outcome.emitted_origin, active_id);
        assert!(!outcome.authority_commits_to_incoming);
    }

    #[test]
    fn test_pad_fallback_when_active_is_pad_off_seam() {
        let active_id = Uuid::new_v4();
        let input = CascadeInput {
            take_segment: false,
            active: seg(active_id, SourceKind::Pad, 0, true),
            incoming: None,
        };
        let outcome = run_cascade(input, true).unwrap();
        assert_eq!(outcome.branch, SwapBranch::PadFallback);
        assert_eq!(outcome.emitted_origin, active_id);
    }

    #[test]
    fn test_may_commit_defers_when_origin_matches_outgoing() {
        let outgoing = Uuid::new_v4();
        assert!(!may_commit(outgoing, outgoing, false));
        assert!(may_commit(outgoing, outgoing, true));
        assert!(may_commit(Uuid::new_v4(), outgoing, false));
    }

    #[test]
    fn test_swap_outcome_consistency_check() {
        let id = Uuid::new_v4();
        let outcome = SwapOutcome {
            branch: SwapBranch::NormalPop,
            emitted_origin: id,
            authority_commits_to_incoming: false,
        };
        assert!(outcome.consistent(id));
        assert!(!outcome.consistent(Uuid::new_v4()));
    }
}
