//! Pipeline manager: the per-tick loop.
//!
//! Owns one session, one tick grid, the active segment's ring buffers, a
//! second "incoming" pair for a pre-rolling successor, a clock handle, and
//! a sink handle. Drives: `sleep_until(deadline(N))`, the cascade and swap,
//! routing to the sink, tick increment, and lateness observation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{PlayoutError, Result};
use crate::evidence::EvidenceSpool;
use crate::ring_buffer::RingBuffer;
use crate::session::{AudioFrame, Session, VideoFrame};
use crate::sink::SinkSlot;
use crate::swap::{run_cascade, CandidateState, CascadeInput, SourceKind, SwapBranch, VacuumViolation};
use crate::tick::TickGrid;

/// Minimum buffered video/audio frames a segment must hold before the
/// pipeline will treat it as seam-ready during bootstrap or the swap
/// cascade.
#[derive(Debug, Clone, Copy)]
pub struct PrefeedThresholds {
    pub min_video: usize,
    pub min_audio: usize,
}

impl Default for PrefeedThresholds {
    fn default() -> Self {
        Self {
            min_video: 2,
            min_audio: 2,
        }
    }
}

/// A lateness observation: emission wall-clock exceeded the scheduled
/// deadline by more than one tick period. Recorded, never acted on beyond
/// logging — future deadlines stay anchored to the epoch regardless.
#[derive(Debug, Clone, Copy)]
pub struct LatenessEvent {
    pub tick: i64,
    pub deadline_mono_ns: i64,
    pub actual_mono_ns: i64,
}

/// One segment's pair of ring buffers plus its identity, as seen by the
/// pipeline manager.
pub struct SegmentBuffers {
    pub segment_id: Uuid,
    pub kind: SourceKind,
    pub video: RingBuffer<VideoFrame>,
    pub audio: RingBuffer<AudioFrame>,
}

impl SegmentBuffers {
    pub fn new(segment_id: Uuid, kind: SourceKind, capacity: usize) -> Self {
        Self {
            segment_id,
            kind,
            video: RingBuffer::new(capacity),
            audio: RingBuffer::new(capacity),
        }
    }

    fn video_candidate(&self, thresholds: &PrefeedThresholds) -> CandidateState {
        CandidateState {
            segment_id: self.segment_id,
            kind: self.kind,
            buffered_frames: self.video.size(),
            seam_ready: match self.kind {
                SourceKind::Pad => self.audio.size() >= thresholds.min_audio,
                SourceKind::Content => {
                    self.video.size() >= thresholds.min_video
                        && self.audio.size() >= thresholds.min_audio
                        && self.video_front_matches_origin()
                }
            },
        }
    }

    fn audio_candidate(&self, thresholds: &PrefeedThresholds) -> CandidateState {
        CandidateState {
            segment_id: self.segment_id,
            kind: self.kind,
            buffered_frames: self.audio.size(),
            seam_ready: self.audio.size() >= thresholds.min_audio && self.audio_front_matches_origin(),
        }
    }

    /// A buffer's front entry should always carry this segment's own id —
    /// `clear()` on retirement is supposed to prevent a recycled buffer from
    /// leaking a stale frame into the next occupant. Phase 1 source
    /// selection checks it rather than trusting that invariant blindly.
    fn video_front_matches_origin(&self) -> bool {
        match self.video.peek_front_origin() {
            Some(origin) => origin == self.segment_id,
            None => false,
        }
    }

    fn audio_front_matches_origin(&self) -> bool {
        match self.audio.peek_front_origin() {
            Some(origin) => origin == self.segment_id,
            None => false,
        }
    }
}

/// Outcome of one tick's cascade, reported to the caller so it can route
/// the chosen frames to the sink and apply authority commits to its own
/// segment bookkeeping.
pub struct TickResult {
    pub tick: i64,
    pub video_branch: SwapBranch,
    pub audio_branch: SwapBranch,
    pub video_commits_to_incoming: bool,
    pub audio_commits_to_incoming: bool,
    pub video_frame: Option<VideoFrame>,
    pub audio_frame: Option<AudioFrame>,
    pub lateness: Option<LatenessEvent>,
}

pub struct PipelineManager<C: Clock> {
    session: Session,
    grid: TickGrid,
    clock: Arc<C>,
    tick: i64,
    thresholds: PrefeedThresholds,
    stop_flag: Arc<AtomicBool>,
    sink: SinkSlot,
    evidence: Option<Arc<EvidenceSpool>>,
}

impl<C: Clock> PipelineManager<C> {
    pub fn new(session: Session, clock: Arc<C>, thresholds: PrefeedThresholds) -> Self {
        let grid = TickGrid::new(session.fps(), session.epoch_mono_ns);
        Self {
            session,
            grid,
            clock,
            tick: 0,
            thresholds,
            stop_flag: Arc::new(AtomicBool::new(false)),
            sink: SinkSlot::new(),
            evidence: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn current_tick(&self) -> i64 {
        self.tick
    }

    pub fn sink_mut(&mut self) -> &mut SinkSlot {
        &mut self.sink
    }

    pub fn attach_evidence(&mut self, spool: Arc<EvidenceSpool>) {
        self.evidence = Some(spool);
    }

    /// Cooperative stop flag. Observed by the tick loop each iteration, the
    /// producer pump at each step, and (via the decoder's interrupt
    /// callback, out of scope here) a blocking read. No subsystem may block
    /// longer than one tick on this becoming true.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }

    /// Bootstrap preroll: wait (by polling, via `poll_fn`) until `active`
    /// satisfies `MIN_V`/`MIN_A`, or until `gate_timeout_ns` of monotonic
    /// time has elapsed, whichever comes first. Returns `true` if gated on
    /// timeout rather than true readiness, in which case the caller should
    /// begin emission with pad frames (boot-immediate-decodable-output)
    /// until the first real frame arrives.
    pub fn bootstrap<F: FnMut() -> bool>(
        &self,
        active: &SegmentBuffers,
        gate_timeout_ns: i64,
        mut poll_fn: F,
    ) -> bool {
        let start = self.clock.now_mono_ns();
        loop {
            if active.video.size() >= self.thresholds.min_video
                && active.audio.size() >= self.thresholds.min_audio
            {
                return false;
            }
            if self.clock.now_mono_ns() - start >= gate_timeout_ns {
                return true;
            }
            if !poll_fn() {
                return true;
            }
        }
    }

    /// Run one tick: sleep to the deadline, run the cascade for video and
    /// audio independently (their sources may differ — e.g. a pad video
    /// fallback paired with still-draining outgoing audio), pop the chosen
    /// frames, and advance. Does not route to the sink; the caller does
    /// that with the returned frames so it retains control over segment
    /// bookkeeping (authority commits) before frames are emitted.
    ///
    /// Takes shared references: the ring buffers inside `SegmentBuffers`
    /// are internally mutexed so a producer thread can push concurrently
    /// with this call popping, per [`crate::ring_buffer::RingBuffer`]'s
    /// producer/pipeline-thread split.
    pub fn run_tick(
        &mut self,
        active: &SegmentBuffers,
        incoming: Option<&SegmentBuffers>,
        take_segment: bool,
        cadence_advance: bool,
    ) -> std::result::Result<TickResult, VacuumViolation> {
        let deadline = self.grid.deadline(self.tick);
        self.clock.sleep_until(deadline);

        let video_candidate_active = active.video_candidate(&self.thresholds);
        let audio_candidate_active = active.audio_candidate(&self.thresholds);
        let video_candidate_incoming = incoming.map(|s| s.video_candidate(&self.thresholds));
        let audio_candidate_incoming = incoming.map(|s| s.audio_candidate(&self.thresholds));

        let video_outcome = run_cascade(
            CascadeInput {
                take_segment,
                active: video_candidate_active,
                incoming: video_candidate_incoming,
            },
            cadence_advance,
        )?;
        let audio_outcome = run_cascade(
            CascadeInput {
                take_segment,
                active: audio_candidate_active,
                incoming: audio_candidate_incoming,
            },
            cadence_advance,
        )?;

        let video_frame = if video_outcome.authority_commits_to_incoming {
            incoming.and_then(|s| s.video.try_pop()).map(|e| e.frame)
        } else if matches!(video_outcome.branch, SwapBranch::NormalPop) {
            active.video.try_pop().map(|e| e.frame)
        } else {
            None
        };

        let audio_frame = if audio_outcome.authority_commits_to_incoming {
            incoming.and_then(|s| s.audio.try_pop()).map(|e| e.frame)
        } else if matches!(audio_outcome.branch, SwapBranch::NormalPop) {
            active.audio.try_pop().map(|e| e.frame)
        } else {
            None
        };

        let actual = self.clock.now_mono_ns();
        let period = self.grid.deadline(self.tick + 1) - self.grid.deadline(self.tick);
        let lateness = if actual > deadline + period {
            Some(LatenessEvent {
                tick: self.tick,
                deadline_mono_ns: deadline,
                actual_mono_ns: actual,
            })
        } else {
            None
        };

        if let Some(spool) = &self.evidence {
            let _ = spool.append(
                "tick",
                serde_json::json!({
                    "tick": self.tick,
                    "video_branch": format!("{:?}", video_outcome.branch),
                    "audio_branch": format!("{:?}", audio_outcome.branch),
                }),
                self.clock.now_utc_us(),
            );
        }

        let result = TickResult {
            tick: self.tick,
            video_branch: video_outcome.branch,
            audio_branch: audio_outcome.branch,
            video_commits_to_incoming: video_outcome.authority_commits_to_incoming,
            audio_commits_to_incoming: audio_outcome.authority_commits_to_incoming,
            video_frame,
            audio_frame,
            lateness,
        };

        self.tick += 1;

        Ok(result)
    }

    pub fn route(&mut self, result: &TickResult) -> Result<()> {
        if let Some(frame) = &result.video_frame {
            self.sink.route_video(frame)?;
        }
        if let Some(frame) = &result.audio_frame {
            self.sink.route_audio(frame)?;
        }
        Ok(())
    }
}

impl From<VacuumViolation> for PlayoutError {
    fn from(_: VacuumViolation) -> Self {
        PlayoutError::InvariantViolation {
            tag: "INV-AUTHORITY-ATOMIC-FRAME-TRANSFER",
            detail: "frame-authority vacuum with no seam-ready successor".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::session::{AudioFormat, ProgramFormat, SampleFormat, VideoFormat};
    use crate::tick::FrameRate;

    fn sample_session() -> Session {
        Session::new(
            ProgramFormat {
                video: VideoFormat {
                    width: 4,
                    height: 4,
                    frame_rate: FrameRate::new(30, 1),
                },
                audio: AudioFormat {
                    sample_rate: 48000,
                    channels: 2,
                    sample_format: SampleFormat::S16,
                },
            },
            0,
            0,
        )
    }

    fn push_video(buf: &RingBuffer<VideoFrame>, origin: Uuid, n: usize) {
        for i in 0..n {
            buf.try_push(
                VideoFrame {
                    pts_us: i as i64,
                    duration_us: 33_333,
                    width: 4,
                    height: 4,
                    data: Arc::new(vec![0u8; 24]),
                },
                origin,
            );
        }
    }

    fn push_audio(buf: &RingBuffer<AudioFrame>, origin: Uuid, n: usize) {
        for i in 0..n {
            buf.try_push(
                AudioFrame {
                    pts_us: i as i64,
                    nb_samples: 1600,
                    sample_rate: 48000,
                    channels: 2,
                    samples: Arc::new(vec![0i16; 3200]),
                },
                origin,
            );
        }
    }

    #[test]
    fn test_bootstrap_returns_false_once_thresholds_met() {
        let session = sample_session();
        let clock = Arc::new(TestClock::new(0));
        let manager = PipelineManager::new(session, clock, PrefeedThresholds::default());
        let active = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Content, 10);
        push_video(&active.video, active.segment_id, 2);
        push_audio(&active.audio, active.segment_id, 2);
        let gated = manager.bootstrap(&active, 500_000_000, || true);
        assert!(!gated);
    }

    #[test]
    fn test_bootstrap_times_out_when_never_satisfied() {
        let session = sample_session();
        let clock = Arc::new(TestClock::new(0));
        let manager = PipelineManager::new(session, clock.clone(), PrefeedThresholds::default());
        let active = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Content, 10);
        let mut calls = 0;
        let gated = manager.bootstrap(&active, 1000, || {
            calls += 1;
            clock.advance(2000);
            calls < 100
        });
        assert!(gated);
    }

    #[test]
    fn test_run_tick_normal_pop_advances_active() {
        let session = sample_session();
        let clock = Arc::new(TestClock::new(0));
        let mut manager = PipelineManager::new(session, clock, PrefeedThresholds::default());
        let active = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Content, 10);
        push_video(&active.video, active.segment_id, 3);
        push_audio(&active.audio, active.segment_id, 3);

        let result = manager.run_tick(&active, None, false, true).unwrap();
        assert_eq!(result.video_branch, SwapBranch::NormalPop);
        assert!(result.video_frame.is_some());
        assert_eq!(manager.current_tick(), 1);
    }

    #[test]
    fn test_run_tick_seam_commits_to_incoming() {
        let session = sample_session();
        let clock = Arc::new(TestClock::new(0));
        let mut manager = PipelineManager::new(session, clock, PrefeedThresholds::default());
        let active = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Content, 10);
        push_video(&active.video, active.segment_id, 3);
        push_audio(&active.audio, active.segment_id, 3);

        let incoming = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Content, 10);
        push_video(&incoming.video, incoming.segment_id, 3);
        push_audio(&incoming.audio, incoming.segment_id, 3);

        let result = manager.run_tick(&active, Some(&incoming), true, true).unwrap();
        assert!(result.video_commits_to_incoming);
        assert_eq!(result.video_frame.unwrap().pts_us, 0);
    }

    #[test]
    fn test_stop_flag_round_trips() {
        let session = sample_session();
        let clock = Arc::new(TestClock::new(0));
        let manager = PipelineManager::new(session, clock, PrefeedThresholds::default());
        assert!(!manager.is_stopping());
        manager.request_stop();
        assert!(manager.is_stopping());
    }
}
