//! End-to-end scenario tests.

use std::sync::Arc;

use uuid::Uuid;

use crate::clock::TestClock;
use crate::pad::PadProducer;
use crate::pipeline::{PipelineManager, PrefeedThresholds, SegmentBuffers};
use crate::session::{AudioFormat, AudioFrame, ProgramFormat, SampleFormat, Session, VideoFormat, VideoFrame};
use crate::swap::{SourceKind, SwapBranch};
use crate::tick::FrameRate;

fn session_30fps() -> Session {
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

fn video_frame(pts_us: i64) -> VideoFrame {
    VideoFrame {
        pts_us,
        duration_us: 33_333,
        width: 4,
        height: 4,
        data: Arc::new(vec![1u8; 24]),
    }
}

fn audio_frame(pts_us: i64) -> AudioFrame {
    AudioFrame {
        pts_us,
        nb_samples: 1600,
        sample_rate: 48000,
        channels: 2,
        samples: Arc::new(vec![1i16; 3200]),
    }
}

fn fill(buffers: &SegmentBuffers, n: usize) {
    for i in 0..n {
        buffers.video.try_push(video_frame(i as i64), buffers.segment_id);
        buffers.audio.try_push(audio_frame(i as i64), buffers.segment_id);
    }
}

/// Scenario 1: two content segments, no seam yet — authority stays with
/// the active segment and frames advance normally.
#[test]
fn test_two_segment_content_continuity_before_seam() {
    let clock = Arc::new(TestClock::new(0));
    let mut manager = PipelineManager::new(session_30fps(), clock, PrefeedThresholds::default());

    let mut active = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Content, 10);
    fill(&active, 5);

    for _ in 0..3 {
        let result = manager.run_tick(&mut active, None, false, true).unwrap();
        assert_eq!(result.video_branch, SwapBranch::NormalPop);
        assert!(!result.video_commits_to_incoming);
    }
}

/// Scenario 2: content -> PAD seam with stale content-B buffers in the
/// incoming queue. PAD_SEAM_OVERRIDE must fire and the emitted frame's
/// origin must be the pad segment, never the stale content.
#[test]
fn test_content_to_pad_seam_overrides_stale_incoming_content() {
    let clock = Arc::new(TestClock::new(0));
    let mut manager = PipelineManager::new(session_30fps(), clock, PrefeedThresholds::default());

    let mut active = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Content, 10);
    fill(&active, 5);

    let mut pad_incoming = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Pad, 10);
    // Pad has no pre-decoded video (produced on demand) but audio is ready.
    pad_incoming.audio.try_push(audio_frame(0), pad_incoming.segment_id);
    pad_incoming.audio.try_push(audio_frame(1), pad_incoming.segment_id);

    let result = manager
        .run_tick(&mut active, Some(&mut pad_incoming), true, true)
        .unwrap();

    assert_eq!(result.video_branch, SwapBranch::PadSeamOverride);
    assert!(result.video_commits_to_incoming);
}

/// Scenario 3: PAD -> content seam where the pad's video depth is 0 (by
/// design) and content-B has just become seam-ready. CONTENT_SEAM_OVERRIDE
/// fires and a genuine content frame is popped.
#[test]
fn test_pad_to_content_seam_pops_genuine_content_frame() {
    let clock = Arc::new(TestClock::new(0));
    let mut manager = PipelineManager::new(session_30fps(), clock, PrefeedThresholds::default());

    let mut pad_active = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Pad, 10);
    pad_active.audio.try_push(audio_frame(0), pad_active.segment_id);

    let mut content_incoming = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Content, 10);
    fill(&content_incoming, 5);

    let result = manager
        .run_tick(&mut pad_active, Some(&mut content_incoming), true, true)
        .unwrap();

    assert_eq!(result.video_branch, SwapBranch::ContentSeamOverride);
    assert_eq!(result.video_frame.unwrap().pts_us, 0);
}

/// Scenario 4: frame-authority vacuum. The active segment exhausts its
/// buffer with a seam-ready successor already available off-seam —
/// FORCE_EXECUTE must fire rather than a deferred swap.
#[test]
fn test_frame_authority_vacuum_forces_execute() {
    let clock = Arc::new(TestClock::new(0));
    let mut manager = PipelineManager::new(session_30fps(), clock, PrefeedThresholds::default());

    let mut active = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Content, 10);
    // Active buffer is empty: exhausted.

    let mut incoming = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Content, 10);
    fill(&incoming, 5);

    let result = manager
        .run_tick(&mut active, Some(&mut incoming), false, true)
        .unwrap();

    assert_eq!(result.video_branch, SwapBranch::ForceExecute);
    assert!(result.video_commits_to_incoming);
}

/// Scenario 5: a vacuum with no seam-ready successor must surface as an
/// error rather than emit an invented frame.
#[test]
fn test_vacuum_with_no_successor_halts_rather_than_invents_output() {
    let clock = Arc::new(TestClock::new(0));
    let mut manager = PipelineManager::new(session_30fps(), clock, PrefeedThresholds::default());

    let mut active = SegmentBuffers::new(Uuid::new_v4(), SourceKind::Content, 10);

    let result = manager.run_tick(&mut active, None, false, true);
    assert!(result.is_err());
}

/// Scenario 6: deterministic-vs-real-time parity for pad audio generation.
/// The pad producer's phase-continuous accumulator must yield the same
/// sample counts regardless of what clock drives the session.
#[test]
fn test_pad_audio_sample_counts_are_clock_independent() {
    let fps = FrameRate::new(30000, 1001);
    let mut pad_a = PadProducer::new(Uuid::new_v4(), 4, 4, 48000, 2, fps);
    let mut pad_b = PadProducer::new(Uuid::new_v4(), 4, 4, 48000, 2, fps);

    let counts_a: Vec<usize> = (0..10).map(|i| pad_a.next_audio_frame(i).nb_samples).collect();
    let counts_b: Vec<usize> = (0..10).map(|i| pad_b.next_audio_frame(i).nb_samples).collect();

    assert_eq!(counts_a, counts_b);
}
