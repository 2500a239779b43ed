//! The background channel runner: one tick loop per running channel,
//! driven on a dedicated OS thread (wrapped in `tokio::task::spawn_blocking`
//! so the async control plane can join it without blocking its own
//! executor).
//!
//! A channel owns an `active` segment and at most one `incoming` segment
//! staged ahead of it. Content segments feed their ring buffers from a
//! separate thread running `Producer::pump_once`; pad segments have no
//! feeder and are synthesized directly by the tick loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

use playout_core::clock::{Clock, RealClock};
use playout_core::control::PreviewReadiness;
use playout_core::evidence::EvidenceSpool;
use playout_core::pad::PadProducer;
use playout_core::pipeline::{PipelineManager, PrefeedThresholds, SegmentBuffers, TickResult};
use playout_core::producer::{Producer, PumpMode, PumpOutcome};
use playout_core::renderer::{RenderDecision, Renderer};
use playout_core::session::{AudioFrame, Block, ProgramFormat, Segment, SegmentType, Session, Transition, VideoFrame};
use playout_core::sink::Sink;
use playout_core::swap::{SourceKind, SwapBranch};
use playout_core::tick::TickGrid;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::metrics::Metrics;
use crate::net_sink::NetSink;
use crate::state::ChannelHandle;

/// Outcome reported back to the HTTP handler that issued a [`ChannelCommand`].
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
}

impl CommandOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// A command sent from the control plane to a running channel's background
/// loop. Each carries a responder so the issuing HTTP handler can report
/// success/failure back to the caller.
pub enum ChannelCommand {
    FeedBlock(Block, oneshot::Sender<CommandOutcome>),
    LoadPreview {
        asset_uri: String,
        start_offset_ms: i64,
        hard_stop_time_ms: Option<i64>,
        respond_to: oneshot::Sender<CommandOutcome>,
    },
    SwitchToLive(oneshot::Sender<CommandOutcome>),
    AttachSink {
        port: Option<u16>,
        uds_path: Option<String>,
        respond_to: oneshot::Sender<CommandOutcome>,
    },
    DetachSink {
        force: bool,
        respond_to: oneshot::Sender<CommandOutcome>,
    },
    Stop(oneshot::Sender<CommandOutcome>),
}

/// One segment currently staged in the engine, with its synthesis source:
/// either a feeder thread pumping a decoded asset, or an on-demand pad
/// producer owned solely by the tick loop.
struct RunningSegment {
    segment: Segment,
    buffers: Arc<SegmentBuffers>,
    pad: Option<PadProducer>,
    feeder: Option<std::thread::JoinHandle<()>>,
    seg_stop: Arc<AtomicBool>,
}

impl RunningSegment {
    fn start(segment: Segment, session: &Session, capacity: usize) -> Result<Self> {
        let seg_stop = Arc::new(AtomicBool::new(false));

        if segment.is_pad() {
            let pad = PadProducer::new(
                segment.segment_id,
                session.format.video.width,
                session.format.video.height,
                session.format.audio.sample_rate,
                session.format.audio.channels,
                session.fps(),
            );
            let buffers = Arc::new(SegmentBuffers::new(segment.segment_id, SourceKind::Pad, 1));
            return Ok(Self {
                segment,
                buffers,
                pad: Some(pad),
                feeder: None,
                seg_stop,
            });
        }

        let mut producer = Producer::open(
            &segment.asset_uri,
            segment.segment_id,
            session.format.video.width,
            session.format.video.height,
            session.format.audio.sample_rate,
        )
        .map_err(ServerError::Engine)?;
        if segment.asset_start_offset_ms > 0 {
            producer
                .seek_precise_to_ms(segment.asset_start_offset_ms)
                .map_err(ServerError::Engine)?;
        }

        let buffers = Arc::new(SegmentBuffers::new(segment.segment_id, SourceKind::Content, capacity));
        let feeder_buffers = buffers.clone();
        let feeder_stop = seg_stop.clone();
        let feeder = std::thread::spawn(move || run_feeder(producer, feeder_buffers, feeder_stop));

        Ok(Self {
            segment,
            buffers,
            pad: None,
            feeder: Some(feeder),
            seg_stop,
        })
    }

    fn kind(&self) -> SourceKind {
        if self.pad.is_some() {
            SourceKind::Pad
        } else {
            SourceKind::Content
        }
    }

    /// Tear down without blocking the caller. Per the detached-cleanup
    /// pattern for old-producer teardown on a seam or switch: the feeder
    /// thread is signaled and joined from a throwaway thread instead of
    /// here, so discarding a segment never stalls the tick loop on a
    /// decoder join.
    fn discard(mut self) {
        self.seg_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.feeder.take() {
            std::thread::spawn(move || {
                let _ = handle.join();
            });
        }
    }
}

fn run_feeder(mut producer: Producer, buffers: Arc<SegmentBuffers>, seg_stop: Arc<AtomicBool>) {
    loop {
        if seg_stop.load(Ordering::SeqCst) {
            return;
        }
        // Switch to audio-only draining while the video ring is full rather
        // than reading (and silently discarding) the next video packet.
        let mode = if buffers.video.size() >= buffers.video.capacity() {
            PumpMode::AudioOnly
        } else {
            PumpMode::Normal
        };
        match producer.pump_once(mode, &buffers.video, &buffers.audio) {
            Ok(PumpOutcome::Progress) => {}
            Ok(PumpOutcome::Backpressured) => std::thread::sleep(Duration::from_millis(2)),
            Ok(PumpOutcome::Eof) => return,
            Err(err) => {
                tracing::warn!(error = %err, "producer feeder stopped on decode error");
                return;
            }
        }
    }
}

fn now_utc_us() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

fn boot_pad_segment() -> Segment {
    Segment {
        segment_id: Uuid::new_v4(),
        segment_index: 0,
        asset_uri: String::new(),
        asset_start_offset_ms: 0,
        segment_duration_ms: 0,
        segment_type: SegmentType::Pad,
        transition_in: Transition::None,
        transition_out: Transition::None,
    }
}

/// Spawn the background loop for a new channel and return its handle. The
/// handle carries the command sender internally (`ChannelHandle::send_command`)
/// so the caller only needs to register it with `AppState`.
pub async fn spawn(
    channel_id: String,
    program_format: ProgramFormat,
    server_config: &ServerConfig,
    metrics: Arc<Metrics>,
) -> Result<Arc<ChannelHandle>> {
    std::fs::create_dir_all(&server_config.evidence.spool_dir)?;
    let spool_path = std::path::Path::new(&server_config.evidence.spool_dir).join(format!("{}.ndjson", channel_id));

    let clock = Arc::new(RealClock::new());
    let epoch_utc_us = clock.now_utc_us();
    let epoch_mono_ns = clock.now_mono_ns();
    clock.set_session_epoch(epoch_utc_us, epoch_mono_ns);

    let session = Session::new(program_format, epoch_utc_us, epoch_mono_ns);

    let evidence = Arc::new(
        EvidenceSpool::open(&spool_path, session.session_id, channel_id.clone(), server_config.evidence.byte_cap)
            .map_err(ServerError::Engine)?,
    );

    let stop_flag = Arc::new(AtomicBool::new(false));
    let handle = Arc::new(ChannelHandle::new(
        channel_id.clone(),
        evidence.clone(),
        stop_flag.clone(),
        epoch_utc_us,
    ));

    let thresholds = PrefeedThresholds {
        min_video: server_config.pipeline.min_video_prefeed,
        min_audio: server_config.pipeline.min_audio_prefeed,
    };
    let mut manager = PipelineManager::new(session, clock, thresholds);
    manager.attach_evidence(evidence);

    let renderer = Renderer::new(server_config.renderer.freeze_window_us, server_config.renderer.equilibrium_target);
    let capacity = server_config.pipeline.ring_buffer_capacity;
    let gate_timeout_ns = server_config.pipeline.bootstrap_gate_timeout_ms * 1_000_000;

    let (tx, rx) = mpsc::channel::<ChannelCommand>();
    handle.set_cmd_tx(tx);

    let handle_for_thread = handle.clone();
    let metrics_for_thread = metrics;
    let task = tokio::task::spawn_blocking(move || {
        run_loop(manager, renderer, capacity, gate_timeout_ns, rx, handle_for_thread, metrics_for_thread);
    });
    handle.set_task(task);

    {
        let mut control = handle.control.write();
        let _ = control.begin_session();
    }

    Ok(handle)
}

fn run_loop(
    mut manager: PipelineManager<RealClock>,
    mut renderer: Renderer,
    capacity: usize,
    gate_timeout_ns: i64,
    cmd_rx: mpsc::Receiver<ChannelCommand>,
    handle: Arc<ChannelHandle>,
    metrics: Arc<Metrics>,
) {
    let session = *manager.session();
    let grid = TickGrid::new(session.fps(), session.epoch_mono_ns);

    let mut active = match RunningSegment::start(boot_pad_segment(), &session, capacity) {
        Ok(r) => r,
        Err(err) => {
            tracing::error!(channel_id = %handle.channel_id, error = %err, "failed to start boot pad segment");
            handle.control.write().mark_error();
            return;
        }
    };
    let mut incoming: Option<RunningSegment> = None;
    let mut preview: Option<RunningSegment> = None;
    let mut pending: VecDeque<Segment> = VecDeque::new();
    let mut seam_tick: i64 = 0;
    let mut force_take_segment = false;
    let mut fallback_pad = PadProducer::new(
        Uuid::new_v4(),
        session.format.video.width,
        session.format.video.height,
        session.format.audio.sample_rate,
        session.format.audio.channels,
        session.fps(),
    );

    let stop_flag = handle.stop_flag.clone();
    let gated = manager.bootstrap(&active.buffers, gate_timeout_ns, || !stop_flag.load(Ordering::SeqCst));
    if gated {
        tracing::debug!(channel_id = %handle.channel_id, "bootstrap gated on timeout, emitting pad until ready");
    }
    let _ = handle.control.write().mark_ready();
    let _ = handle.control.write().play();

    loop {
        if handle.is_stopping() {
            break;
        }

        while let Ok(cmd) = cmd_rx.try_recv() {
            handle_command(
                cmd,
                &session,
                capacity,
                &mut pending,
                &mut incoming,
                &mut preview,
                &mut force_take_segment,
                &handle,
                &mut manager,
            );
        }

        if incoming.is_none() {
            if let Some(next) = pending.pop_front() {
                match RunningSegment::start(next, &session, capacity) {
                    Ok(r) => incoming = Some(r),
                    Err(err) => {
                        tracing::warn!(channel_id = %handle.channel_id, error = %err, "failed to prime staged segment");
                    }
                }
            }
        }

        let take_segment = force_take_segment || (incoming.is_some() && manager.current_tick() >= seam_tick);

        let result = match manager.run_tick(
            &active.buffers,
            incoming.as_ref().map(|s| s.buffers.as_ref()),
            take_segment,
            true,
        ) {
            Ok(r) => r,
            Err(violation) => {
                tracing::error!(channel_id = %handle.channel_id, error = %violation, "frame authority vacuum");
                let _ = handle.evidence.append(
                    "vacuum_violation",
                    serde_json::json!({ "tick": manager.current_tick() }),
                    now_utc_us(),
                );
                metrics.record_error("vacuum_violation");
                handle.control.write().mark_error();
                break;
            }
        };

        metrics.record_tick(result.video_branch, result.audio_branch);
        if result.lateness.is_some() {
            metrics.record_lateness();
        }

        let pts_us = grid.ct_ms(result.tick) * 1000;
        let duration_us = (grid.deadline(result.tick + 1) - grid.deadline(result.tick)) / 1000;

        let video_frame = resolve_video_frame(&result, &active, incoming.as_ref(), &fallback_pad, &mut renderer, pts_us, duration_us);
        let audio_frame = resolve_audio_frame(&result, &mut active, incoming.as_mut(), &mut fallback_pad, pts_us);

        if let Some(frame) = &video_frame {
            if let Err(err) = manager.sink_mut().route_video(frame) {
                tracing::trace!(channel_id = %handle.channel_id, error = %err, "video route skipped");
            }
        }
        if let Some(frame) = &audio_frame {
            if let Err(err) = manager.sink_mut().route_audio(frame) {
                tracing::trace!(channel_id = %handle.channel_id, error = %err, "audio route skipped");
            }
        }

        if result.video_commits_to_incoming || result.audio_commits_to_incoming {
            if let Some(new_active) = incoming.take() {
                let old_active = std::mem::replace(&mut active, new_active);
                old_active.discard();
                seam_tick = grid.seam_tick(result.tick, active.segment.segment_duration_ms);
                force_take_segment = false;
            }
        }
    }

    active.discard();
    if let Some(s) = incoming.take() {
        s.discard();
    }
    if let Some(s) = preview.take() {
        s.discard();
    }
    handle.control.write().stop();
    tracing::info!(channel_id = %handle.channel_id, "channel loop exited");
}

fn resolve_video_frame(
    result: &TickResult,
    active: &RunningSegment,
    incoming: Option<&RunningSegment>,
    fallback_pad: &PadProducer,
    renderer: &mut Renderer,
    pts_us: i64,
    duration_us: i64,
) -> Option<VideoFrame> {
    match result.video_branch {
        SwapBranch::PadSeamOverride => {
            let pad = incoming.and_then(|s| s.pad.as_ref()).unwrap_or(fallback_pad);
            Some(pad.next_video_frame(pts_us, duration_us))
        }
        SwapBranch::PadFallback => {
            let pad = active.pad.as_ref().unwrap_or(fallback_pad);
            Some(pad.next_video_frame(pts_us, duration_us))
        }
        _ => {
            let is_known_empty = active.kind() == SourceKind::Pad;
            match renderer.decide(result.video_frame.is_some(), is_known_empty, pts_us) {
                RenderDecision::Emit => {
                    let frame = result.video_frame.as_ref().map(|f| VideoFrame {
                        pts_us,
                        duration_us,
                        ..f.clone()
                    });
                    if let Some(f) = &frame {
                        renderer.record_real_frame(f.clone());
                    }
                    frame
                }
                RenderDecision::Freeze => renderer.last_real_frame().cloned(),
                RenderDecision::PadFallback => Some(fallback_pad.next_video_frame(pts_us, duration_us)),
            }
        }
    }
}

fn resolve_audio_frame(
    result: &TickResult,
    active: &mut RunningSegment,
    incoming: Option<&mut RunningSegment>,
    fallback_pad: &mut PadProducer,
    pts_us: i64,
) -> Option<AudioFrame> {
    match result.audio_branch {
        SwapBranch::PadSeamOverride => {
            if let Some(pad) = incoming.and_then(|s| s.pad.as_mut()) {
                return Some(pad.next_audio_frame(pts_us));
            }
            Some(fallback_pad.next_audio_frame(pts_us))
        }
        SwapBranch::PadFallback => {
            if let Some(pad) = active.pad.as_mut() {
                Some(pad.next_audio_frame(pts_us))
            } else {
                Some(fallback_pad.next_audio_frame(pts_us))
            }
        }
        _ => {
            if let Some(f) = &result.audio_frame {
                Some(AudioFrame {
                    pts_us,
                    ..f.clone()
                })
            } else {
                Some(fallback_pad.next_audio_frame(pts_us))
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_command(
    cmd: ChannelCommand,
    session: &Session,
    capacity: usize,
    pending: &mut VecDeque<Segment>,
    incoming: &mut Option<RunningSegment>,
    preview: &mut Option<RunningSegment>,
    force_take_segment: &mut bool,
    handle: &Arc<ChannelHandle>,
    manager: &mut PipelineManager<RealClock>,
) {
    match cmd {
        ChannelCommand::FeedBlock(block, respond_to) => {
            let declared = block.declared_duration_ms();
            let actual = block.end_utc_ms - block.start_utc_ms;
            if declared != actual {
                let _ = respond_to.send(CommandOutcome::err(format!(
                    "declared segment durations ({} ms) do not match block span ({} ms)",
                    declared, actual
                )));
                return;
            }
            let _ = handle.evidence.append(
                "feed_block",
                serde_json::json!({ "block_id": block.block_id, "segments": block.segments.len() }),
                now_utc_us(),
            );
            pending.extend(block.segments);
            let _ = respond_to.send(CommandOutcome::ok("block admitted"));
        }
        ChannelCommand::LoadPreview {
            asset_uri,
            start_offset_ms,
            hard_stop_time_ms,
            respond_to,
        } => {
            if let Err(err) = handle.control.read().load_preview() {
                let _ = respond_to.send(CommandOutcome::err(err.to_string()));
                return;
            }
            let segment = Segment {
                segment_id: Uuid::new_v4(),
                segment_index: 0,
                asset_uri,
                asset_start_offset_ms: start_offset_ms,
                segment_duration_ms: hard_stop_time_ms.unwrap_or(i64::MAX / 2),
                segment_type: SegmentType::Content,
                transition_in: Transition::None,
                transition_out: Transition::None,
            };
            match RunningSegment::start(segment, session, capacity) {
                Ok(running) => {
                    if let Some(old) = preview.replace(running) {
                        old.discard();
                    }
                    let _ = respond_to.send(CommandOutcome::ok("preview loading"));
                }
                Err(err) => {
                    let _ = respond_to.send(CommandOutcome::err(err.to_string()));
                }
            }
        }
        ChannelCommand::SwitchToLive(respond_to) => {
            let Some(p) = preview.take() else {
                let _ = respond_to.send(CommandOutcome::err("no preview loaded".to_string()));
                return;
            };
            let readiness = PreviewReadiness {
                video_ready: p.buffers.video.size() >= 1,
                audio_ready: p.buffers.audio.size() >= 1,
            };
            match handle.control.write().switch_to_live(readiness) {
                Ok(()) => {
                    if let Some(old_incoming) = incoming.replace(p) {
                        old_incoming.discard();
                    }
                    *force_take_segment = true;
                    let _ = handle
                        .evidence
                        .append("switch_to_live", serde_json::json!({ "accepted": true }), now_utc_us());
                    let _ = respond_to.send(CommandOutcome::ok("switched to live"));
                }
                Err(err) => {
                    preview.replace(p);
                    let _ = respond_to.send(CommandOutcome::err(err.to_string()));
                }
            }
        }
        ChannelCommand::AttachSink {
            port,
            uds_path,
            respond_to,
        } => {
            let sink_result: Result<Box<dyn Sink>> = if let Some(path) = uds_path {
                #[cfg(unix)]
                {
                    NetSink::connect_uds(&path)
                        .map(|s| Box::new(s) as Box<dyn Sink>)
                        .map_err(ServerError::Engine)
                }
                #[cfg(not(unix))]
                {
                    let _ = path;
                    Err(ServerError::Config("unix domain sockets unsupported on this platform".into()))
                }
            } else if let Some(port) = port {
                NetSink::connect_tcp(&format!("127.0.0.1:{}", port))
                    .map(|s| Box::new(s) as Box<dyn Sink>)
                    .map_err(ServerError::Engine)
            } else {
                Err(ServerError::Config("attach_output_sink requires port or uds_path".into()))
            };

            match sink_result {
                Ok(sink) => match manager.sink_mut().attach(sink) {
                    Ok(()) => {
                        let _ = respond_to.send(CommandOutcome::ok("sink attached"));
                    }
                    Err(err) => {
                        let _ = respond_to.send(CommandOutcome::err(err.to_string()));
                    }
                },
                Err(err) => {
                    let _ = respond_to.send(CommandOutcome::err(err.to_string()));
                }
            }
        }
        ChannelCommand::DetachSink { force, respond_to } => match manager.sink_mut().detach(force) {
            Ok(()) => {
                let _ = respond_to.send(CommandOutcome::ok("sink detached"));
            }
            Err(err) => {
                let _ = respond_to.send(CommandOutcome::err(err.to_string()));
            }
        },
        ChannelCommand::Stop(respond_to) => {
            handle.request_stop();
            let _ = respond_to.send(CommandOutcome::ok("stopping"));
        }
    }
}
