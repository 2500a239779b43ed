//! Control-plane HTTP handlers.
//!
//! Each command handler builds a `oneshot` reply channel, wraps it in the
//! matching `ChannelCommand` variant, sends it to the channel's tick loop
//! over `ChannelHandle::send_command`, and awaits the `CommandOutcome`.
//! The tick loop itself never touches axum types.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use playout_core::session::{Block, ProgramFormat};

use crate::channel::{self, ChannelCommand, CommandOutcome};
use crate::error::{Result, ServerError};
use crate::state::AppState;

async fn await_outcome(rx: oneshot::Receiver<CommandOutcome>) -> Result<CommandOutcome> {
    rx.await
        .map_err(|_| ServerError::Internal("channel loop dropped the command reply".into()))
}

fn outcome_response(outcome: CommandOutcome) -> Response {
    let status = if outcome.success { StatusCode::OK } else { StatusCode::BAD_REQUEST };
    (status, Json(serde_json::json!({ "success": outcome.success, "message": outcome.message }))).into_response()
}

fn get_channel_or_404(state: &AppState, channel_id: &str) -> Result<Arc<crate::state::ChannelHandle>> {
    state
        .get_channel(channel_id)
        .ok_or_else(|| ServerError::ChannelNotFound(channel_id.to_string()))
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Version information endpoint
pub async fn version_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "online",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct StartChannelRequest {
    pub channel_id: String,
    pub program_format: ProgramFormat,
    pub port: Option<u16>,
    pub uds_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChannelInfo {
    pub channel_id: String,
    pub control_state: String,
    pub started_at_utc_us: i64,
}

fn control_state_label(state: playout_core::control::ControlState) -> &'static str {
    use playout_core::control::ControlState;
    match state {
        ControlState::Idle => "idle",
        ControlState::Buffering => "buffering",
        ControlState::Ready => "ready",
        ControlState::Playing => "playing",
        ControlState::Paused => "paused",
        ControlState::Error => "error",
    }
}

/// POST /channels — start a new channel.
pub async fn start_channel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartChannelRequest>,
) -> Result<Response> {
    if state.get_channel(&req.channel_id).is_some() {
        return Err(ServerError::ChannelAlreadyRunning(req.channel_id));
    }
    if state.at_capacity() {
        return Err(ServerError::Config("server is at its concurrent channel limit".into()));
    }

    let handle = channel::spawn(req.channel_id.clone(), req.program_format, &state.config, state.metrics.clone()).await?;
    state.register_channel(handle.clone());

    if req.port.is_some() || req.uds_path.is_some() {
        let (tx, rx) = oneshot::channel();
        handle
            .send_command(ChannelCommand::AttachSink { port: req.port, uds_path: req.uds_path, respond_to: tx })
            .map_err(ServerError::Internal)?;
        let _ = await_outcome(rx).await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(ChannelInfo {
            channel_id: handle.channel_id.clone(),
            control_state: control_state_label(handle.control.read().state()),
            started_at_utc_us: handle.started_at_utc_us,
        }),
    )
        .into_response())
}

/// DELETE /channels/{channel_id} — stop a running channel.
pub async fn stop_channel(State(state): State<Arc<AppState>>, Path(channel_id): Path<String>) -> Result<Response> {
    let handle = get_channel_or_404(&state, &channel_id)?;
    let (tx, rx) = oneshot::channel();
    handle.send_command(ChannelCommand::Stop(tx)).map_err(ServerError::Internal)?;
    let outcome = await_outcome(rx).await?;
    Ok(outcome_response(outcome))
}

/// GET /channels/{channel_id}
pub async fn get_channel(State(state): State<Arc<AppState>>, Path(channel_id): Path<String>) -> Result<Json<ChannelInfo>> {
    let handle = get_channel_or_404(&state, &channel_id)?;
    Ok(Json(ChannelInfo {
        channel_id: handle.channel_id.clone(),
        control_state: control_state_label(handle.control.read().state()),
        started_at_utc_us: handle.started_at_utc_us,
    }))
}

#[derive(Serialize)]
pub struct ChannelListResponse {
    pub count: usize,
    pub channels: Vec<ChannelInfo>,
}

/// GET /channels
pub async fn list_channels(State(state): State<Arc<AppState>>) -> Json<ChannelListResponse> {
    let channels: Vec<ChannelInfo> = state
        .channels
        .iter()
        .map(|r| ChannelInfo {
            channel_id: r.value().channel_id.clone(),
            control_state: control_state_label(r.value().control.read().state()),
            started_at_utc_us: r.value().started_at_utc_us,
        })
        .collect();
    Json(ChannelListResponse { count: channels.len(), channels })
}

/// POST /channels/{channel_id}/blocks — feed a block of segments.
pub async fn feed_block(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    Json(block): Json<Block>,
) -> Result<Response> {
    let handle = get_channel_or_404(&state, &channel_id)?;
    let (tx, rx) = oneshot::channel();
    handle
        .send_command(ChannelCommand::FeedBlock(block, tx))
        .map_err(ServerError::Internal)?;
    let outcome = await_outcome(rx).await?;
    Ok(outcome_response(outcome))
}

#[derive(Debug, Deserialize)]
pub struct LoadPreviewRequest {
    pub asset_uri: String,
    pub start_offset_ms: i64,
    pub hard_stop_time_ms: Option<i64>,
}

/// POST /channels/{channel_id}/preview
pub async fn load_preview(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    Json(req): Json<LoadPreviewRequest>,
) -> Result<Response> {
    let handle = get_channel_or_404(&state, &channel_id)?;
    let (tx, rx) = oneshot::channel();
    handle
        .send_command(ChannelCommand::LoadPreview {
            asset_uri: req.asset_uri,
            start_offset_ms: req.start_offset_ms,
            hard_stop_time_ms: req.hard_stop_time_ms,
            respond_to: tx,
        })
        .map_err(ServerError::Internal)?;
    let outcome = await_outcome(rx).await?;
    Ok(outcome_response(outcome))
}

/// POST /channels/{channel_id}/switch_to_live
///
/// The boundary time carried in the request body is recorded for audit
/// purposes; the cut itself always targets the next seam-ready tick, since
/// the tick loop owns the only authoritative seam clock.
#[derive(Debug, Deserialize, Default)]
pub struct SwitchToLiveRequest {
    pub target_boundary_time_ms: Option<i64>,
}

pub async fn switch_to_live(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    body: Option<Json<SwitchToLiveRequest>>,
) -> Result<Response> {
    let handle = get_channel_or_404(&state, &channel_id)?;
    let _ = body.unwrap_or_default();
    let (tx, rx) = oneshot::channel();
    handle
        .send_command(ChannelCommand::SwitchToLive(tx))
        .map_err(ServerError::Internal)?;
    let outcome = await_outcome(rx).await?;
    Ok(outcome_response(outcome))
}

#[derive(Debug, Deserialize, Default)]
pub struct AttachSinkRequest {
    pub port: Option<u16>,
    pub uds_path: Option<String>,
}

/// POST /channels/{channel_id}/sink
pub async fn attach_output_sink(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    Json(req): Json<AttachSinkRequest>,
) -> Result<Response> {
    let handle = get_channel_or_404(&state, &channel_id)?;
    let (tx, rx) = oneshot::channel();
    handle
        .send_command(ChannelCommand::AttachSink { port: req.port, uds_path: req.uds_path, respond_to: tx })
        .map_err(ServerError::Internal)?;
    let outcome = await_outcome(rx).await?;
    Ok(outcome_response(outcome))
}

#[derive(Debug, Deserialize, Default)]
pub struct DetachSinkRequest {
    #[serde(default)]
    pub force: bool,
}

/// DELETE /channels/{channel_id}/sink
pub async fn detach_output_sink(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    body: Option<Json<DetachSinkRequest>>,
) -> Result<Response> {
    let handle = get_channel_or_404(&state, &channel_id)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let (tx, rx) = oneshot::channel();
    handle
        .send_command(ChannelCommand::DetachSink { force: req.force, respond_to: tx })
        .map_err(ServerError::Internal)?;
    let outcome = await_outcome(rx).await?;
    Ok(outcome_response(outcome))
}
