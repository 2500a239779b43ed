//! Playout control state machine.
//!
//! Gates the external commands the surrounding service can issue
//! (`begin_session`, `stop`, `pause`, `load_preview`, `switch_to_live`)
//! against the session's current external-facing state. This state machine
//! never participates in frame-authority decisions — that discipline lives
//! entirely in [`crate::swap`].

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Idle,
    Buffering,
    Ready,
    Playing,
    Paused,
    Error,
}

/// Readiness failure returned by `switch_to_live` when the preview buffer
/// is short on one side. No state change occurs when this is returned —
/// the caller is expected to declare readiness itself rather than poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error("preview video buffer not ready")]
    NotReadyVideo,
    #[error("preview audio buffer not ready")]
    NotReadyAudio,
    #[error("switch_to_live is not valid from the current control state")]
    InvalidState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("command not valid in state {state:?}")]
pub struct CommandError {
    pub state: ControlState,
}

/// Declared buffer readiness, supplied by the caller (or the scheduler that
/// issued the command) rather than polled by the state machine itself.
#[derive(Debug, Clone, Copy)]
pub struct PreviewReadiness {
    pub video_ready: bool,
    pub audio_ready: bool,
}

pub struct ControlFsm {
    state: ControlState,
}

impl Default for ControlFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFsm {
    pub fn new() -> Self {
        Self {
            state: ControlState::Idle,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn begin_session(&mut self) -> Result<(), CommandError> {
        if self.state != ControlState::Idle {
            return Err(CommandError { state: self.state });
        }
        self.state = ControlState::Buffering;
        Ok(())
    }

    /// Called once bootstrap preroll has satisfied `MIN_V`/`MIN_A`.
    pub fn mark_ready(&mut self) -> Result<(), CommandError> {
        if self.state != ControlState::Buffering {
            return Err(CommandError { state: self.state });
        }
        self.state = ControlState::Ready;
        Ok(())
    }

    pub fn play(&mut self) -> Result<(), CommandError> {
        if !matches!(self.state, ControlState::Ready | ControlState::Paused) {
            return Err(CommandError { state: self.state });
        }
        self.state = ControlState::Playing;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), CommandError> {
        if self.state != ControlState::Playing {
            return Err(CommandError { state: self.state });
        }
        self.state = ControlState::Paused;
        Ok(())
    }

    /// Stop is valid from any state and is idempotent: stopping an already
    /// idle session is a no-op success, not an error, matching the spool's
    /// idempotence expectations for repeated teardown commands.
    pub fn stop(&mut self) {
        self.state = ControlState::Idle;
    }

    pub fn mark_error(&mut self) {
        self.state = ControlState::Error;
    }

    /// `load_preview` is only meaningful once a session is accepting
    /// commands (not `Idle`, not `Error`).
    pub fn load_preview(&self) -> Result<(), CommandError> {
        if matches!(self.state, ControlState::Idle | ControlState::Error) {
            return Err(CommandError { state: self.state });
        }
        Ok(())
    }

    /// Attempt to cut the preview buffer onto the live output. Requires
    /// both video and audio readiness; if either is short, returns the
    /// corresponding `NOT_READY_*` error and makes no state change. PTS
    /// continuity across the cut is not recomputed here — it is owned by
    /// the tick grid, which never resets.
    pub fn switch_to_live(&mut self, readiness: PreviewReadiness) -> Result<(), SwitchError> {
        if !matches!(self.state, ControlState::Playing | ControlState::Ready) {
            return Err(SwitchError::InvalidState);
        }
        if !readiness.video_ready {
            return Err(SwitchError::NotReadyVideo);
        }
        if !readiness.audio_ready {
            return Err(SwitchError::NotReadyAudio);
        }
        self.state = ControlState::Playing;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_idle_to_playing() {
        let mut fsm = ControlFsm::new();
        fsm.begin_session().unwrap();
        assert_eq!(fsm.state(), ControlState::Buffering);
        fsm.mark_ready().unwrap();
        fsm.play().unwrap();
        assert_eq!(fsm.state(), ControlState::Playing);
    }

    #[test]
    fn test_pause_then_resume() {
        let mut fsm = ControlFsm::new();
        fsm.begin_session().unwrap();
        fsm.mark_ready().unwrap();
        fsm.play().unwrap();
        fsm.pause().unwrap();
        assert_eq!(fsm.state(), ControlState::Paused);
        fsm.play().unwrap();
        assert_eq!(fsm.state(), ControlState::Playing);
    }

    #[test]
    fn test_begin_session_from_non_idle_is_rejected() {
        let mut fsm = ControlFsm::new();
        fsm.begin_session().unwrap();
        assert!(fsm.begin_session().is_err());
    }

    #[test]
    fn test_stop_is_idempotent_from_any_state() {
        let mut fsm = ControlFsm::new();
        fsm.stop();
        assert_eq!(fsm.state(), ControlState::Idle);
        fsm.begin_session().unwrap();
        fsm.stop();
        assert_eq!(fsm.state(), ControlState::Idle);
        fsm.stop();
        assert_eq!(fsm.state(), ControlState::Idle);
    }

    #[test]
    fn test_switch_to_live_requires_both_buffers_ready() {
        let mut fsm = ControlFsm::new();
        fsm.begin_session().unwrap();
        fsm.mark_ready().unwrap();
        fsm.play().unwrap();

        let err = fsm
            .switch_to_live(PreviewReadiness {
                video_ready: false,
                audio_ready: true,
            })
            .unwrap_err();
        assert_eq!(err, SwitchError::NotReadyVideo);
        assert_eq!(fsm.state(), ControlState::Playing);

        let err = fsm
            .switch_to_live(PreviewReadiness {
                video_ready: true,
                audio_ready: false,
            })
            .unwrap_err();
        assert_eq!(err, SwitchError::NotReadyAudio);

        fsm.switch_to_live(PreviewReadiness {
            video_ready: true,
            audio_ready: true,
        })
        .unwrap();
        assert_eq!(fsm.state(), ControlState::Playing);
    }
}
