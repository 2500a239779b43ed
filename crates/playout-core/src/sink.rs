//! Pluggable output sink.
//!
//! The sink is attach/detach capable, but its attach/detach state machine
//! is owned by the engine (the renderer), not by the sink implementation
//! itself — a sink that tracks its own state independently could disagree
//! with the engine about whether it is currently attached.

use crate::error::{PlayoutError, Result};
use crate::session::{AudioFrame, VideoFrame};

/// A consumer of routed frames: typically an encoder/muxer, out of scope
/// here beyond this frame-delivery contract.
pub trait Sink: Send {
    fn on_video_frame(&mut self, frame: &VideoFrame) -> Result<()>;
    fn on_audio_frame(&mut self, frame: &AudioFrame) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Detached,
    Attached,
}

/// Owns the attach/detach state machine for one sink slot. The renderer
/// holds this, never the sink implementation.
pub struct SinkSlot {
    state: SinkState,
    sink: Option<Box<dyn Sink>>,
}

impl Default for SinkSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkSlot {
    pub fn new() -> Self {
        Self {
            state: SinkState::Detached,
            sink: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.state == SinkState::Attached
    }

    pub fn attach(&mut self, sink: Box<dyn Sink>) -> Result<()> {
        if self.state == SinkState::Attached {
            return Err(PlayoutError::Resource("sink already attached".into()));
        }
        self.sink = Some(sink);
        self.state = SinkState::Attached;
        Ok(())
    }

    /// Detach the current sink. `force` allows detaching even if the
    /// caller has outstanding in-flight frames it hasn't accounted for —
    /// the decision to tolerate that belongs to the caller, not this slot.
    pub fn detach(&mut self, force: bool) -> Result<()> {
        if self.state == SinkState::Detached && !force {
            return Err(PlayoutError::Resource("no sink attached".into()));
        }
        self.sink = None;
        self.state = SinkState::Detached;
        Ok(())
    }

    pub fn route_video(&mut self, frame: &VideoFrame) -> Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.on_video_frame(frame),
            None => Err(PlayoutError::Resource("sink unattached".into())),
        }
    }

    pub fn route_audio(&mut self, frame: &AudioFrame) -> Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.on_audio_frame(frame),
            None => Err(PlayoutError::Resource("sink unattached".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        video_count: Arc<AtomicUsize>,
    }

    impl Sink for CountingSink {
        fn on_video_frame(&mut self, _frame: &VideoFrame) -> Result<()> {
            self.video_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn on_audio_frame(&mut self, _frame: &AudioFrame) -> Result<()> {
            Ok(())
        }
    }

    fn sample_video_frame() -> VideoFrame {
        VideoFrame {
            pts_us: 0,
            duration_us: 33_333,
            width: 4,
            height: 4,
            data: std::sync::Arc::new(vec![0u8; 24]),
        }
    }

    #[test]
    fn test_route_without_attach_fails() {
        let mut slot = SinkSlot::new();
        assert!(slot.route_video(&sample_video_frame()).is_err());
    }

    #[test]
    fn test_attach_then_route_succeeds() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut slot = SinkSlot::new();
        slot.attach(Box::new(CountingSink {
            video_count: counter.clone(),
        }))
        .unwrap();
        slot.route_video(&sample_video_frame()).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_double_attach_fails() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut slot = SinkSlot::new();
        slot.attach(Box::new(CountingSink {
            video_count: counter.clone(),
        }))
        .unwrap();
        let second = slot.attach(Box::new(CountingSink {
            video_count: counter,
        }));
        assert!(second.is_err());
    }

    #[test]
    fn test_detach_without_force_on_detached_fails() {
        let mut slot = SinkSlot::new();
        assert!(slot.detach(false).is_err());
        assert!(slot.detach(true).is_ok());
    }
}
