//! Capture lifecycle state machine.
//!
//! Wraps a [`SpeechEngine`] and tracks the logical listening state
//! independently of the engine's own session, so an engine session that ends
//! on its own (recognition engines routinely time out mid-dictation) is
//! transparently restarted while the user still expects continuous capture.

use anyhow::Result;
use tracing::{debug, warn};

use crate::stt::SpeechEngine;

/// Logical capture state. `Paused` retains the transcript and resumes with
/// `start`; only `restart` clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
    Paused,
}

pub struct CaptureController {
    engine: Option<Box<dyn SpeechEngine>>,
    state: CaptureState,
}

/// Outcome of a controller operation, so the caller can update session state
/// and notify without the controller owning either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Started,
    AlreadyListening,
    Unavailable,
    Stopped,
    NotListening,
}

impl CaptureController {
    /// Controller over a working engine.
    pub fn new(engine: Box<dyn SpeechEngine>) -> Self {
        Self { engine: Some(engine), state: CaptureState::Idle }
    }

    /// Controller for a platform without recognition capability. Every start
    /// is a silent no-op; the missing capability is logged once at startup.
    pub fn unavailable() -> Self {
        Self { engine: None, state: CaptureState::Idle }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == CaptureState::Listening
    }

    /// Begin listening. No-op when already listening or when no engine exists.
    pub fn start(&mut self) -> Result<CaptureOutcome> {
        if self.state == CaptureState::Listening {
            return Ok(CaptureOutcome::AlreadyListening);
        }
        let Some(engine) = self.engine.as_mut() else {
            debug!("Capture unavailable, start ignored");
            return Ok(CaptureOutcome::Unavailable);
        };
        engine.start()?;
        self.state = CaptureState::Listening;
        Ok(CaptureOutcome::Started)
    }

    /// Stop listening, retaining the transcript for a later resume.
    pub fn stop(&mut self) -> CaptureOutcome {
        if self.state != CaptureState::Listening {
            return CaptureOutcome::NotListening;
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
        self.state = CaptureState::Paused;
        CaptureOutcome::Stopped
    }

    /// Stop and start a fresh session. The caller clears the transcript; the
    /// controller only guarantees `Listening` afterwards (engine permitting).
    pub fn restart(&mut self) -> Result<CaptureOutcome> {
        if self.state == CaptureState::Listening {
            if let Some(engine) = self.engine.as_mut() {
                engine.stop();
            }
            self.state = CaptureState::Paused;
        }
        self.start()
    }

    /// Auto-resume policy: an engine session that ended while we are logically
    /// listening is restarted in place. In any other state the end is expected.
    pub fn on_session_ended(&mut self) {
        if self.state != CaptureState::Listening {
            debug!("Engine session ended while {:?}, ignoring", self.state);
            return;
        }
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        debug!("Engine session ended unexpectedly, resuming");
        if let Err(e) = engine.start() {
            warn!("Failed to resume capture session: {}", e);
            self.state = CaptureState::Paused;
        }
    }

    /// Permanent shutdown.
    pub fn shutdown(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.stop();
        }
        self.state = CaptureState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Engine fake counting start/stop calls; optionally fails every start
    /// after the first (simulates the device disappearing mid-session).
    struct FakeEngine {
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
        fail_after_first: bool,
    }

    impl FakeEngine {
        fn counted() -> (Box<dyn SpeechEngine>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let starts = Arc::new(AtomicUsize::new(0));
            let stops = Arc::new(AtomicUsize::new(0));
            let engine = Box::new(FakeEngine { starts: starts.clone(), stops: stops.clone(), fail_after_first: false });
            (engine, starts, stops)
        }

        fn flaky() -> Box<dyn SpeechEngine> {
            Box::new(FakeEngine { starts: Arc::new(AtomicUsize::new(0)), stops: Arc::new(AtomicUsize::new(0)), fail_after_first: true })
        }
    }

    impl SpeechEngine for FakeEngine {
        fn start(&mut self) -> Result<()> {
            let n = self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_after_first && n > 0 {
                anyhow::bail!("device gone");
            }
            Ok(())
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn start_is_noop_while_listening() {
        let (engine, starts, _) = FakeEngine::counted();
        let mut ctl = CaptureController::new(engine);
        assert_eq!(ctl.start().unwrap(), CaptureOutcome::Started);
        assert_eq!(ctl.start().unwrap(), CaptureOutcome::AlreadyListening);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(ctl.is_listening());
    }

    #[test]
    fn start_is_silent_noop_without_engine() {
        let mut ctl = CaptureController::unavailable();
        assert_eq!(ctl.start().unwrap(), CaptureOutcome::Unavailable);
        assert_eq!(ctl.state(), CaptureState::Idle);
    }

    #[test]
    fn stop_pauses_and_restart_listens_again() {
        let (engine, starts, stops) = FakeEngine::counted();
        let mut ctl = CaptureController::new(engine);
        ctl.start().unwrap();
        assert_eq!(ctl.stop(), CaptureOutcome::Stopped);
        assert_eq!(ctl.state(), CaptureState::Paused);

        assert_eq!(ctl.restart().unwrap(), CaptureOutcome::Started);
        assert!(ctl.is_listening());
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn restart_while_listening_cycles_the_engine() {
        let (engine, starts, stops) = FakeEngine::counted();
        let mut ctl = CaptureController::new(engine);
        ctl.start().unwrap();
        assert_eq!(ctl.restart().unwrap(), CaptureOutcome::Started);
        assert!(ctl.is_listening());
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn session_end_while_listening_resumes() {
        let (engine, starts, _) = FakeEngine::counted();
        let mut ctl = CaptureController::new(engine);
        ctl.start().unwrap();
        ctl.on_session_ended();
        assert!(ctl.is_listening());
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn session_end_while_paused_is_ignored() {
        let (engine, starts, _) = FakeEngine::counted();
        let mut ctl = CaptureController::new(engine);
        ctl.start().unwrap();
        ctl.stop();
        ctl.on_session_ended();
        assert_eq!(ctl.state(), CaptureState::Paused);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_resume_falls_back_to_paused() {
        let mut ctl = CaptureController::new(FakeEngine::flaky());
        ctl.start().unwrap();
        ctl.on_session_ended();
        assert_eq!(ctl.state(), CaptureState::Paused);
    }
}
