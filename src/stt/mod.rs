//! Speech capture seam.
//!
//! The pipeline depends only on the [`SpeechEngine`] trait and its event
//! stream; the concrete engine (microphone capture + Silero VAD + Whisper via
//! sherpa-onnx) lives behind it. Engines deliver finalized segments in the
//! order the underlying recognizer reports them.

mod sherpa;

pub use sherpa::SherpaEngine;

use anyhow::Result;

/// A finalized span of recognized speech, not subject to further revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSegment {
    pub text: String,
}

/// Events delivered by an engine session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A finalized recognition result.
    Segment(TranscriptSegment),
    /// The underlying session ended on its own (device error, engine timeout).
    /// The capture controller decides whether to resume.
    SessionEnded,
}

/// A continuous speech recognition session with interim results handled
/// internally; only finalized segments reach the event stream.
pub trait SpeechEngine: Send {
    /// Begin (or resume) a recognition session. Idempotent while running.
    fn start(&mut self) -> Result<()>;

    /// End the session and discard any pending recognition result.
    fn stop(&mut self);
}
