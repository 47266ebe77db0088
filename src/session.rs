//! Session state for one capture-to-document cycle.

use crate::fields::FieldMap;

/// Mutable state owned by the command loop (the single logical writer).
///
/// The transcript and extraction result survive stop/start cycles and
/// extraction failures; only an explicit restart clears them.
#[derive(Debug, Default)]
pub struct Session {
    /// Accumulated transcript (debounced appends plus manual overrides).
    pub transcript: String,
    /// Last successful extraction, if any.
    pub extracted: Option<FieldMap>,
    /// Whether manual transcript/field edits are accepted.
    pub editing_enabled: bool,
    /// Facility name printed in the document header; required before generation.
    pub facility_name: String,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a debounced batch, separated from existing text by one space.
    pub fn append_transcript(&mut self, batch: &str) {
        if !self.transcript.is_empty() {
            self.transcript.push(' ');
        }
        self.transcript.push_str(batch);
    }

    /// Clear capture state for a fresh dictation (restart semantics).
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.extracted = None;
    }
}
