//! Debounced transcript accumulation.
//!
//! Recognition engines fire finalized results in bursts, sometimes
//! milliseconds apart. Appending each one individually causes redundant state
//! updates, so segments are coalesced: after the last arrival in a burst, wait
//! one quiet window with no new segments, then commit the whole batch as a
//! single space-joined append.

use tokio::time::{Duration, Instant};

/// Coalesces finalized segments inside a fixed quiet window.
///
/// Designed for a `select!` loop: `push` re-arms the deadline, `quiesced`
/// resolves when the window elapses, `take_batch` drains the pending burst.
pub struct DebouncedAccumulator {
    window: Duration,
    pending: Vec<String>,
    deadline: Option<Instant>,
}

impl DebouncedAccumulator {
    pub fn new(window: Duration) -> Self {
        Self { window, pending: Vec::new(), deadline: None }
    }

    /// Buffer a finalized segment (trimmed) and re-arm the quiet window.
    /// Whitespace-only segments are dropped.
    pub fn push(&mut self, segment: &str) {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            return;
        }
        self.pending.push(trimmed.to_string());
        self.deadline = Some(Instant::now() + self.window);
    }

    /// Resolves when the quiet window has elapsed since the last push.
    /// Pends forever while nothing is buffered, so it is safe as a
    /// `select!` arm that only fires when a batch is ready.
    pub async fn quiesced(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Drain the pending burst as one space-joined string, in arrival order.
    pub fn take_batch(&mut self) -> Option<String> {
        self.deadline = None;
        if self.pending.is_empty() {
            return None;
        }
        Some(self.pending.drain(..).collect::<Vec<_>>().join(" "))
    }

    /// Whether a burst is currently buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
