//! Transient user notifications.
//!
//! Every failure or status change surfaces as a non-blocking notification at
//! the point of the triggering action; nothing here is fatal to the session.
//! The console implementation logs through tracing; tests record messages.

use tracing::info;

/// Sink for transient notifications.
pub trait Notify: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier backed by the tracing subscriber.
pub struct LogNotifier;

impl Notify for LogNotifier {
    fn notify(&self, message: &str) {
        info!("🔔 {}", message);
    }
}
