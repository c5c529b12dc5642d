//! Session lifecycle event sink.
//!
//! Audit/event consumers are external to the tunnel; the session only
//! needs a capability to notify them. Passing the sink in explicitly
//! (instead of a process-wide singleton) lets tests substitute a
//! recording implementation without touching global state.

use tracing::info;

/// Receives session lifecycle notifications.
pub trait SessionEvents: Send + Sync {
    fn session_started(&self, session_id: &str);
    fn session_closed(&self, session_id: &str);
}

/// Sink that discards all events.
pub struct NoopEvents;

impl SessionEvents for NoopEvents {
    fn session_started(&self, _session_id: &str) {}
    fn session_closed(&self, _session_id: &str) {}
}

/// Sink that forwards events to the tracing log, used by the server binary.
pub struct LogEvents;

impl SessionEvents for LogEvents {
    fn session_started(&self, session_id: &str) {
        info!(session_id, "session started");
    }

    fn session_closed(&self, session_id: &str) {
        info!(session_id, "session closed");
    }
}
