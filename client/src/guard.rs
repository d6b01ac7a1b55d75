use std::time::{Duration, Instant};

/// How long a locally-initiated change is assumed to still be in flight.
/// Covers the observed worst-case round trip plus player callback latency.
pub const SETTLE_WINDOW: Duration = Duration::from_millis(1000);

/// Keeps a client's own change from being treated as new input when it comes
/// back, either as a player callback side effect or as the relay's echo of
/// the event we just sent.
///
/// The window is a single owned deadline: a second local action before expiry
/// re-arms it rather than stacking a second one.
#[derive(Debug, Default)]
pub struct EchoGuard {
    suppressed_until: Option<Instant>,
}

impl EchoGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the settle window for a local action.
    pub fn begin_local_action(&mut self, now: Instant) {
        self.suppressed_until = Some(now + SETTLE_WINDOW);
    }

    pub fn is_suppressed(&self, now: Instant) -> bool {
        self.suppressed_until.map_or(false, |until| now < until)
    }

    /// Drop any pending window. Part of room teardown.
    pub fn clear(&mut self) {
        self.suppressed_until = None;
    }
}
