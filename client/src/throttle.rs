use std::time::{Duration, Instant};

/// Cool-down between applications of inbound sync events. Several clients
/// reporting the same transition at once must collapse into one local apply.
pub const APPLY_COOLDOWN: Duration = Duration::from_millis(500);

/// Rate limit on how often inbound sync events are applied to the player,
/// independent of how often they arrive. Gates application only; the echo
/// settle window is a separate concern and composes independently.
#[derive(Debug, Default)]
pub struct SyncThrottle {
    cooldown_until: Option<Instant>,
}

impl SyncThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when idle; starts the cool-down. False while cooling down.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(until) = self.cooldown_until {
            if now < until {
                return false;
            }
        }
        self.cooldown_until = Some(now + APPLY_COOLDOWN);
        true
    }

    /// Drop any pending cool-down. Part of room teardown.
    pub fn clear(&mut self) {
        self.cooldown_until = None;
    }
}
