use crate::clock::{Clock, SystemClock};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

const NEVER_SENT: i64 = i64::MIN;

/// Minimum spacing between consecutive outbound messages.
///
/// Shared by reference with whoever sends; the last-sent timestamp lives in
/// an atomic so checks never block.
pub struct CooldownGate {
    window: Duration,
    last_sent_ms: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl CooldownGate {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            last_sent_ms: AtomicI64::new(NEVER_SENT),
            clock,
        }
    }

    pub fn with_system_clock(window: Duration) -> Self {
        Self::new(window, Arc::new(SystemClock))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Starts a new window at the current instant.
    pub fn mark_sent(&self) {
        self.last_sent_ms
            .store(self.clock.epoch_millis(), Ordering::Release);
    }

    pub fn reset(&self) {
        self.last_sent_ms.store(NEVER_SENT, Ordering::Release);
    }

    /// Time left in the current window; zero when idle.
    pub fn remaining(&self) -> Duration {
        let last = self.last_sent_ms.load(Ordering::Acquire);
        if last == NEVER_SENT {
            return Duration::ZERO;
        }
        // A clock that moved backwards counts as "just sent".
        let elapsed = self.clock.epoch_millis().saturating_sub(last).max(0) as u64;
        let window_ms = u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(window_ms.saturating_sub(elapsed))
    }

    pub fn is_on_cooldown(&self) -> bool {
        !self.remaining().is_zero()
    }

    /// Remaining whole seconds, rounded up.
    pub fn cooldown_remaining_secs(&self) -> u64 {
        let remaining = self.remaining();
        let millis = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX);
        millis.div_ceil(1_000)
    }
}

impl std::fmt::Debug for CooldownGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownGate")
            .field("window", &self.window)
            .field("remaining", &self.remaining())
            .finish()
    }
}
