//! Cancellable debounce timer driven by explicit instants.

use std::time::{Duration, Instant};

/// A deadline that moves forward on every [`reset`](Self::reset).
///
/// The timer never fires on its own: the owner polls
/// [`is_expired`](Self::is_expired) with the current instant.
#[derive(Debug, Clone)]
pub struct DebounceTimer {
    window: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Arm (or re-arm) the timer one window after `now`.
    pub fn reset(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Disarm immediately. Returns whether the timer was armed.
    pub fn flush(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }
}
