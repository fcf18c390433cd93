//! Generation watchdog: guards against requests that never get a reply.

use std::time::Duration;

use crate::timer::TimerSlot;

#[derive(Debug)]
pub struct Watchdog {
    slot: TimerSlot,
    timeout: Duration,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slot: TimerSlot::new(),
            timeout,
        }
    }

    /// Arm for a new request, replacing any pending watchdog.
    pub fn arm(&mut self) {
        self.slot.arm(self.timeout);
    }

    pub fn disarm(&mut self) {
        self.slot.disarm();
    }

    pub fn is_armed(&self) -> bool {
        self.slot.is_armed()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves when an armed watchdog runs out.
    pub async fn expired(&mut self) {
        self.slot.fired().await
    }
}
