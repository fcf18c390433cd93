//! Single-slot timer polled from the session event loop.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::Sleep;

/// Holds at most one pending deadline. Arming replaces whatever was pending,
/// so a superseded deadline can never fire.
#[derive(Debug, Default)]
pub struct TimerSlot {
    deadline: Option<Pin<Box<Sleep>>>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, delay: Duration) {
        self.deadline = Some(Box::pin(tokio::time::sleep(delay)));
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the pending deadline passes, then empties the slot.
    /// Pends forever while disarmed. Cancel safe: dropping the future keeps
    /// the deadline armed.
    pub async fn fired(&mut self) {
        match self.deadline.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.deadline = None;
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_fires_once() {
        let mut slot = TimerSlot::new();
        slot.arm(Duration::from_millis(100));
        let start = Instant::now();
        slot.fired().await;
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        assert!(!slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_pending() {
        let mut slot = TimerSlot::new();
        slot.arm(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(60)).await;
        slot.arm(Duration::from_millis(100));

        let start = Instant::now();
        slot.fired().await;
        // Only the second deadline fires: 100ms after re-arming, not 40ms.
        assert_eq!(start.elapsed(), Duration::from_millis(100));

        let disarmed = tokio::time::timeout(Duration::from_secs(60), slot.fired()).await;
        assert!(disarmed.is_err(), "nothing should remain pending");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_prevents_firing() {
        let mut slot = TimerSlot::new();
        slot.arm(Duration::from_millis(10));
        slot.disarm();
        let result = tokio::time::timeout(Duration::from_secs(1), slot.fired()).await;
        assert!(result.is_err());
    }
}
