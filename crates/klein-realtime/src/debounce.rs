//! Debounced emitter: coalesces bursts of drawing events into one send.

use std::time::Duration;

use crate::timer::TimerSlot;

#[derive(Debug)]
pub struct Debouncer {
    slot: TimerSlot,
    default_delay: Duration,
}

impl Debouncer {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            slot: TimerSlot::new(),
            default_delay,
        }
    }

    /// Restart the quiet period with the default delay.
    pub fn schedule(&mut self) {
        self.slot.arm(self.default_delay);
    }

    /// Restart the quiet period with an explicit delay; zero sends on the
    /// next loop turn.
    pub fn schedule_after(&mut self, delay: Duration) {
        self.slot.arm(delay);
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_armed()
    }

    /// Resolves once the quiet period has elapsed.
    pub async fn elapsed(&mut self) {
        self.slot.fired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_one() {
        let mut debouncer = Debouncer::new(Duration::from_millis(128));
        let start = Instant::now();
        for _ in 0..10 {
            debouncer.schedule();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        debouncer.elapsed().await;
        // Last schedule happened at 180ms.
        assert_eq!(start.elapsed(), Duration::from_millis(180 + 128));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_overrides_default() {
        let mut debouncer = Debouncer::new(Duration::from_millis(128));
        debouncer.schedule();
        debouncer.schedule_after(Duration::ZERO);
        let start = Instant::now();
        debouncer.elapsed().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
