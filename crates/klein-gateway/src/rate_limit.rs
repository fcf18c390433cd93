//! Per-IP token issuance rate limiter.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

const WINDOW: Duration = Duration::from_secs(60);

type Issued = HashMap<IpAddr, Vec<Instant>>;

/// Sliding one-minute window of issued tokens per client IP.
pub struct RateLimiter {
    max_per_minute: u32,
    issued: Arc<Mutex<Issued>>,
}

impl RateLimiter {
    /// Create a new rate limiter. Must be called inside a tokio runtime.
    pub fn new(max_per_minute: u32) -> Self {
        let limiter = Self {
            max_per_minute,
            issued: Arc::new(Mutex::new(HashMap::new())),
        };

        // Spawn background cleanup task
        let issued = limiter.issued.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(WINDOW).await;
                let mut map = lock(&issued);
                let cutoff = Instant::now() - WINDOW;
                map.retain(|_, timestamps| {
                    timestamps.retain(|t| *t > cutoff);
                    !timestamps.is_empty()
                });
                debug!(entries = map.len(), "Rate limiter cleanup");
            }
        });

        limiter
    }

    /// Record an issuance for `ip`. Returns false if the IP is over its limit.
    pub fn check(&self, ip: IpAddr) -> bool {
        let mut map = lock(&self.issued);
        let now = Instant::now();
        let cutoff = now.checked_sub(WINDOW);

        let timestamps = map.entry(ip).or_default();
        if let Some(cutoff) = cutoff {
            timestamps.retain(|t| *t > cutoff);
        }

        if timestamps.len() >= self.max_per_minute as usize {
            warn!(%ip, count = timestamps.len(), limit = self.max_per_minute,
                "Rate limited: too many token requests from IP");
            return false;
        }

        timestamps.push(now);
        true
    }
}

fn lock(issued: &Mutex<Issued>) -> MutexGuard<'_, Issued> {
    issued.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
