use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default minimum interval between two calls to the same service
pub const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// Minimum-interval gate for calls to one external service.
///
/// A caller arriving before the interval has passed since the previous call
/// is delayed until it has. Callers are never rejected.
#[derive(Debug)]
pub struct RateLimiter {
    service: String,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(service: &str, interval_ms: u64) -> Self {
        RateLimiter {
            service: service.to_string(),
            min_interval: Duration::from_millis(interval_ms),
            last_call: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the service may be called again and record the call
    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let delay = self.min_interval - elapsed;
                debug!("Rate limiting {}: waiting {:?}", self.service, delay);
                tokio::time::sleep(delay).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}
