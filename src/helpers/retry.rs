use std::time::Duration;

use log::debug;

/// Default backoff before retrying a rate-limited request
pub const DEFAULT_RATE_LIMIT_BACKOFF_MS: u64 = 5000;

/// Retry bookkeeping with a fixed list of intervals.
///
/// Each interval allows one more attempt; once the list is used up
/// `should_retry` returns false.
#[derive(Debug, Clone)]
pub struct RetryHandler {
    /// Current attempt number (0-based)
    attempt: usize,
    intervals: Vec<Duration>,
}

impl RetryHandler {
    /// Create a new retry handler with custom intervals
    pub fn with_intervals(intervals: Vec<Duration>) -> Self {
        Self { attempt: 0, intervals }
    }

    /// A single retry after `backoff`, used for HTTP 429 responses
    pub fn rate_limit_retry(backoff: Duration) -> Self {
        Self::with_intervals(vec![backoff])
    }

    /// Get the current attempt number (0-based)
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Check if we should continue retrying
    pub fn should_retry(&self) -> bool {
        self.attempt < self.intervals.len()
    }

    /// Get the delay for the current attempt
    pub fn get_delay(&self) -> Duration {
        match self.intervals.last() {
            Some(last) => self.intervals.get(self.attempt).copied().unwrap_or(*last),
            None => Duration::ZERO,
        }
    }

    /// Wait for the current retry interval and advance to the next attempt
    pub async fn wait(&mut self) {
        let delay = self.get_delay();
        debug!("Retry attempt {}: waiting {:?} before next attempt", self.attempt + 1, delay);
        tokio::time::sleep(delay).await;
        self.attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_intervals() {
        let mut retry = RetryHandler::with_intervals(vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
        ]);

        assert_eq!(retry.get_delay(), Duration::from_secs(1));
        retry.attempt += 1;
        assert_eq!(retry.get_delay(), Duration::from_secs(2));
        retry.attempt += 1;
        assert_eq!(retry.get_delay(), Duration::from_secs(4));

        // Clamped to the last interval
        retry.attempt += 1;
        assert_eq!(retry.get_delay(), Duration::from_secs(4));
        assert!(!retry.should_retry());
    }

    #[test]
    fn test_rate_limit_retry_allows_one_retry() {
        let mut retry = RetryHandler::rate_limit_retry(Duration::from_millis(5000));
        assert!(retry.should_retry());
        assert_eq!(retry.get_delay(), Duration::from_millis(5000));

        retry.attempt = 1;
        assert!(!retry.should_retry());
    }

    #[test]
    fn test_no_intervals() {
        let retry = RetryHandler::with_intervals(Vec::new());
        assert!(!retry.should_retry());
        assert_eq!(retry.get_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_wait_advances_attempt() {
        let mut retry = RetryHandler::rate_limit_retry(Duration::from_millis(1));
        retry.wait().await;
        assert_eq!(retry.attempt(), 1);
        assert!(!retry.should_retry());
    }
}
