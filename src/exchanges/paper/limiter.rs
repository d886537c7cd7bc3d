//! Fixed-window request limiter.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::exchanges::{ExchangeError, Result};

/// Length of the counting window.
const WINDOW: Duration = Duration::from_secs(60);

struct WindowState {
    window_start: Instant,
    count: u32,
}

/// Counts requests per minute and rejects those over the limit.
/// A limit of zero disables the check.
pub struct RateLimiter {
    limit: u32,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Records one request, or fails if the current window is exhausted.
    pub fn acquire(&self) -> Result<()> {
        self.acquire_at(Instant::now())
    }

    fn acquire_at(&self, now: Instant) -> Result<()> {
        if self.limit == 0 {
            return Ok(());
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| ExchangeError::Internal("rate limiter lock poisoned".into()))?;

        if now.duration_since(state.window_start) >= WINDOW {
            state.window_start = now;
            state.count = 0;
        }

        if state.count >= self.limit {
            return Err(ExchangeError::RateLimited {
                current: state.count,
                limit: self.limit,
            });
        }

        state.count += 1;
        Ok(())
    }

    /// Returns the number of requests in the current window.
    pub fn request_count(&self) -> u32 {
        self.state.lock().map(|s| s.count).unwrap_or(0)
    }

    /// Returns the maximum requests per minute.
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_over_limit() {
        let limiter = RateLimiter::new(2);
        let now = Instant::now();

        assert!(limiter.acquire_at(now).is_ok());
        assert!(limiter.acquire_at(now).is_ok());
        let err = limiter.acquire_at(now).unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::RateLimited {
                current: 2,
                limit: 2
            }
        ));
        assert_eq!(limiter.request_count(), 2);
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1);
        let now = Instant::now();

        assert!(limiter.acquire_at(now).is_ok());
        assert!(limiter.acquire_at(now).is_err());
        assert!(limiter.acquire_at(now + WINDOW).is_ok());
        assert_eq!(limiter.request_count(), 1);
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let limiter = RateLimiter::new(0);
        for _ in 0..1000 {
            assert!(limiter.acquire().is_ok());
        }
        assert_eq!(limiter.request_count(), 0);
    }
}
