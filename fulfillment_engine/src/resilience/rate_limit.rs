use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{sync::Mutex, time::Instant};

struct WindowEntry {
    count: u32,
    window_start: Instant,
}

/// Keyed fixed-window rate limiter. Used to cap per-recipient notification cadence (overdue
/// reminders in particular) without any external dependency.
///
/// Idle keys are evicted by [`cleanup`](Self::cleanup), so the map cannot grow for the lifetime of
/// the process.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, WindowEntry>>>,
    max_per_window: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), max_per_window, window }
    }

    /// Returns `true` if the keyed action is within its window budget.
    pub async fn check(&self, key: &str) -> bool {
        let mut map = self.inner.lock().await;
        let now = Instant::now();
        let entry = map.entry(key.to_owned()).or_insert_with(|| WindowEntry { count: 0, window_start: now });
        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.count += 1;
        entry.count <= self.max_per_window
    }

    /// Drops entries whose window expired more than one full window ago.
    pub async fn cleanup(&self) {
        let mut map = self.inner.lock().await;
        let cutoff = self.window * 2;
        let now = Instant::now();
        map.retain(|_, entry| now.duration_since(entry.window_start) < cutoff);
    }

    pub async fn tracked_keys(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn enforces_the_window_budget() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("actor-1").await);
        assert!(limiter.check("actor-1").await);
        assert!(!limiter.check("actor-1").await);
        // independent key, independent budget
        assert!(limiter.check("actor-2").await);
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        tokio::time::pause();
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        assert!(limiter.check("k").await);
        assert!(!limiter.check("k").await);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(limiter.check("k").await);
    }

    #[tokio::test]
    async fn cleanup_evicts_idle_keys() {
        tokio::time::pause();
        let limiter = RateLimiter::new(1, Duration::from_secs(5));
        limiter.check("idle").await;
        tokio::time::advance(Duration::from_secs(11)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_keys().await, 0);
    }
}
