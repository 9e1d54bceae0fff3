use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use log::*;
use thiserror::Error;
use tokio::sync::Mutex;

//--------------------------------------     CircuitState     --------------------------------------------------------
/// Closed: calls pass through. Open: calls are rejected immediately until the cooldown elapses.
/// HalfOpen: a limited probe is allowed through; one failure re-opens the circuit, enough
/// successes close it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Cooldown before an open circuit lets a probe through.
    pub cooldown: Duration,
    /// Probe successes required to close a half-open circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, cooldown: Duration::from_secs(30), success_threshold: 2 }
    }
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
}

/// Wraps calls to a dependency that may degrade (cache, persistence, a remote API) and fails fast
/// once the failure threshold is crossed, rather than piling blocked callers onto a dead service.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    state: Arc<Mutex<BreakerState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        let state = BreakerState {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
        };
        Self { name, state: Arc::new(Mutex::new(state)), config }
    }

    /// Runs `operation` under the breaker. `CircuitOpen` is a retryable "try later" signal; the
    /// operation's own error is wrapped in `OperationFailed`.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where F: Future<Output = Result<T, E>> {
        {
            let mut guard = self.state.lock().await;
            match guard.state {
                CircuitState::Open => {
                    let cooled_down =
                        guard.last_failure_at.map(|t| t.elapsed() >= self.config.cooldown).unwrap_or(true);
                    if cooled_down {
                        info!("⛩️ [{}] circuit half-open, probing", self.name);
                        guard.state = CircuitState::HalfOpen;
                        guard.success_count = 0;
                    } else {
                        return Err(CircuitBreakerError::CircuitOpen);
                    }
                },
                CircuitState::HalfOpen | CircuitState::Closed => {},
            }
        }

        match operation.await {
            Ok(result) => {
                self.record_success().await;
                Ok(result)
            },
            Err(err) => {
                self.record_failure().await;
                Err(CircuitBreakerError::OperationFailed(err))
            },
        }
    }

    async fn record_success(&self) {
        let mut guard = self.state.lock().await;
        match guard.state {
            CircuitState::HalfOpen => {
                guard.success_count += 1;
                if guard.success_count >= self.config.success_threshold {
                    info!("⛩️ [{}] circuit closed after {} probe successes", self.name, guard.success_count);
                    guard.state = CircuitState::Closed;
                    guard.failure_count = 0;
                    guard.success_count = 0;
                    guard.last_failure_at = None;
                }
            },
            CircuitState::Closed => {
                guard.failure_count = 0;
            },
            CircuitState::Open => {
                warn!("⛩️ [{}] success recorded while circuit open", self.name);
            },
        }
    }

    async fn record_failure(&self) {
        let mut guard = self.state.lock().await;
        guard.failure_count += 1;
        guard.last_failure_at = Some(Instant::now());
        match guard.state {
            CircuitState::Closed => {
                if guard.failure_count >= self.config.failure_threshold {
                    warn!("⛩️ [{}] circuit opened after {} failures", self.name, guard.failure_count);
                    guard.state = CircuitState::Open;
                }
            },
            CircuitState::HalfOpen => {
                // A single failed probe re-opens immediately.
                warn!("⛩️ [{}] probe failed, circuit re-opened", self.name);
                guard.state = CircuitState::Open;
                guard.success_count = 0;
            },
            CircuitState::Open => {},
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    /// Operator escape hatch.
    pub async fn reset(&self) {
        let mut guard = self.state.lock().await;
        info!("⛩️ [{}] circuit manually reset", self.name);
        guard.state = CircuitState::Closed;
        guard.failure_count = 0;
        guard.success_count = 0;
        guard.last_failure_at = None;
    }
}

#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit is open; try again later")]
    CircuitOpen,
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

#[cfg(test)]
mod test {
    use super::*;

    fn breaker(failure_threshold: u32, cooldown: Duration, success_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new("test", CircuitBreakerConfig { failure_threshold, cooldown, success_threshold })
    }

    #[tokio::test]
    async fn opens_after_threshold_and_fails_fast() {
        let cb = breaker(3, Duration::from_secs(60), 1);
        for _ in 0..3 {
            let result = cb.call(async { Err::<(), _>("boom") }).await;
            assert!(matches!(result, Err(CircuitBreakerError::OperationFailed(_))));
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        let result = cb.call(async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
    }

    #[tokio::test]
    async fn probes_after_cooldown_and_closes_on_success() {
        let cb = breaker(2, Duration::from_millis(50), 1);
        for _ in 0..2 {
            let _ = cb.call(async { Err::<(), _>("boom") }).await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let result = cb.call(async { Ok::<_, &str>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn failed_probe_reopens_immediately() {
        let cb = breaker(1, Duration::from_millis(20), 2);
        let _ = cb.call(async { Err::<(), _>("boom") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let result = cb.call(async { Err::<(), _>("still broken") }).await;
        assert!(matches!(result, Err(CircuitBreakerError::OperationFailed(_))));
        assert_eq!(cb.state().await, CircuitState::Open);

        // and it keeps failing fast inside the new cooldown
        let result = cb.call(async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
    }
}
