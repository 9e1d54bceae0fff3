//! Load-shedding and failure-isolation primitives that gate calls into the engine. None of this is
//! business logic, but it shapes the concurrency contract: bounded admission instead of unbounded
//! queuing, and fail-fast circuit breaking around degraded dependencies.

mod admission;
mod circuit_breaker;
mod rate_limit;

pub use admission::{AdmissionError, AdmissionPermit, AdmissionQueue};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use rate_limit::RateLimiter;
