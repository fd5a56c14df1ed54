//! # Resilience Module
//!
//! Fault tolerance around calls to the external generation worker: a circuit
//! breaker that fails fast while the worker is down, and a retry policy with
//! exponential backoff for transient failures.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bulkgen::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy, RetryPolicyConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(
//!     "generation_worker",
//!     CircuitBreakerConfig {
//!         failure_threshold: 5,
//!         timeout: Duration::from_secs(30),
//!         success_threshold: 2,
//!     },
//! );
//! let retry = RetryPolicy::new(RetryPolicyConfig::default());
//!
//! // The breaker is consulted on every attempt
//! let result = retry
//!     .call(|| breaker.call(|| async { Ok::<_, String>("accepted") }))
//!     .await;
//! # let _ = result;
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::{CircuitBreakerConfig, RetryPolicyConfig};
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use retry::{RetryError, RetryEvent, RetryPolicy};
