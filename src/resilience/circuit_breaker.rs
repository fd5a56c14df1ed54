//! # Circuit Breaker Implementation
//!
//! Fault isolation for calls to an external dependency. Three states:
//! Closed (normal operation), Open (failing fast) and Half-Open (testing
//! recovery with a bounded number of probe calls).
//!
//! The open → half-open move happens lazily: the first call that observes the
//! open timeout as elapsed performs it. No background timer is involved.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited calls allowed to test system health
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open (or its half-open probe slots are taken); the operation was not invoked
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Mutable breaker bookkeeping, guarded by one lock
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u64,
    last_failure_time: Option<Instant>,
    half_open_successes: u64,
    half_open_in_flight: u64,
    /// Bumped on every state change so results of calls admitted under an
    /// earlier state do not drive the current one
    generation: u64,
    metrics: CircuitBreakerMetrics,
}

/// Ticket handed out when a call is admitted
#[derive(Debug, Clone, Copy)]
struct Admission {
    generation: u64,
    probe: bool,
}

/// Admitted call held across the operation's await
///
/// A call dropped before its operation resolves (caller timeout, task abort)
/// records nothing, but must still hand back its half-open slot.
struct AdmissionGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl AdmissionGuard<'_> {
    fn settle(mut self, succeeded: bool, duration: Duration) {
        self.settled = true;
        if succeeded {
            self.breaker.record_success(self.admission, duration);
        } else {
            self.breaker.record_failure(self.admission, duration);
        }
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release_abandoned(self.admission);
        }
    }
}

/// Core circuit breaker implementation
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Mirror of the current state for lock-free reads
    state: AtomicU8,

    config: CircuitBreakerConfig,

    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_ms = config.timeout.as_millis() as u64,
            success_threshold = config.success_threshold,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_time: None,
                half_open_successes: 0,
                half_open_in_flight: 0,
                generation: 0,
                metrics: CircuitBreakerMetrics::new(),
            }),
        }
    }

    /// Get current circuit state
    ///
    /// An open circuit whose timeout has elapsed still reports `Open` until the
    /// next call moves it to half-open.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = AdmissionGuard {
            breaker: self,
            admission: self.admit()?,
            settled: false,
        };

        let start_time = Instant::now();
        let result = operation().await;
        guard.settle(result.is_ok(), start_time.elapsed());

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Decide whether a call may proceed
    fn admit<E>(&self) -> Result<Admission, CircuitBreakerError<E>> {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let timeout_elapsed = inner
                .last_failure_time
                .map_or(true, |failed_at| failed_at.elapsed() > self.config.timeout);

            if !timeout_elapsed {
                inner.metrics.rejected_count += 1;
                return Err(self.rejection());
            }
            self.transition(&mut inner, CircuitState::HalfOpen);
        }

        match inner.state {
            CircuitState::Closed => Ok(Admission {
                generation: inner.generation,
                probe: false,
            }),
            CircuitState::HalfOpen
                if inner.half_open_in_flight < u64::from(self.config.success_threshold) =>
            {
                inner.half_open_in_flight += 1;
                Ok(Admission {
                    generation: inner.generation,
                    probe: true,
                })
            }
            _ => {
                inner.metrics.rejected_count += 1;
                Err(self.rejection())
            }
        }
    }

    fn rejection<E>(&self) -> CircuitBreakerError<E> {
        CircuitBreakerError::CircuitOpen {
            component: self.name.clone(),
        }
    }

    fn record_success(&self, admission: Admission, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.success_count += 1;
        inner.metrics.total_duration += duration;

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🟢 Operation succeeded"
        );

        if admission.generation != inner.generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen if admission.probe => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= u64::from(self.config.success_threshold) {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            _ => {}
        }
    }

    fn record_failure(&self, admission: Admission, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.failure_count += 1;
        inner.metrics.total_duration += duration;

        warn!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🔴 Operation failed"
        );

        if admission.generation != inner.generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                inner.last_failure_time = Some(Instant::now());
                if inner.consecutive_failures >= u64::from(self.config.failure_threshold) {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            // Any failure in half-open state immediately reopens the circuit
            CircuitState::HalfOpen => {
                inner.consecutive_failures += 1;
                inner.last_failure_time = Some(Instant::now());
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Return the half-open slot of a call that never produced a result
    fn release_abandoned(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        if !admission.probe
            || admission.generation != inner.generation
            || inner.state != CircuitState::HalfOpen
        {
            return;
        }

        inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        debug!(
            component = %self.name,
            in_flight = inner.half_open_in_flight,
            "🟡 Half-open call dropped before completing"
        );
    }

    /// Apply a state change; caller holds the lock
    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        inner.state = to;
        inner.generation += 1;
        inner.half_open_successes = 0;
        inner.half_open_in_flight = 0;
        self.state.store(to as u8, Ordering::Release);

        match to {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.last_failure_time = None;
                info!(
                    component = %self.name,
                    total_calls = inner.metrics.total_calls,
                    "🟢 Circuit breaker closed (recovered)"
                );
            }
            CircuitState::Open => {
                warn!(
                    component = %self.name,
                    consecutive_failures = inner.consecutive_failures,
                    failure_threshold = self.config.failure_threshold,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "🔴 Circuit breaker opened (failing fast)"
                );
            }
            CircuitState::HalfOpen => {
                info!(
                    component = %self.name,
                    success_threshold = self.config.success_threshold,
                    "🟡 Circuit breaker half-open (testing recovery)"
                );
            }
        }
    }

    /// Force circuit to open state
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut inner = self.inner.lock();
        inner.last_failure_time = Some(Instant::now());
        self.transition(&mut inner, CircuitState::Open);
    }

    /// Force circuit to closed state, clearing failure history
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        let mut snapshot = inner.metrics.clone();
        snapshot.current_state = inner.state;
        snapshot.consecutive_failures = inner.consecutive_failures;
        snapshot.half_open_successes = inner.half_open_successes;
        snapshot.with_derived_fields()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        let metrics = self.metrics();
        if metrics.current_state != CircuitState::Closed {
            return false;
        }

        // Too few calls to judge by failure rate
        metrics.total_calls < 10 || metrics.is_healthy()
    }
}
