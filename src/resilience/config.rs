//! # Resilience Configuration
//!
//! Runtime parameters for a single circuit breaker and for the retry policy.
//! File-level configuration (`crate::config`) is converted into these types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time to wait in open state before attempting recovery
    pub timeout: Duration,

    /// Consecutive half-open successes needed to close the circuit; also the
    /// number of probe calls admitted while half-open
    pub success_threshold: u32,
}

impl CircuitBreakerConfig {
    /// Preset for the external generation worker
    pub fn for_generation_worker() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }

        if self.timeout > Duration::from_secs(300) {
            return Err("timeout should not exceed 300 seconds".to_string());
        }

        // A single lucky probe must not be enough to close the circuit
        if self.success_threshold < 2 {
            return Err("success_threshold must be at least 2".to_string());
        }

        if self.success_threshold > 50 {
            return Err("success_threshold should not exceed 50".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::for_generation_worker()
    }
}

/// Exponential backoff parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    pub initial_delay: Duration,

    pub max_delay: Duration,

    pub multiplier: f64,
}

impl RetryPolicyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }

        if self.multiplier < 1.0 || !self.multiplier.is_finite() {
            return Err("multiplier must be a finite value of at least 1.0".to_string());
        }

        if self.max_delay < self.initial_delay {
            return Err("max_delay must not be smaller than initial_delay".to_string());
        }

        Ok(())
    }
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());

        let mut invalid_config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(invalid_config.validate().is_err());

        invalid_config = CircuitBreakerConfig {
            timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid_config.validate().is_err());

        invalid_config = CircuitBreakerConfig {
            success_threshold: 1,
            ..Default::default()
        };
        assert_eq!(
            invalid_config.validate().unwrap_err(),
            "success_threshold must be at least 2"
        );
    }

    #[test]
    fn test_retry_policy_config_validation() {
        assert!(RetryPolicyConfig::default().validate().is_ok());

        let zero_attempts = RetryPolicyConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(zero_attempts.validate().is_err());

        let shrinking = RetryPolicyConfig {
            multiplier: 0.5,
            ..Default::default()
        };
        assert!(shrinking.validate().is_err());

        let inverted = RetryPolicyConfig {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }
}
