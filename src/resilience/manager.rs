//! # Circuit Breaker Manager
//!
//! Hands out one shared breaker per named dependency and gives operators a
//! single place to inspect and reset them.

use crate::config::CircuitBreakersConfig;
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug)]
pub struct CircuitBreakerManager {
    /// Collection of circuit breakers by component name
    circuit_breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,

    config: CircuitBreakersConfig,
}

impl CircuitBreakerManager {
    pub fn from_config(config: &CircuitBreakersConfig) -> Self {
        info!(
            components = config.component_configs.len(),
            "Initializing circuit breaker manager"
        );

        Self {
            circuit_breakers: RwLock::new(HashMap::new()),
            config: config.clone(),
        }
    }

    /// Get or create the circuit breaker for a component
    pub async fn get_circuit_breaker(&self, component_name: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.circuit_breakers.read().await;
            if let Some(breaker) = breakers.get(component_name) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.circuit_breakers.write().await;

        // Double-check: another caller may have created it meanwhile
        if let Some(breaker) = breakers.get(component_name) {
            return Arc::clone(breaker);
        }

        let component_config = self
            .config
            .config_for_component(component_name)
            .to_resilience_config();

        let breaker = Arc::new(CircuitBreaker::new(component_name, component_config));
        breakers.insert(component_name.to_string(), Arc::clone(&breaker));

        info!(
            component = component_name,
            total_circuit_breakers = breakers.len(),
            "Created new circuit breaker"
        );

        breaker
    }

    /// Existing breaker for a component, without creating one
    pub async fn get(&self, component_name: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuit_breakers.read().await.get(component_name).cloned()
    }

    pub async fn list_components(&self) -> Vec<String> {
        let breakers = self.circuit_breakers.read().await;
        let mut names: Vec<String> = breakers.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn get_component_metrics(&self, component_name: &str) -> Option<CircuitBreakerMetrics> {
        self.get(component_name).await.map(|breaker| breaker.metrics())
    }

    pub async fn get_system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::default();

        let breakers = self.circuit_breakers.read().await;
        for (name, breaker) in breakers.iter() {
            system_metrics.add_circuit_breaker(name.clone(), breaker.metrics());
        }

        system_metrics
    }

    /// Operator reset of one breaker. Returns false if no such breaker exists.
    pub async fn reset(&self, component_name: &str) -> bool {
        match self.get(component_name).await {
            Some(breaker) => {
                info!(
                    component = component_name,
                    before = %breaker.metrics().format_summary(),
                    "🔧 Resetting circuit breaker"
                );
                breaker.force_closed();
                true
            }
            None => {
                warn!(component = component_name, "Reset requested for unknown circuit breaker");
                false
            }
        }
    }
}
