//! # Orchestration Bootstrap
//!
//! Wires the orchestration core from configuration: storage backend, generation
//! worker client, the shared circuit breaker, retry policy, orchestrator and
//! status query service. Components are injected explicitly; nothing lives in
//! globals.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::BulkgenConfig;
use crate::constants::components::GENERATION_WORKER;
use crate::error::Result;
use crate::ledger::{BatchStore, InMemoryStore, PgStore, RowLedger};
use crate::orchestration::batch_orchestrator::BatchOrchestrator;
use crate::orchestration::dispatcher::Dispatcher;
use crate::orchestration::status_query::StatusQueryService;
use crate::orchestration::SubstitutionMode;
use crate::resilience::{CircuitBreakerManager, RetryPolicy};
use crate::worker::{GenerationWorker, HttpGenerationWorker};

/// Which store backs batches and the row ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

/// Summary used by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub storage: StorageBackend,
    pub substitution_mode: SubstitutionMode,
    pub max_rows_per_batch: usize,
}

/// Fully wired orchestration core
#[derive(Debug, Clone)]
pub struct OrchestrationSystem {
    pub orchestrator: BatchOrchestrator,
    pub status_query: StatusQueryService,
    pub circuit_breakers: Arc<CircuitBreakerManager>,
    storage: StorageBackend,
    max_rows_per_batch: usize,
}

impl OrchestrationSystem {
    /// Bootstrap for deployment: Postgres when `database.enabled`, otherwise the
    /// in-memory store; HTTP generation worker from the `worker` section.
    pub async fn from_config(config: &BulkgenConfig) -> Result<Self> {
        let worker: Arc<dyn GenerationWorker> = Arc::new(HttpGenerationWorker::from_config(&config.worker));

        if config.database.enabled {
            let store = Arc::new(PgStore::connect(&config.database).await?);
            if config.database.run_migrations {
                store.migrate().await?;
            }
            Ok(Self::build(config, store.clone(), store, worker, StorageBackend::Postgres).await)
        } else {
            let store = Arc::new(InMemoryStore::new());
            Ok(Self::build(config, store.clone(), store, worker, StorageBackend::Memory).await)
        }
    }

    /// In-memory storage with a caller-supplied worker
    pub async fn in_memory(config: &BulkgenConfig, worker: Arc<dyn GenerationWorker>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::build(config, store.clone(), store, worker, StorageBackend::Memory).await
    }

    /// Wire caller-supplied components
    pub async fn with_components(
        config: &BulkgenConfig,
        batches: Arc<dyn BatchStore>,
        ledger: Arc<dyn RowLedger>,
        worker: Arc<dyn GenerationWorker>,
        storage: StorageBackend,
    ) -> Self {
        Self::build(config, batches, ledger, worker, storage).await
    }

    async fn build(
        config: &BulkgenConfig,
        batches: Arc<dyn BatchStore>,
        ledger: Arc<dyn RowLedger>,
        worker: Arc<dyn GenerationWorker>,
        storage: StorageBackend,
    ) -> Self {
        let circuit_breakers = Arc::new(CircuitBreakerManager::from_config(&config.circuit_breakers));
        let breaker = circuit_breakers.get_circuit_breaker(GENERATION_WORKER).await;

        let dispatcher = Dispatcher::new(
            worker,
            breaker,
            RetryPolicy::new(config.retry.to_policy_config()),
            config.worker.request_timeout(),
            config.orchestration.substitution_mode,
        );

        let max_rows_per_batch = config.orchestration.max_rows_per_batch;
        let orchestrator = BatchOrchestrator::new(batches.clone(), ledger.clone(), dispatcher, max_rows_per_batch);
        let status_query = StatusQueryService::new(batches, ledger);

        info!(
            storage = ?storage,
            substitution_mode = ?config.orchestration.substitution_mode,
            max_attempts = config.retry.max_attempts,
            request_timeout_ms = config.worker.request_timeout_ms,
            "🚀 Orchestration system bootstrapped"
        );

        Self {
            orchestrator,
            status_query,
            circuit_breakers,
            storage,
            max_rows_per_batch,
        }
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            storage: self.storage,
            substitution_mode: self.orchestrator.dispatcher().substitution_mode(),
            max_rows_per_batch: self.max_rows_per_batch,
        }
    }
}
