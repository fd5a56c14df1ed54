//! Test system builders shared by the integration suites.

#![allow(dead_code)] // Each suite uses a different subset

use std::sync::Arc;

use bulkgen::config::BulkgenConfig;
use bulkgen::ledger::{InMemoryStore, RowUpdateOutcome};
use bulkgen::models::{BatchId, NewBatch, RowId};
use bulkgen::orchestration::{
    BatchCreated, BatchStatusResponse, OrchestrationSystem, RowResultCallback, StorageBackend,
    SubstitutionMode,
};
use bulkgen::test_utils::MockGenerationWorker;
use serde_json::{json, Value};

/// `count` rows of the shape `{"name": "person-{i}", "topic": "topic-{i}"}`
pub fn sample_rows(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| json!({"name": format!("person-{i}"), "topic": format!("topic-{i}")}))
        .collect()
}

pub fn sample_batch(count: usize) -> NewBatch {
    NewBatch::new("Write about {{topic}} for {{name}}", sample_rows(count))
}

/// Builder for an in-memory orchestration system with a scripted worker and
/// millisecond-scale backoff
pub struct TestSystemBuilder {
    config: BulkgenConfig,
    worker: MockGenerationWorker,
}

impl TestSystemBuilder {
    pub fn new() -> Self {
        let mut config = BulkgenConfig::default();
        config.retry.max_attempts = 3;
        config.retry.initial_delay_ms = 5;
        config.retry.max_delay_ms = 20;
        config.worker.request_timeout_ms = 1_000;
        config.orchestration.max_rows_per_batch = 1_000;
        Self {
            config,
            worker: MockGenerationWorker::new(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.retry.max_attempts = max_attempts;
        self
    }

    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.config.circuit_breakers.default_config.failure_threshold = failure_threshold;
        self
    }

    pub fn with_substitution_mode(mut self, mode: SubstitutionMode) -> Self {
        self.config.orchestration.substitution_mode = mode;
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.config.orchestration.max_rows_per_batch = max_rows;
        self
    }

    pub fn config(&self) -> &BulkgenConfig {
        &self.config
    }

    pub async fn build(self) -> TestSystem {
        let store = Arc::new(InMemoryStore::new());
        let system = OrchestrationSystem::with_components(
            &self.config,
            store.clone(),
            store.clone(),
            Arc::new(self.worker.clone()),
            StorageBackend::Memory,
        )
        .await;

        TestSystem {
            system,
            worker: self.worker,
            store,
        }
    }
}

impl Default for TestSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TestSystem {
    pub system: OrchestrationSystem,
    pub worker: MockGenerationWorker,
    pub store: Arc<InMemoryStore>,
}

impl TestSystem {
    pub async fn new() -> Self {
        TestSystemBuilder::new().build().await
    }

    /// Create a batch and wait for its dispatch task to finish
    pub async fn create_and_dispatch(&self, request: NewBatch) -> BatchId {
        let created = self.create(request).await;
        let batch_id = created.batch_id;
        created.dispatch.join().await.expect("dispatch task panicked");
        batch_id
    }

    pub async fn create(&self, request: NewBatch) -> BatchCreated {
        self.system
            .orchestrator
            .create_batch(request)
            .await
            .expect("batch creation failed")
    }

    pub async fn status(&self, batch_id: BatchId) -> BatchStatusResponse {
        self.system
            .status_query
            .get_status(batch_id)
            .await
            .expect("status query failed")
    }

    pub async fn report_success(&self, batch_id: BatchId, offset: usize, output: &str) -> RowUpdateOutcome {
        self.system
            .orchestrator
            .record_row_result(RowResultCallback::success(
                batch_id,
                RowId::new(batch_id, offset),
                output,
            ))
            .await
            .expect("recording success failed")
    }

    pub async fn report_error(&self, batch_id: BatchId, offset: usize, error: &str) -> RowUpdateOutcome {
        self.system
            .orchestrator
            .record_row_result(RowResultCallback::error(
                batch_id,
                RowId::new(batch_id, offset),
                error,
            ))
            .await
            .expect("recording error failed")
    }
}
