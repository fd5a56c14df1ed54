//! # PostgreSQL Store
//!
//! `BatchStore` + `RowLedger` over the `bulkgen_batches` and
//! `bulkgen_row_ledger_entries` tables (see `migrations/`).
//!
//! Row completion is accounted for in the same transaction as the row write:
//! the conditional `UPDATE ... WHERE status NOT IN ('success', 'error')` only
//! matches a non-terminal entry, and the batch row's `remaining_rows` counter is
//! decremented with `RETURNING`, so the row lock on the batch serializes
//! concurrent completions and exactly one of them reads zero.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{BatchStore, RowLedger, RowUpdate, RowUpdateOutcome};
use crate::config::DatabaseConfig;
use crate::error::{BulkgenError, Result};
use crate::models::{Batch, BatchId, RowCounts, RowId, RowInput, RowLedgerEntry};
use crate::state_machine::{BatchState, RowState};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const BATCH_COLUMNS: &str = "batch_id, status, total_rows, instruction_template, \
     auxiliary_context, requested_output_fields, message, created_at, updated_at";

const ROW_COLUMNS: &str =
    "batch_id, row_id, row_offset, input, output, status, error, created_at, updated_at";

#[derive(Debug, FromRow)]
struct BatchRow {
    batch_id: Uuid,
    status: String,
    total_rows: i64,
    instruction_template: String,
    auxiliary_context: Option<String>,
    requested_output_fields: Option<Json<Vec<String>>>,
    message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for Batch {
    type Error = BulkgenError;

    fn try_from(row: BatchRow) -> Result<Self> {
        Ok(Batch {
            id: BatchId(row.batch_id),
            status: row.status.parse().map_err(BulkgenError::StoreError)?,
            total_rows: row.total_rows as usize,
            instruction_template: row.instruction_template,
            auxiliary_context: row.auxiliary_context,
            requested_output_fields: row.requested_output_fields.map(|fields| fields.0),
            message: row.message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LedgerRow {
    batch_id: Uuid,
    row_id: String,
    row_offset: i64,
    input: Json<RowInput>,
    output: String,
    status: String,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for RowLedgerEntry {
    type Error = BulkgenError;

    fn try_from(row: LedgerRow) -> Result<Self> {
        Ok(RowLedgerEntry {
            id: RowId::from(row.row_id),
            batch_id: BatchId(row.batch_id),
            row_offset: row.row_offset as usize,
            input: row.input.0,
            output: row.output,
            status: row.status.parse().map_err(BulkgenError::StoreError)?,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed batch store and row ledger
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect(&config.url)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to connect to database");
                BulkgenError::store(format!("Database connection failed: {e}"))
            })?;

        info!(max_connections = config.max_connections, "🗄️ Database pool established");
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| BulkgenError::store(format!("Migration failed: {e}")))?;
        debug!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BatchStore for PgStore {
    async fn insert_batch(&self, batch: &Batch) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO bulkgen_batches (
                batch_id, status, total_rows, remaining_rows, error_rows,
                instruction_template, auxiliary_context, requested_output_fields,
                message, created_at, updated_at
            )
            VALUES ($1, $2, $3, $3, 0, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (batch_id) DO NOTHING
            "#,
        )
        .bind(batch.id.0)
        .bind(batch.status.as_str())
        .bind(batch.total_rows as i64)
        .bind(&batch.instruction_template)
        .bind(&batch.auxiliary_context)
        .bind(batch.requested_output_fields.as_ref().map(Json))
        .bind(&batch.message)
        .bind(batch.created_at)
        .bind(batch.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BulkgenError::DuplicateBatch { batch_id: batch.id });
        }
        Ok(())
    }

    async fn get_batch(&self, batch_id: BatchId) -> Result<Option<Batch>> {
        let query = format!("SELECT {BATCH_COLUMNS} FROM bulkgen_batches WHERE batch_id = $1");
        sqlx::query_as::<_, BatchRow>(&query)
            .bind(batch_id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(Batch::try_from)
            .transpose()
    }

    async fn transition_batch(
        &self,
        batch_id: BatchId,
        expected: BatchState,
        next: BatchState,
        message: Option<String>,
    ) -> Result<Option<Batch>> {
        let query = format!(
            "UPDATE bulkgen_batches \
             SET status = $3, message = $4, updated_at = GREATEST(NOW(), updated_at) \
             WHERE batch_id = $1 AND status = $2 \
             RETURNING {BATCH_COLUMNS}"
        );

        sqlx::query_as::<_, BatchRow>(&query)
            .bind(batch_id.0)
            .bind(expected.as_str())
            .bind(next.as_str())
            .bind(message)
            .fetch_optional(&self.pool)
            .await?
            .map(Batch::try_from)
            .transpose()
    }

    async fn delete_batch(&self, batch_id: BatchId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bulkgen_batches WHERE batch_id = $1")
            .bind(batch_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RowLedger for PgStore {
    async fn mark_pending(&self, batch_id: BatchId, rows: Vec<RowInput>) -> Result<Vec<RowLedgerEntry>> {
        let mut tx = self.pool.begin().await?;

        // Locking the batch row serializes concurrent bulk creates for it
        let locked: Option<(Uuid,)> =
            sqlx::query_as("SELECT batch_id FROM bulkgen_batches WHERE batch_id = $1 FOR UPDATE")
                .bind(batch_id.0)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(BulkgenError::BatchNotFound(batch_id));
        }

        let has_entries: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM bulkgen_row_ledger_entries WHERE batch_id = $1)",
        )
        .bind(batch_id.0)
        .fetch_one(&mut *tx)
        .await?;
        if has_entries.0 {
            return Err(BulkgenError::DuplicateBatch { batch_id });
        }

        let row_ids: Vec<String> = (0..rows.len())
            .map(|offset| RowId::new(batch_id, offset).to_string())
            .collect();
        let offsets: Vec<i64> = (0..rows.len() as i64).collect();
        let inputs: Vec<Value> = rows.into_iter().map(Value::Object).collect();

        let query = format!(
            "INSERT INTO bulkgen_row_ledger_entries (batch_id, row_id, row_offset, input) \
             SELECT $1, row_id, row_offset, input \
             FROM UNNEST($2::VARCHAR[], $3::BIGINT[], $4::JSONB[]) AS t(row_id, row_offset, input) \
             RETURNING {ROW_COLUMNS}"
        );
        let mut inserted = sqlx::query_as::<_, LedgerRow>(&query)
            .bind(batch_id.0)
            .bind(&row_ids)
            .bind(&offsets)
            .bind(&inputs)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    BulkgenError::DuplicateBatch { batch_id }
                }
                other => other.into(),
            })?;
        inserted.sort_by_key(|row| row.row_offset);

        sqlx::query(
            "UPDATE bulkgen_batches SET remaining_rows = $2, error_rows = 0 WHERE batch_id = $1",
        )
        .bind(batch_id.0)
        .bind(inserted.len() as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(batch_id = %batch_id, rows = inserted.len(), "📒 Row ledger entries created");

        inserted.into_iter().map(RowLedgerEntry::try_from).collect()
    }

    async fn update_row(
        &self,
        batch_id: BatchId,
        row_id: &RowId,
        update: RowUpdate,
    ) -> Result<RowUpdateOutcome> {
        let mut tx = self.pool.begin().await?;

        let error = if update.status == RowState::Error {
            update.error
        } else {
            None
        };

        let applied: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE bulkgen_row_ledger_entries
            SET status = $3, output = COALESCE($4, output), error = $5, updated_at = NOW()
            WHERE batch_id = $1 AND row_id = $2 AND status NOT IN ('success', 'error')
            RETURNING status
            "#,
        )
        .bind(batch_id.0)
        .bind(row_id.as_str())
        .bind(update.status.as_str())
        .bind(update.output)
        .bind(error)
        .fetch_optional(&mut *tx)
        .await?;

        if applied.is_none() {
            let current: Option<(String,)> = sqlx::query_as(
                "SELECT status FROM bulkgen_row_ledger_entries WHERE batch_id = $1 AND row_id = $2",
            )
            .bind(batch_id.0)
            .bind(row_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
            tx.commit().await?;

            return match current {
                Some((status,)) => Ok(RowUpdateOutcome::Unchanged {
                    current: status.parse().map_err(BulkgenError::StoreError)?,
                }),
                None => Err(BulkgenError::RowNotFound {
                    batch_id,
                    row_id: row_id.clone(),
                }),
            };
        }

        let (remaining, error_rows): (i64, i64) = if update.status.is_terminal() {
            let error_increment: i64 = i64::from(update.status == RowState::Error);
            sqlx::query_as(
                r#"
                UPDATE bulkgen_batches
                SET remaining_rows = remaining_rows - 1, error_rows = error_rows + $2
                WHERE batch_id = $1
                RETURNING remaining_rows, error_rows
                "#,
            )
            .bind(batch_id.0)
            .bind(error_increment)
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query_as(
                "SELECT remaining_rows, error_rows FROM bulkgen_batches WHERE batch_id = $1",
            )
            .bind(batch_id.0)
            .fetch_one(&mut *tx)
            .await?
        };

        tx.commit().await?;

        Ok(RowUpdateOutcome::Applied {
            remaining: remaining as usize,
            error_rows: error_rows as usize,
        })
    }

    async fn list_rows(&self, batch_id: BatchId) -> Result<Vec<RowLedgerEntry>> {
        let query = format!(
            "SELECT {ROW_COLUMNS} FROM bulkgen_row_ledger_entries \
             WHERE batch_id = $1 ORDER BY row_offset"
        );
        sqlx::query_as::<_, LedgerRow>(&query)
            .bind(batch_id.0)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(RowLedgerEntry::try_from)
            .collect()
    }

    async fn row_counts(&self, batch_id: BatchId) -> Result<RowCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)
            FROM bulkgen_row_ledger_entries
            WHERE batch_id = $1
            GROUP BY status
            "#,
        )
        .bind(batch_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = RowCounts::default();
        for (status, count) in rows {
            let status: RowState = status.parse().map_err(BulkgenError::StoreError)?;
            let count = count as usize;
            counts.total += count;
            match status {
                RowState::Pending => counts.pending += count,
                RowState::Processing => counts.processing += count,
                RowState::Success => counts.succeeded += count,
                RowState::Error => counts.failed += count,
            }
        }
        Ok(counts)
    }
}
