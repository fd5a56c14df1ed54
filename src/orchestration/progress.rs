//! # Progress Aggregator
//!
//! Derives completion percentage, throughput and ETA from ledger tallies.
//! Nothing here is stored; a snapshot is computed for every status poll.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Batch, RowCounts};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Rows in a terminal state (success or error)
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
    /// 0..=100; exactly 100 only once every row is processed
    pub percent: u8,
    pub rows_per_second: f64,
    pub eta_seconds: Option<u64>,
}

impl ProgressSnapshot {
    pub fn compute(batch: &Batch, counts: &RowCounts, now: DateTime<Utc>) -> Self {
        let processed = counts.processed();
        let total = batch.total_rows.max(counts.total);

        let elapsed_seconds = (now - batch.created_at).num_milliseconds() as f64 / 1000.0;
        let rows_per_second = if elapsed_seconds > 0.0 {
            processed as f64 / elapsed_seconds
        } else {
            0.0
        };

        let eta_seconds = if processed == 0 || rows_per_second <= 0.0 {
            None
        } else {
            let remaining = total.saturating_sub(processed) as f64;
            Some((remaining / rows_per_second).ceil() as u64)
        };

        Self {
            processed,
            succeeded: counts.succeeded,
            failed: counts.failed,
            total,
            percent: percent(processed, total),
            rows_per_second,
            eta_seconds,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.processed >= self.total
    }
}

/// Rounded completion percentage, held at 99 until the last row lands
pub fn percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    if processed >= total {
        return 100;
    }
    let rounded = (processed as f64 * 100.0 / total as f64).round() as u8;
    rounded.min(99)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchId, NewBatch};
    use chrono::Duration;
    use serde_json::json;

    fn batch(total_rows: usize, created_at: DateTime<Utc>) -> Batch {
        let request = NewBatch::new("{{x}}", vec![json!({}); total_rows]);
        Batch::new_pending(BatchId::new(), &request, total_rows, created_at)
    }

    fn counts(total: usize, succeeded: usize, failed: usize) -> RowCounts {
        RowCounts {
            total,
            pending: total - succeeded - failed,
            processing: 0,
            succeeded,
            failed,
        }
    }

    #[test]
    fn test_percent_rounding_and_cap() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(0, 10), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        // 199/200 rounds to 100 but the batch is not done
        assert_eq!(percent(199, 200), 99);
        assert_eq!(percent(200, 200), 100);
    }

    #[test]
    fn test_no_eta_before_first_row() {
        let now = Utc::now();
        let snapshot = ProgressSnapshot::compute(&batch(10, now - Duration::seconds(30)), &counts(10, 0, 0), now);
        assert_eq!(snapshot.processed, 0);
        assert_eq!(snapshot.percent, 0);
        assert_eq!(snapshot.eta_seconds, None);
    }

    #[test]
    fn test_eta_from_throughput() {
        let now = Utc::now();
        // 4 rows in 20 seconds, 6 remaining at 0.2 rows/s
        let snapshot = ProgressSnapshot::compute(&batch(10, now - Duration::seconds(20)), &counts(10, 3, 1), now);
        assert_eq!(snapshot.processed, 4);
        assert_eq!(snapshot.succeeded, 3);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.percent, 40);
        assert!((snapshot.rows_per_second - 0.2).abs() < 1e-9);
        assert_eq!(snapshot.eta_seconds, Some(30));
    }

    #[test]
    fn test_no_eta_without_elapsed_time() {
        let now = Utc::now();
        let snapshot = ProgressSnapshot::compute(&batch(4, now), &counts(4, 2, 0), now);
        assert_eq!(snapshot.eta_seconds, None);
        assert_eq!(snapshot.rows_per_second, 0.0);
    }

    #[test]
    fn test_complete_batch() {
        let now = Utc::now();
        let snapshot = ProgressSnapshot::compute(&batch(2, now - Duration::seconds(5)), &counts(2, 1, 1), now);
        assert!(snapshot.is_complete());
        assert_eq!(snapshot.percent, 100);
        assert_eq!(snapshot.eta_seconds, Some(0));
    }
}
