//! Metrics instrumentation for radix-store.
//!
//! Uses the `metrics` crate for backend-agnostic collection; the embedding
//! process picks the exporter. All metrics carry the `radix_store_` prefix,
//! counters end in `_total`, duration histograms in `_seconds`.

use metrics::{counter, histogram};
use std::time::Instant;

/// Count one engine operation.
pub fn record_operation(operation: &'static str) {
    counter!("radix_store_operations_total", "operation" => operation).increment(1);
}

/// Count one record queued for the operation log.
pub(crate) fn record_log_append() {
    counter!("radix_store_log_records_total").increment(1);
}

/// Count records applied by a replay.
pub(crate) fn record_replayed(count: usize) {
    counter!("radix_store_replayed_records_total").increment(count as u64);
}

/// Count a truncated trailing record dropped during replay.
pub(crate) fn record_truncation_discard() {
    counter!("radix_store_log_truncation_discards_total").increment(1);
}

/// A timing guard that records latency on drop.
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(
            "radix_store_operation_seconds",
            "operation" => self.operation
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}
