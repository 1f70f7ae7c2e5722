use crate::obs::sink::{MetricsEvent, MetricsSink, ScanKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// StorageOps
/// Process-wide totals.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageOps {
    // Write path
    pub bulk_writes: u64,
    pub inserts: u64,
    pub updates: u64,
    pub conflicts: u64,

    // Index maintenance
    pub index_inserts: u64,
    pub index_removes: u64,

    // Read path
    pub rows_scanned: u64,
    pub point_lookups: u64,
    pub range_scans: u64,
    pub read_retries: u64,

    // Cleanup
    pub purged: u64,
}

///
/// CollectionCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CollectionCounters {
    pub bulk_writes: u64,
    pub conflicts: u64,
    pub rows_scanned: u64,
    pub purged: u64,
}

///
/// MetricsReport
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MetricsReport {
    pub ops: StorageOps,
    pub collections: BTreeMap<String, CollectionCounters>,
}

///
/// StorageMetrics
///
/// Default sink: in-memory counters, reported on demand.
///

#[derive(Debug, Default)]
pub struct StorageMetrics {
    state: Mutex<MetricsReport>,
}

impl StorageMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn report(&self) -> MetricsReport {
        self.state.lock().clone()
    }

    pub fn reset(&self) {
        *self.state.lock() = MetricsReport::default();
    }
}

impl MetricsSink for StorageMetrics {
    fn record(&self, event: MetricsEvent<'_>) {
        let mut state = self.state.lock();
        let MetricsReport { ops, collections } = &mut *state;
        let entry = collections
            .entry(event.collection().to_string())
            .or_default();

        match event {
            MetricsEvent::BulkWrite {
                inserts,
                updates,
                conflicts,
                ..
            } => {
                ops.bulk_writes = ops.bulk_writes.saturating_add(1);
                ops.inserts = ops.inserts.saturating_add(inserts);
                ops.updates = ops.updates.saturating_add(updates);
                ops.conflicts = ops.conflicts.saturating_add(conflicts);
                entry.bulk_writes = entry.bulk_writes.saturating_add(1);
                entry.conflicts = entry.conflicts.saturating_add(conflicts);
            }

            MetricsEvent::IndexDelta {
                inserts, removes, ..
            } => {
                ops.index_inserts = ops.index_inserts.saturating_add(inserts);
                ops.index_removes = ops.index_removes.saturating_add(removes);
            }

            MetricsEvent::Scan {
                kind, rows_scanned, ..
            } => {
                match kind {
                    ScanKind::Point => ops.point_lookups = ops.point_lookups.saturating_add(1),
                    ScanKind::Range => ops.range_scans = ops.range_scans.saturating_add(1),
                    ScanKind::Empty => {}
                }
                ops.rows_scanned = ops.rows_scanned.saturating_add(rows_scanned);
                entry.rows_scanned = entry.rows_scanned.saturating_add(rows_scanned);
            }

            MetricsEvent::ReadRetry { .. } => {
                ops.read_retries = ops.read_retries.saturating_add(1);
            }

            MetricsEvent::Purged { documents, .. } => {
                ops.purged = ops.purged.saturating_add(documents);
                entry.purged = entry.purged.saturating_add(documents);
            }
        }
    }
}

///
/// TESTS
///
