//! Metrics sink boundary.
//!
//! Core storage logic MUST NOT depend on obs::metrics directly.

///
/// ScanKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanKind {
    Point,
    Range,
    Empty,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    BulkWrite {
        collection: &'a str,
        inserts: u64,
        updates: u64,
        conflicts: u64,
    },
    IndexDelta {
        collection: &'a str,
        inserts: u64,
        removes: u64,
    },
    Scan {
        collection: &'a str,
        kind: ScanKind,
        rows_scanned: u64,
    },
    ReadRetry {
        collection: &'a str,
    },
    Purged {
        collection: &'a str,
        documents: u64,
    },
}

impl MetricsEvent<'_> {
    #[must_use]
    pub const fn collection(&self) -> &str {
        match self {
            Self::BulkWrite { collection, .. }
            | Self::IndexDelta { collection, .. }
            | Self::Scan { collection, .. }
            | Self::ReadRetry { collection }
            | Self::Purged { collection, .. } => *collection,
        }
    }
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

///
/// NoopMetricsSink
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _event: MetricsEvent<'_>) {}
}
