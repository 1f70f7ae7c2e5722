//! Observability: runtime telemetry and the sink abstraction.
//!
//! Storage code never touches counters directly; all instrumentation flows
//! through `MetricsEvent` and a `MetricsSink` owned by the storage registry.

mod metrics;
mod sink;

pub use metrics::{CollectionCounters, MetricsReport, StorageMetrics, StorageOps};
pub use sink::{MetricsEvent, MetricsSink, NoopMetricsSink, ScanKind};
