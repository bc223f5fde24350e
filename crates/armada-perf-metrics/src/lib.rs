//! Metric collection, summarisation and delivery for the perf harness.

pub mod annotation;
pub mod batch;
pub mod error;
pub mod file;
pub mod influx;
pub mod point;
pub mod sample;
pub mod sink;
pub mod summary;

pub use annotation::{BomAnnotation, BomType};
pub use batch::{MetricsBatcher, TRACKED_ACTIONS};
pub use error::{MetricsError, MetricsResult};
pub use file::FileSink;
pub use influx::InfluxSink;
pub use point::{sanitize_name, Point, Precision};
pub use sample::{MetricSample, RequestMetric, WorkerMetrics, WorkerStates};
pub use sink::{MemorySink, MetricsSink, SinkContext};
pub use summary::{metric_prefix, percentile, summarize, BatchSummary};
