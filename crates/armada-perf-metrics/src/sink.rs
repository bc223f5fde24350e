//! Destinations for summarised metric batches.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::annotation::BomAnnotation;
use crate::error::MetricsResult;
use crate::summary::BatchSummary;

/// Run-level labels attached to every batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkContext {
    /// Nothing is written without a test name
    pub test_name: String,
    pub machine_type: String,
    /// Kube version clusters are currently created with
    pub kube_version: String,
}

/// Accepts batches of named samples and persists them.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn write_batch(&self, summary: &BatchSummary, context: &SinkContext) -> MetricsResult<()>;

    /// Record a BOM version. Returns `true` when a new annotation was stored,
    /// `false` when the version was already the latest one recorded.
    async fn annotate_bom(&self, annotation: &BomAnnotation) -> MetricsResult<bool>;
}

/// Keeps everything in memory. Handy for dry runs and assertions.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<(BatchSummary, SinkContext)>>>,
    annotations: Arc<Mutex<Vec<BomAnnotation>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<BatchSummary> {
        self.batches.lock().iter().map(|(b, _)| b.clone()).collect()
    }

    pub fn annotations(&self) -> Vec<BomAnnotation> {
        self.annotations.lock().clone()
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn write_batch(&self, summary: &BatchSummary, context: &SinkContext) -> MetricsResult<()> {
        tracing::debug!(
            prefix = %summary.prefix,
            samples = summary.samples.len(),
            "Buffered metrics batch in memory"
        );
        self.batches.lock().push((summary.clone(), context.clone()));
        Ok(())
    }

    async fn annotate_bom(&self, annotation: &BomAnnotation) -> MetricsResult<bool> {
        let mut annotations = self.annotations.lock();
        let previous = annotations
            .iter()
            .rev()
            .find(|a| {
                a.kind == annotation.kind
                    && a.carrier_name == annotation.carrier_name
                    && a.kube_major_minor() == annotation.kube_major_minor()
            })
            .map(|a| a.bom.clone());

        if previous.as_deref() == Some(annotation.bom.as_str()) {
            return Ok(false);
        }
        annotations.push(annotation.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::BomType;
    use chrono::Utc;

    fn annotation(bom: &str) -> BomAnnotation {
        BomAnnotation {
            carrier_name: "carrier1".to_string(),
            bom: bom.to_string(),
            kind: BomType::Master,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_sink_only_records_changed_bom() {
        let sink = MemorySink::new();
        assert!(sink.annotate_bom(&annotation("1.30.1_1500")).await.unwrap());
        assert!(!sink.annotate_bom(&annotation("1.30.1_1500")).await.unwrap());
        assert!(sink.annotate_bom(&annotation("1.30.2_1510")).await.unwrap());
        assert_eq!(sink.annotations().len(), 2);
    }
}
