//! Local JSON files used when the time-series store is out of reach.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::annotation::BomAnnotation;
use crate::error::{MetricsError, MetricsResult};
use crate::point::{batch_points, Point};
use crate::sink::{MetricsSink, SinkContext};
use crate::summary::BatchSummary;

#[derive(Serialize)]
struct PointFile<'a> {
    #[serde(rename = "influxMetricArray")]
    points: &'a [Point],
}

/// Writes each batch to `<dir>/<test><N>.json`, N being the first unused
/// number starting from 1.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    carrier_name: String,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, carrier_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            carrier_name: carrier_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn next_path(&self, test_name: &str) -> MetricsResult<PathBuf> {
        let mut n = 1u32;
        loop {
            let candidate = self.dir.join(format!("{}{}.json", test_name, n));
            if !tokio::fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Persist points, returning the file written.
    pub async fn write_points(&self, test_name: &str, points: &[Point]) -> MetricsResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.next_path(test_name).await?;
        let body = serde_json::to_vec_pretty(&PointFile { points })?;
        tokio::fs::write(&path, body).await?;
        tracing::info!(path = %path.display(), points = points.len(), "Wrote metrics to file");
        Ok(path)
    }
}

#[async_trait]
impl MetricsSink for FileSink {
    async fn write_batch(&self, summary: &BatchSummary, context: &SinkContext) -> MetricsResult<()> {
        if context.test_name.is_empty() {
            tracing::info!("No test name specified, metrics will not be written");
            return Ok(());
        }
        let points = batch_points(summary, context, &self.carrier_name);
        self.write_points(&context.test_name, &points).await?;
        Ok(())
    }

    async fn annotate_bom(&self, _annotation: &BomAnnotation) -> MetricsResult<bool> {
        Err(MetricsError::NotConfigured(
            "BOM annotations need an InfluxDB endpoint".to_string(),
        ))
    }
}
