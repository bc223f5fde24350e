//! InfluxDB 1.x sink over the HTTP write/query endpoints.

use armada_perf_core::MetricsConfig;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::annotation::BomAnnotation;
use crate::error::{MetricsError, MetricsResult};
use crate::file::FileSink;
use crate::point::{batch_points, to_line_protocol, FieldValue, Point, Precision};
use crate::sink::{MetricsSink, SinkContext};
use crate::summary::BatchSummary;

/// Measurement holding Grafana BOM annotations.
pub const BOM_EVENTS_TABLE: &str = "bomEvents";

const INFLUX_TIMEOUT: Duration = Duration::from_secs(300);

/// Writes batches to InfluxDB, falling back to files when no password is
/// configured or the server cannot be reached.
pub struct InfluxSink {
    client: reqwest::Client,
    base_url: String,
    database: String,
    user: String,
    password: Option<String>,
    carrier_name: String,
    fallback: FileSink,
}

impl InfluxSink {
    pub fn new(config: &MetricsConfig) -> MetricsResult<Self> {
        let client = reqwest::Client::builder().timeout(INFLUX_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: format!("http://{}:{}", config.influx_host, config.influx_port),
            database: config.influx_database.clone(),
            user: config.influx_user.clone(),
            password: config.influx_password.clone().filter(|p| !p.is_empty()),
            carrier_name: config.carrier_name.clone(),
            fallback: FileSink::new(&config.fallback_dir, &config.carrier_name),
        })
    }

    fn password(&self) -> MetricsResult<&str> {
        self.password
            .as_deref()
            .ok_or_else(|| MetricsError::NotConfigured("no InfluxDB password".to_string()))
    }

    async fn write_lines(&self, body: String, precision: Precision) -> MetricsResult<()> {
        let response = self
            .client
            .post(format!("{}/write", self.base_url))
            .basic_auth(&self.user, Some(self.password()?))
            .query(&[("db", self.database.as_str()), ("precision", precision.as_str())])
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetricsError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Latest BOM recorded for the annotation's type, version and carrier.
    async fn previous_bom(&self, annotation: &BomAnnotation) -> MetricsResult<Option<String>> {
        let query = format!(
            "SELECT last(bom) FROM {} where resourceType='{}' and kubeVersion='{}' and carrierName='{}'",
            BOM_EVENTS_TABLE,
            annotation.kind,
            annotation.kube_major_minor(),
            annotation.carrier_name
        );
        tracing::debug!(query = %query, "Querying InfluxDB");

        let response = self
            .client
            .get(format!("{}/query", self.base_url))
            .basic_auth(&self.user, Some(self.password()?))
            .query(&[("db", self.database.as_str()), ("q", query.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetricsError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        let previous = json["results"][0]["series"][0]["values"]
            .as_array()
            .and_then(|rows| rows.last())
            .and_then(|row| row.get(1))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(previous)
    }
}

#[async_trait]
impl MetricsSink for InfluxSink {
    async fn write_batch(&self, summary: &BatchSummary, context: &SinkContext) -> MetricsResult<()> {
        if context.test_name.is_empty() {
            tracing::info!("No test name specified, metrics will not be sent to InfluxDB");
            return Ok(());
        }

        if self.password.is_none() {
            tracing::info!("No DB password specified, writing metrics to a local file");
            return self.fallback.write_batch(summary, context).await;
        }

        let points = batch_points(summary, context, &self.carrier_name);
        for point in &points {
            tracing::debug!(
                table = %point.measurement,
                metric = point.tags.get("MetricName").map(String::as_str).unwrap_or_default(),
                "Metric point"
            );
        }

        match self
            .write_lines(to_line_protocol(&points, Precision::Millis), Precision::Millis)
            .await
        {
            Ok(()) => {
                tracing::info!(prefix = %summary.prefix, points = points.len(), "Metrics sent to InfluxDB");
                Ok(())
            }
            Err(MetricsError::Http(e)) if e.is_connect() || e.is_timeout() => {
                tracing::warn!(error = %e, "InfluxDB unreachable, writing metrics to a local file");
                self.fallback
                    .write_points(&context.test_name, &points)
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    async fn annotate_bom(&self, annotation: &BomAnnotation) -> MetricsResult<bool> {
        let previous = self.previous_bom(annotation).await?;
        tracing::debug!(
            previous = previous.as_deref().unwrap_or_default(),
            current = %annotation.bom,
            "Comparing BOM versions"
        );
        if previous.as_deref() == Some(annotation.bom.as_str()) {
            return Ok(false);
        }

        tracing::info!(kind = %annotation.kind, bom = %annotation.bom, "New BOM");
        let timestamp = if annotation.timestamp.timestamp() == 0 {
            Utc::now()
        } else {
            annotation.timestamp
        };

        let mut tags = BTreeMap::new();
        tags.insert("carrierName".to_string(), annotation.carrier_name.clone());
        tags.insert("kubeVersion".to_string(), annotation.kube_major_minor());

        let mut fields = BTreeMap::new();
        fields.insert(
            "title".to_string(),
            FieldValue::Text(format!("BOM Update - {}", annotation.carrier_name)),
        );
        fields.insert("bom".to_string(), FieldValue::Text(annotation.bom.clone()));
        fields.insert(
            "resourceType".to_string(),
            FieldValue::Text(annotation.kind.to_string()),
        );

        let point = Point {
            measurement: BOM_EVENTS_TABLE.to_string(),
            tags,
            fields,
            timestamp,
        };
        self.write_lines(to_line_protocol(&[point], Precision::Seconds), Precision::Seconds)
            .await?;
        tracing::info!("Grafana annotation written to InfluxDB");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::BomType;
    use crate::sample::MetricSample;
    use armada_perf_core::ActionType;
    use tempfile::TempDir;

    fn config(dir: &std::path::Path) -> MetricsConfig {
        MetricsConfig {
            influx_host: "127.0.0.1".to_string(),
            influx_port: 1,
            influx_database: "perf".to_string(),
            influx_user: "perf".to_string(),
            influx_password: None,
            carrier_name: "carrier1".to_string(),
            fallback_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_no_password_falls_back_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let sink = InfluxSink::new(&config(temp_dir.path())).unwrap();
        let summary = BatchSummary {
            action: ActionType::UpdateCluster,
            prefix: "armada_api.UpdateCluster".to_string(),
            samples: vec![MetricSample::new("armada_api.UpdateCluster.Failed_Action_Count", 1.0)],
            cluster_names: Vec::new(),
        };
        let context = SinkContext {
            test_name: "cruiserchurn".to_string(),
            ..Default::default()
        };

        sink.write_batch(&summary, &context).await.unwrap();
        assert!(temp_dir.path().join("cruiserchurn1.json").exists());
    }

    #[tokio::test]
    async fn test_annotation_requires_password() {
        let temp_dir = TempDir::new().unwrap();
        let sink = InfluxSink::new(&config(temp_dir.path())).unwrap();
        let annotation = BomAnnotation {
            carrier_name: "carrier1".to_string(),
            bom: "1.30.4_1536".to_string(),
            kind: BomType::Worker,
            timestamp: Utc::now(),
        };
        assert!(matches!(
            sink.annotate_bom(&annotation).await,
            Err(MetricsError::NotConfigured(_))
        ));
    }
}
