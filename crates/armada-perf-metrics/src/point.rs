//! Time-series points and their InfluxDB line-protocol rendering.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::sink::SinkContext;
use crate::summary::BatchSummary;

/// Every summarised sample is tagged with this metric type.
pub const CUSTOM_METRIC_TYPE: &str = "custom";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Text(String),
}

/// One point as written to the store, or to a fallback file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    #[serde(rename = "DBTableName")]
    pub measurement: String,
    #[serde(rename = "Tags")]
    pub tags: BTreeMap<String, String>,
    #[serde(rename = "Fields")]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(rename = "TimeStamp")]
    pub timestamp: DateTime<Utc>,
}

/// Write precision for line-protocol timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Seconds,
    Millis,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Seconds => "s",
            Precision::Millis => "ms",
        }
    }
}

/// Make a name usable as a measurement or field key.
///
/// `.sparse-avg` is dropped and `-` `.` `(` and spaces become `_`;
/// closing parentheses disappear.
pub fn sanitize_name(name: &str) -> String {
    name.replace(".sparse-avg", "")
        .chars()
        .filter(|c| *c != ')')
        .map(|c| match c {
            '-' | '.' | '(' | ' ' => '_',
            other => other,
        })
        .collect()
}

fn escape_key(out: &mut String, s: &str) {
    for c in s.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn escape_measurement(out: &mut String, s: &str) {
    for c in s.chars() {
        if matches!(c, ',' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
}

impl Point {
    /// Render one line of line protocol. Empty tag values are omitted and
    /// non-finite float fields are skipped; `None` if no field survives.
    pub fn to_line(&self, precision: Precision) -> Option<String> {
        let mut line = String::new();
        escape_measurement(&mut line, &self.measurement);

        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            line.push(',');
            escape_key(&mut line, key);
            line.push('=');
            escape_key(&mut line, value);
        }

        let mut first = true;
        for (key, value) in &self.fields {
            if let FieldValue::Float(v) = value {
                if !v.is_finite() {
                    continue;
                }
            }
            line.push(if first { ' ' } else { ',' });
            first = false;
            escape_key(&mut line, key);
            line.push('=');
            match value {
                FieldValue::Float(v) => {
                    let _ = write!(line, "{}", v);
                }
                FieldValue::Text(s) => {
                    line.push('"');
                    for c in s.chars() {
                        if matches!(c, '"' | '\\') {
                            line.push('\\');
                        }
                        line.push(c);
                    }
                    line.push('"');
                }
            }
        }
        if first {
            return None;
        }

        let ts = match precision {
            Precision::Seconds => self.timestamp.timestamp(),
            Precision::Millis => self.timestamp.timestamp_millis(),
        };
        let _ = write!(line, " {}", ts);
        Some(line)
    }
}

/// Join points into a line-protocol request body.
pub fn to_line_protocol(points: &[Point], precision: Precision) -> String {
    points
        .iter()
        .filter_map(|p| p.to_line(precision))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convert a summarised batch into tagged points.
///
/// A cluster name embedded in a sample name is lifted out into the
/// `ClusterName` tag, and the test name prefix is stripped from the field.
pub fn batch_points(summary: &BatchSummary, context: &SinkContext, carrier_name: &str) -> Vec<Point> {
    let measurement = sanitize_name(&context.test_name);
    let test_prefix = format!("{}_", measurement);
    let now = Utc::now();

    summary
        .samples
        .iter()
        .map(|sample| {
            let mut metric_name = sample.name.clone();
            let mut cluster_tag = String::new();
            for cluster in &summary.cluster_names {
                if metric_name.contains(cluster.as_str()) {
                    cluster_tag = cluster.clone();
                    metric_name = metric_name.replacen(&format!("{}.", cluster), "", 1);
                }
            }

            let short_name = sanitize_name(&metric_name).replacen(&test_prefix, "", 1);

            let mut tags = BTreeMap::new();
            tags.insert("CarrierName".to_string(), carrier_name.to_string());
            tags.insert("MachineType".to_string(), context.machine_type.clone());
            tags.insert("KubeVersion".to_string(), context.kube_version.clone());
            tags.insert("TestName".to_string(), context.test_name.clone());
            tags.insert("MetricName".to_string(), short_name.clone());
            tags.insert("MetricType".to_string(), CUSTOM_METRIC_TYPE.to_string());
            tags.insert("ClusterName".to_string(), cluster_tag);

            let mut fields = BTreeMap::new();
            fields.insert(short_name, FieldValue::Float(sample.value));

            let timestamp = sample
                .timestamp
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .unwrap_or(now);

            Point {
                measurement: measurement.clone(),
                tags,
                fields,
                timestamp,
            }
        })
        .collect()
}
