//! Reduce a batch of per-request measurements to named samples.

use armada_perf_core::ActionType;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{MetricsError, MetricsResult};
use crate::sample::{MetricSample, RequestMetric};

/// Samples derived from one batch, plus what the sink needs to tag them.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub action: ActionType,
    /// `armada_api[.workers_N].<Action>`
    pub prefix: String,
    pub samples: Vec<MetricSample>,
    /// Clusters whose names appear inside sample names
    pub cluster_names: Vec<String>,
}

/// Percentile of an ascending series.
///
/// When `pcnt * n` lands exactly on a boundary the two neighbouring values
/// are averaged, otherwise the nearest-rank value is used.
pub fn percentile(sorted: &[f64], pcnt: u32) -> MetricsResult<f64> {
    if pcnt > 100 {
        return Err(MetricsError::InvalidPercentile(pcnt));
    }
    let n = sorted.len();
    if n == 0 {
        return Err(MetricsError::EmptySeries);
    }

    let scaled = pcnt as usize * n;
    if n > 1 && scaled % 100 == 0 && scaled > 0 {
        let pos = scaled / 100;
        if pos < n {
            return Ok((sorted[pos - 1] + sorted[pos]) / 2.0);
        }
    }

    let rank = ((pcnt as f64 / 100.0) * n as f64).ceil() as usize;
    Ok(sorted[rank.max(1) - 1])
}

/// Metric name prefix for an action. Worker-creating actions carry the
/// worker count so different cluster sizes chart separately.
pub fn metric_prefix(action: ActionType, worker_count: i64) -> String {
    if action.worker_creation() {
        format!("armada_api.workers_{}.{}", worker_count.max(0), action)
    } else {
        format!("armada_api.{}", action)
    }
}

#[derive(Debug, Clone, Copy)]
struct StateTimes {
    min: Duration,
    max: Duration,
    total: Duration,
}

/// Summarise a batch of request metrics for one action.
///
/// Returns `None` for an empty batch.
pub fn summarize(
    action: ActionType,
    worker_count: i64,
    metrics: &[RequestMetric],
) -> Option<BatchSummary> {
    if metrics.is_empty() {
        tracing::info!(action = %action, "No metrics supplied for batch");
        return None;
    }

    let prefix = metric_prefix(action, worker_count);
    let mut samples = Vec::new();
    let mut cluster_names: Vec<String> = Vec::new();

    let mut response_times = Vec::with_capacity(metrics.len());
    let mut action_times = Vec::new();
    let mut total_response = Duration::ZERO;
    let mut total_action = Duration::ZERO;
    let mut action_failures = 0usize;
    let mut backend_failures = 0usize;

    for metric in metrics {
        if !metric.cluster_name.is_empty() && !cluster_names.contains(&metric.cluster_name) {
            cluster_names.push(metric.cluster_name.clone());
        }

        response_times.push(metric.response_time.as_secs_f64());
        total_response += metric.response_time;

        if metric.action_failed {
            action_failures += 1;
            if metric.backend_failed {
                backend_failures += 1;
            }
        } else if metric.action_time > Duration::ZERO {
            action_times.push(metric.action_time.as_secs_f64());
            total_action += metric.action_time;
        }

        let cluster_prefix = format!("{}.{}", prefix, metric.cluster_name);

        for tick in &metric.workers {
            samples.push(MetricSample::at(
                format!("{}.Worker_Count.max", cluster_prefix),
                tick.metric_time,
                tick.workers_created as f64,
            ));
        }

        let total_workers = metric.worker_creation_times.len();
        if total_workers == 0 {
            continue;
        }

        let creation: Vec<f64> = metric.worker_creation_times.values().copied().collect();
        let min_creation = creation.iter().copied().fold(f64::MAX, f64::min);
        let max_creation = creation.iter().copied().fold(0.0, f64::max);
        let mean_creation = creation.iter().sum::<f64>() / total_workers as f64;

        samples.push(MetricSample::new(
            format!("{}.Min_Worker_Creation_Time.min", cluster_prefix),
            min_creation,
        ));
        samples.push(MetricSample::new(
            format!("{}.Max_Worker_Creation_Time.max", cluster_prefix),
            max_creation,
        ));
        samples.push(MetricSample::new(
            format!("{}.Mean_Worker_Creation_Time.sparse-avg", cluster_prefix),
            mean_creation,
        ));

        // BTreeMap keeps the per-state output stable
        let mut by_state: BTreeMap<&str, StateTimes> = BTreeMap::new();
        for worker in metric.worker_states.values() {
            for (state, duration) in &worker.durations {
                by_state
                    .entry(state.as_str())
                    .and_modify(|times| {
                        times.min = times.min.min(*duration);
                        times.max = times.max.max(*duration);
                        times.total += *duration;
                    })
                    .or_insert(StateTimes {
                        min: *duration,
                        max: *duration,
                        total: *duration,
                    });
            }
        }

        for (state, times) in by_state {
            let state_prefix = format!("{}.{}.duration", cluster_prefix, state);
            samples.push(MetricSample::new(
                format!("{}.min", state_prefix),
                times.min.as_secs_f64(),
            ));
            samples.push(MetricSample::new(
                format!("{}.max", state_prefix),
                times.max.as_secs_f64(),
            ));
            samples.push(MetricSample::new(
                format!("{}.sparse-avg", state_prefix),
                times.total.as_secs_f64() / total_workers as f64,
            ));
        }
    }

    response_times.sort_by(f64::total_cmp);
    let count = response_times.len();
    samples.push(MetricSample::new(
        format!("{}.Min_Response_Time.min", prefix),
        response_times[0],
    ));
    samples.push(MetricSample::new(
        format!("{}.Max_Response_Time.max", prefix),
        response_times[count - 1],
    ));
    samples.push(MetricSample::new(
        format!("{}.Mean_Response_Time.sparse-avg", prefix),
        total_response.as_secs_f64() / count as f64,
    ));
    if let Ok(p90) = percentile(&response_times, 90) {
        samples.push(MetricSample::new(
            format!("{}.P90_Response_Time.sparse-avg", prefix),
            p90,
        ));
    }

    if !action_times.is_empty() {
        action_times.sort_by(f64::total_cmp);
        let completed = action_times.len();
        samples.push(MetricSample::new(
            format!("{}.Min_Action_Time.min", prefix),
            action_times[0],
        ));
        samples.push(MetricSample::new(
            format!("{}.Max_Action_Time.max", prefix),
            action_times[completed - 1],
        ));
        samples.push(MetricSample::new(
            format!("{}.Mean_Action_Time.sparse-avg", prefix),
            total_action.as_secs_f64() / completed as f64,
        ));
        if let Ok(p90) = percentile(&action_times, 90) {
            samples.push(MetricSample::new(
                format!("{}.P90_Action_Time.sparse-avg", prefix),
                p90,
            ));
        }
    }

    if action_failures > 0 {
        samples.push(MetricSample::new(
            format!("{}.Failed_Action_Count", prefix),
            action_failures as f64,
        ));
    }

    if backend_failures > 0 {
        samples.push(MetricSample::new(
            format!("{}.Failed_Backend_Count", prefix),
            backend_failures as f64,
        ));
    }

    Some(BatchSummary {
        action,
        prefix,
        samples,
        cluster_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{WorkerMetrics, WorkerStates};
    use std::collections::HashMap;

    fn value(summary: &BatchSummary, name: &str) -> Option<f64> {
        summary
            .samples
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.value)
    }

    fn timed(response_secs: u64, action_secs: u64) -> RequestMetric {
        RequestMetric {
            cluster_name: String::new(),
            response_time: Duration::from_secs(response_secs),
            action_time: Duration::from_secs(action_secs),
            ..Default::default()
        }
    }

    #[test]
    fn test_percentile_averages_on_exact_boundary() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        // 90 * 10 = 900, divisible by 100: mean of 9th and 10th values
        assert_eq!(percentile(&values, 90).unwrap(), 9.5);
        assert_eq!(percentile(&values, 50).unwrap(), 5.5);
    }

    #[test]
    fn test_percentile_nearest_rank_otherwise() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        // ceil(0.9 * 7) = 7
        assert_eq!(percentile(&values, 90).unwrap(), 7.0);
        assert_eq!(percentile(&[4.2], 90).unwrap(), 4.2);
    }

    #[test]
    fn test_percentile_rejects_bad_input() {
        assert!(matches!(
            percentile(&[1.0], 101),
            Err(MetricsError::InvalidPercentile(101))
        ));
        assert!(matches!(percentile(&[], 50), Err(MetricsError::EmptySeries)));
    }

    #[test]
    fn test_prefix_includes_workers_only_for_worker_creation() {
        assert_eq!(
            metric_prefix(ActionType::CreateCluster, 3),
            "armada_api.workers_3.CreateCluster"
        );
        assert_eq!(
            metric_prefix(ActionType::CreateCluster, -1),
            "armada_api.workers_0.CreateCluster"
        );
        assert_eq!(
            metric_prefix(ActionType::DeleteCluster, 3),
            "armada_api.DeleteCluster"
        );
    }

    #[test]
    fn test_empty_batch_yields_nothing() {
        assert!(summarize(ActionType::DeleteCluster, 0, &[]).is_none());
    }

    #[test]
    fn test_response_and_action_times() {
        let mut failed = timed(4, 0);
        failed.action_failed = true;
        failed.backend_failed = true;

        let batch = vec![timed(1, 100), timed(3, 300), failed];
        let summary = summarize(ActionType::DeleteCluster, 0, &batch).unwrap();

        assert_eq!(
            value(&summary, "armada_api.DeleteCluster.Min_Response_Time.min"),
            Some(1.0)
        );
        assert_eq!(
            value(&summary, "armada_api.DeleteCluster.Max_Response_Time.max"),
            Some(4.0)
        );
        assert_eq!(
            value(&summary, "armada_api.DeleteCluster.Mean_Action_Time.sparse-avg"),
            Some(200.0)
        );
        assert_eq!(
            value(&summary, "armada_api.DeleteCluster.Min_Action_Time.min"),
            Some(100.0)
        );
        assert_eq!(
            value(&summary, "armada_api.DeleteCluster.Failed_Action_Count"),
            Some(1.0)
        );
        assert_eq!(
            value(&summary, "armada_api.DeleteCluster.Failed_Backend_Count"),
            Some(1.0)
        );
    }

    #[test]
    fn test_action_time_samples_absent_without_blocking_results() {
        let summary = summarize(ActionType::UpdateCluster, 0, &[timed(2, 0)]).unwrap();
        assert!(value(&summary, "armada_api.UpdateCluster.Min_Action_Time.min").is_none());
        assert!(value(&summary, "armada_api.UpdateCluster.Failed_Action_Count").is_none());
    }

    #[test]
    fn test_worker_samples_are_scoped_by_cluster() {
        let mut states = HashMap::new();
        let mut first = WorkerStates::new("provisioning", "");
        first.advance("normal", "Ready", Duration::from_secs(60));
        let mut second = WorkerStates::new("provisioning", "");
        second.advance("normal", "Ready", Duration::from_secs(120));
        states.insert("w1".to_string(), first);
        states.insert("w2".to_string(), second);

        let metric = RequestMetric {
            cluster_name: "perfCluster7".to_string(),
            response_time: Duration::from_secs(1),
            action_time: Duration::from_secs(400),
            workers: vec![WorkerMetrics {
                metric_time: 1_700_000_000,
                duration: Duration::from_secs(30),
                workers_created: 1,
            }],
            worker_creation_times: HashMap::from([
                ("w1".to_string(), 300.0),
                ("w2".to_string(), 500.0),
            ]),
            worker_states: states,
            ..Default::default()
        };

        let summary = summarize(ActionType::CreateCluster, 2, &[metric]).unwrap();
        let prefix = "armada_api.workers_2.CreateCluster.perfCluster7";

        assert_eq!(summary.cluster_names, vec!["perfCluster7".to_string()]);
        assert_eq!(
            value(&summary, &format!("{prefix}.Mean_Worker_Creation_Time.sparse-avg")),
            Some(400.0)
        );
        assert_eq!(
            value(&summary, &format!("{prefix}.provisioning.duration.max")),
            Some(120.0)
        );
        assert_eq!(
            value(&summary, &format!("{prefix}.provisioning.duration.sparse-avg")),
            Some(90.0)
        );

        let tick = summary
            .samples
            .iter()
            .find(|s| s.name == format!("{prefix}.Worker_Count.max"))
            .unwrap();
        assert_eq!(tick.timestamp, Some(1_700_000_000));
    }
}
