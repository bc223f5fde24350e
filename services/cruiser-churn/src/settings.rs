//! Resolved run settings for the churn driver.

use armada_perf_client::trim_openshift;
use std::time::Duration;

use crate::error::{ChurnError, ChurnResult};

/// Everything the driver needs to know about the run, after command line
/// and configuration file have been merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChurnSettings {
    /// Cluster names are this prefix followed by a sequence number
    pub prefix: String,
    /// Number of slots
    pub clusters: usize,
    /// Workers per created cluster; -1 creates none and reports as 0
    pub workers: i64,
    pub threads: usize,
    pub machine_type: String,
    /// Empty disables updates; every NoAction slot is then deleted
    pub upgrade_version: String,
    pub default_version: String,
    pub follow_kube_version: bool,
    pub openshift: bool,
    pub max_delete_failures: u32,
    pub watchdog_attempts: u32,
    pub submit_delay: Duration,
    pub state_retry: Duration,
    pub metrics_window: Duration,
    pub monitor: bool,
    pub send_metrics: bool,
    pub test_name: String,
    /// Fixed seed for slot selection; random when unset
    pub seed: Option<u64>,
}

impl Default for ChurnSettings {
    fn default() -> Self {
        Self {
            prefix: "perfCluster".to_string(),
            clusters: 1,
            workers: 1,
            threads: 1,
            machine_type: "free".to_string(),
            upgrade_version: String::new(),
            default_version: String::new(),
            follow_kube_version: false,
            openshift: false,
            max_delete_failures: 3,
            watchdog_attempts: 1000,
            submit_delay: Duration::from_secs(5),
            state_retry: Duration::from_secs(1),
            metrics_window: Duration::from_secs(60),
            monitor: false,
            send_metrics: false,
            test_name: String::new(),
            seed: None,
        }
    }
}

impl ChurnSettings {
    /// Maximum requests in flight: twice the worker count, but never more
    /// than the slots still in service.
    pub fn pipeline_capacity(&self, frozen: usize) -> ChurnResult<usize> {
        let available = self.clusters.saturating_sub(frozen);
        let capacity = (2 * self.threads).min(available);
        if capacity == 0 {
            tracing::error!(
                slots = self.clusters,
                frozen,
                "Pipeline capacity exhausted"
            );
            return Err(ChurnError::PipelineExhausted {
                slots: self.clusters,
                frozen,
            });
        }
        Ok(capacity)
    }

    /// Per-action metric buffer size.
    pub fn metrics_buffer(&self) -> usize {
        2 * self.threads
    }

    /// Worker count reported alongside CreateCluster metrics.
    pub fn metrics_workers(&self) -> i64 {
        self.workers.max(0)
    }

    /// Test name as used for the metric measurement.
    pub fn metrics_test_name(&self) -> String {
        self.test_name.to_lowercase().replace(' ', "")
    }
}

/// `major_minor` of a kube version, the form dashboards group by.
pub fn dashboard_version(version: &str) -> String {
    trim_openshift(version)
        .split(['.', '_'])
        .take(2)
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_bounded_by_threads_and_slots() {
        let settings = ChurnSettings {
            clusters: 10,
            threads: 3,
            ..Default::default()
        };
        assert_eq!(settings.pipeline_capacity(0).unwrap(), 6);
        assert_eq!(settings.pipeline_capacity(5).unwrap(), 5);
        assert_eq!(settings.pipeline_capacity(9).unwrap(), 1);
        assert!(matches!(
            settings.pipeline_capacity(10),
            Err(ChurnError::PipelineExhausted { slots: 10, frozen: 10 })
        ));
    }

    #[test]
    fn test_metrics_naming() {
        let settings = ChurnSettings {
            workers: -1,
            test_name: "Cruiser Churn".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.metrics_workers(), 0);
        assert_eq!(settings.metrics_test_name(), "cruiserchurn");
    }

    #[test]
    fn test_dashboard_version() {
        assert_eq!(dashboard_version("1.30"), "1_30");
        assert_eq!(dashboard_version("4.14_openshift"), "4_14");
        assert_eq!(dashboard_version("1.29.7_1550"), "1_29");
    }
}
