//! Raw measurements gathered per request and the samples derived from them.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// One named value headed for the time-series store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    /// Dot-delimited hierarchical name, e.g. `armada_api.CreateCluster.Max_Response_Time.max`
    pub name: String,
    /// Unix seconds; `None` means "when written"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            timestamp: None,
            value,
        }
    }

    pub fn at(name: impl Into<String>, timestamp: i64, value: f64) -> Self {
        Self {
            name: name.into(),
            timestamp: Some(timestamp),
            value,
        }
    }
}

/// Progress of worker creation at one poll tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerMetrics {
    /// Unix seconds when the tick was taken
    pub metric_time: i64,
    /// Time since the originating request was issued
    pub duration: Duration,
    pub workers_created: usize,
}

/// Time-in-state bookkeeping for a single worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStates {
    pub cur_state: String,
    pub cur_status: String,
    /// Accumulated time per state name
    pub durations: HashMap<String, Duration>,
}

impl WorkerStates {
    /// A worker seen for the first time; its state starts with zero duration.
    pub fn new(state: impl Into<String>, status: impl Into<String>) -> Self {
        let state = state.into();
        let mut durations = HashMap::new();
        durations.insert(state.clone(), Duration::ZERO);
        Self {
            cur_state: state,
            cur_status: status.into(),
            durations,
        }
    }

    /// Charge `elapsed` to the state the worker was in, then move to the
    /// observed state/status. Returns whether anything visible changed.
    pub fn advance(&mut self, state: &str, status: &str, elapsed: Duration) -> bool {
        *self
            .durations
            .entry(self.cur_state.clone())
            .or_insert(Duration::ZERO) += elapsed;

        if self.cur_state != state {
            self.cur_state = state.to_string();
            self.cur_status = status.to_string();
            return true;
        }

        if self.cur_status != status {
            self.cur_status = status.to_string();
            return true;
        }

        false
    }
}

/// Everything measured for one API request/action.
#[derive(Debug, Clone, Default)]
pub struct RequestMetric {
    pub cluster_name: String,
    pub response_time: Duration,
    /// Zero unless the request blocked until the action completed
    pub action_time: Duration,
    pub workers: Vec<WorkerMetrics>,
    /// Worker id to seconds from request to the worker reaching a terminal state
    pub worker_creation_times: HashMap<String, f64>,
    /// Worker id to its state history
    pub worker_states: HashMap<String, WorkerStates>,
    pub action_failed: bool,
    /// Failed with a recognised backend/edge failure signature
    pub backend_failed: bool,
}
