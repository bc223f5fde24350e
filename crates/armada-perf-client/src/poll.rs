//! Blocking waits for a cluster master or its workers to settle.
//!
//! Neither loop has a deadline. Transient trouble (network errors, odd
//! bodies, 400s) is slept off and retried; only terminal business states
//! end a loop.

use armada_perf_core::config::RequestConfig;
use armada_perf_core::metrics::POLL_ITERATIONS;
use armada_perf_core::ActionType;
use armada_perf_metrics::{RequestMetric, WorkerMetrics, WorkerStates};
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::route::ApiCall;
use crate::status::{classify_master_status, MasterStatus, ALREADY_UP_TO_DATE_PREFIX};
use crate::transport::{RawResponse, Transport};
use crate::version::trim_openshift;

/// Worker status that is folded into the state history as its own state.
pub const WAITING_FOR_MASTER_STATUS: &str = "Waiting for master to be deployed";
pub const WAITING_FOR_MASTER_STATE: &str = "waiting_for_master_deployment";

/// Poll cadence. A zero interval disables that loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub master_interval: Duration,
    pub worker_interval: Duration,
    /// Ready sooner than this after the request is treated as stale
    pub ready_grace: Duration,
}

impl PollSettings {
    pub fn from_config(request: &RequestConfig) -> Self {
        Self {
            master_interval: request.master_poll_interval(),
            worker_interval: request.worker_poll_interval(),
            ready_grace: request.ready_grace_period(),
        }
    }
}

/// One GET with a single re-authenticated retry on 401. `None` when no
/// response could be obtained.
async fn fetch(transport: &dyn Transport, call: &ApiCall) -> Option<RawResponse> {
    let response = match transport.send(call).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, path = %call.path(), "Poll request failed, will continue polling");
            return None;
        }
    };
    if response.status != 401 {
        return Some(response);
    }

    tracing::info!(path = %call.path(), "Poll request unauthorised, re-authenticating");
    if let Err(e) = transport.authenticate().await {
        tracing::warn!(error = %e, "Re-authentication failed");
    }
    match transport.send(call).await {
        Ok(r) => Some(r),
        Err(e) => {
            tracing::warn!(error = %e, path = %call.path(), "Poll request failed after re-authentication");
            None
        }
    }
}

/// Wait for the master to reach a terminal state after `action`.
///
/// Returns the action time on success, `None` when the action should be
/// counted as failed.
pub async fn poll_master(
    transport: &dyn Transport,
    settings: &PollSettings,
    action: ActionType,
    cluster: &str,
    update_target: &str,
    started: Instant,
) -> Option<Duration> {
    let call = ApiCall::GetCluster {
        name: cluster.to_string(),
        show_resources: false,
    };
    let target = trim_openshift(update_target);
    let mut warned_unrecognized = false;

    loop {
        POLL_ITERATIONS.with_label_values(&["master"]).inc();

        let Some(response) = fetch(transport, &call).await else {
            tokio::time::sleep(settings.master_interval).await;
            continue;
        };

        // The API occasionally bounces the request; the body then carries an
        // error rather than the master.
        if response.status == 400 {
            tokio::time::sleep(settings.master_interval).await;
            continue;
        }

        if action == ActionType::DeleteCluster && response.status == 404 {
            return Some(started.elapsed());
        }

        let master: serde_json::Value = match serde_json::from_slice(&response.body) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(cluster = %cluster, error = %e, "Ignoring unexpected master poll body");
                tokio::time::sleep(settings.master_interval).await;
                continue;
            }
        };

        let Some(status) = master.get("masterStatus").and_then(|v| v.as_str()) else {
            tracing::warn!(
                cluster = %cluster,
                status = response.status,
                body = %master,
                "masterStatus missing from cluster"
            );
            tokio::time::sleep(settings.master_interval).await;
            continue;
        };
        let classified = classify_master_status(status);

        if action == ActionType::UpdateCluster {
            if let Some(version) = master.get("masterKubeVersion").and_then(|v| v.as_str()) {
                if !version.starts_with(target) {
                    if classified == MasterStatus::Failed {
                        tracing::warn!(cluster = %cluster, status = %status, "Version update failed");
                        return None;
                    }
                    tokio::time::sleep(settings.master_interval).await;
                    continue;
                }
            }
            if status.starts_with(ALREADY_UP_TO_DATE_PREFIX) {
                tracing::info!(cluster = %cluster, status = %status, "Update rejected");
                return None;
            }
        }

        match classified {
            MasterStatus::Ready if action == ActionType::DeleteCluster => {
                // Ready can still be showing from before the delete landed
            }
            MasterStatus::Ready => {
                let elapsed = started.elapsed();
                if elapsed > settings.ready_grace {
                    return Some(elapsed);
                }
                tracing::debug!(cluster = %cluster, ?elapsed, "Master Ready before grace period");
                return None;
            }
            MasterStatus::Pending => {}
            MasterStatus::Failed if action == ActionType::DeleteCluster => {}
            MasterStatus::Failed => {
                tracing::warn!(cluster = %cluster, status = %status, "Master failed");
                return None;
            }
            MasterStatus::Unrecognized => {
                if !warned_unrecognized {
                    tracing::warn!(cluster = %cluster, status = %status, "Unexpected masterStatus");
                    warned_unrecognized = true;
                }
            }
        }

        tokio::time::sleep(settings.master_interval).await;
    }
}

#[derive(Debug, Deserialize)]
struct WorkerRecord {
    #[serde(default)]
    id: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: String,
}

fn is_terminal_worker_state(state: &str) -> bool {
    state.eq_ignore_ascii_case("normal") || state.eq_ignore_ascii_case("deleted")
}

/// Wait until every worker of `cluster` is `normal` or `deleted`,
/// recording per-state timings into `metric`. Returns the action time.
pub async fn poll_workers(
    transport: &dyn Transport,
    settings: &PollSettings,
    cluster: &str,
    started: Instant,
    metric: &mut RequestMetric,
) -> Duration {
    let call = ApiCall::GetClusterWorkers {
        name: cluster.to_string(),
    };
    let mut prev_tick: Option<Instant> = None;

    loop {
        POLL_ITERATIONS.with_label_values(&["worker"]).inc();

        let tick = Instant::now();
        let Some(response) = fetch(transport, &call).await else {
            tokio::time::sleep(settings.worker_interval).await;
            continue;
        };

        let workers: Vec<WorkerRecord> = match serde_json::from_slice(&response.body) {
            Ok(w) => w,
            Err(e) => {
                tracing::debug!(cluster = %cluster, error = %e, "Ignoring unexpected workers body");
                Vec::new()
            }
        };
        if workers.is_empty() {
            tokio::time::sleep(settings.worker_interval).await;
            continue;
        }

        let since_prev = prev_tick.map_or(Duration::ZERO, |prev| tick.duration_since(prev));
        let mut state_counts: BTreeMap<&str, usize> = BTreeMap::new();
        let mut completed = 0usize;
        let mut all_complete = true;
        let mut changed = false;

        for worker in &workers {
            *state_counts.entry(worker.state.as_str()).or_default() += 1;

            let state = if worker.status == WAITING_FOR_MASTER_STATUS {
                WAITING_FOR_MASTER_STATE
            } else {
                worker.state.as_str()
            };

            let report = match metric.worker_states.get_mut(&worker.id) {
                Some(states) => states.advance(state, &worker.status, since_prev),
                None => {
                    metric
                        .worker_states
                        .insert(worker.id.clone(), WorkerStates::new(state, worker.status.as_str()));
                    true
                }
            };

            let done = is_terminal_worker_state(state);
            if done {
                completed += 1;
                metric
                    .worker_creation_times
                    .entry(worker.id.clone())
                    .or_insert_with(|| started.elapsed().as_secs_f64());
            }

            if report {
                changed = true;
                tracing::info!(
                    cluster = %cluster,
                    worker = %worker.id,
                    state = %state,
                    status = %worker.status,
                    "Worker changed"
                );
            }
            all_complete &= done;
        }

        if changed {
            for (state, count) in &state_counts {
                tracing::info!(cluster = %cluster, state = %state, count, total = workers.len(), "Workers in state");
            }
        }

        prev_tick = Some(tick);
        metric.workers.push(WorkerMetrics {
            metric_time: Utc::now().timestamp(),
            duration: started.elapsed(),
            workers_created: completed,
        });

        if all_complete {
            return started.elapsed();
        }
        tokio::time::sleep(settings.worker_interval).await;
    }
}
