//! The churn state machine.
//!
//! `ChurnDriver` is the only writer of slot state. Workers in the pool run
//! requests and hand back completions; the driver matches each completion to
//! its slot through `request_num` and decides what happens next.

use armada_perf_client::monitor::{self, MonitorEvent};
use armada_perf_client::{
    trim_openshift, upgrade_step, ClientResult, CompletedResponse, Gateway, PendingRequest,
    RequestExecutor, RetryMode, WorkerPool,
};
use armada_perf_core::metrics::{ACTIVE_REQUESTS, CHURN_TRANSITIONS, FROZEN_SLOTS};
use armada_perf_core::ActionType;
use armada_perf_metrics::{
    summarize, BomAnnotation, BomType, MetricsBatcher, MetricsSink, RequestMetric, SinkContext,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{ChurnError, ChurnResult};
use crate::settings::{dashboard_version, ChurnSettings};
use crate::slot::{ChurnState, ClusterSlot};
use crate::startup::{self, Discovery, VersionPlan};

/// Master statuses accepted as a finished create.
const READY_EQUIVALENT: [&str; 3] = [
    "Ready",
    "VPN server configuration update in progress.",
    "VPN server configuration update requested.",
];

/// Worker BOMs are stamped this far in the past so they sort before the
/// master's on dashboards.
const WORKER_BOM_OFFSET_MINUTES: i64 = 10;

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChurnSummary {
    pub completions: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub frozen: usize,
}

struct MetricsOutput {
    batcher: MetricsBatcher,
    sink: Arc<dyn MetricsSink>,
    context: SinkContext,
    carrier_name: String,
}

enum Wake {
    Completed(ClientResult<CompletedResponse>),
    Terminate,
    /// The interrupt sender is gone
    SignalClosed,
}

pub struct ChurnDriver {
    settings: ChurnSettings,
    gateway: Arc<Gateway>,
    pool: WorkerPool,
    slots: Vec<ClusterSlot>,
    next_seq: u64,
    versions: VersionPlan,
    active_requests: usize,
    frozen: usize,
    pipeline_max: usize,
    terminate: watch::Receiver<bool>,
    rng: StdRng,
    metrics: Option<MetricsOutput>,
    summary: ChurnSummary,
}

impl ChurnDriver {
    /// Build a driver over `discovery`.
    ///
    /// `gateway` serves the driver's own state lookups; `executor` runs the
    /// churn requests on a pool of `settings.threads` workers.
    pub fn new(
        settings: ChurnSettings,
        gateway: Arc<Gateway>,
        executor: Arc<dyn RequestExecutor>,
        discovery: Discovery,
        versions: VersionPlan,
        terminate: watch::Receiver<bool>,
    ) -> ChurnResult<Self> {
        if discovery.slots.is_empty() || discovery.slots.len() != settings.clusters {
            return Err(ChurnError::Usage(format!(
                "slot table has {} entries for {} clusters",
                discovery.slots.len(),
                settings.clusters
            )));
        }
        let pipeline_max = settings.pipeline_capacity(0)?;
        let pool = WorkerPool::new(executor, settings.threads, settings.clusters);
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            settings,
            gateway,
            pool,
            slots: discovery.slots,
            next_seq: discovery.next_seq,
            versions,
            active_requests: 0,
            frozen: 0,
            pipeline_max,
            terminate,
            rng,
            metrics: None,
            summary: ChurnSummary::default(),
        })
    }

    /// Record request metrics and write them to `sink`. BOM versions of new
    /// clusters are annotated through the same sink.
    pub fn with_metrics(
        mut self,
        sink: Arc<dyn MetricsSink>,
        context: SinkContext,
        carrier_name: impl Into<String>,
    ) -> Self {
        self.metrics = Some(MetricsOutput {
            batcher: MetricsBatcher::new(self.settings.metrics_buffer(), self.settings.metrics_window),
            sink,
            context,
            carrier_name: carrier_name.into(),
        });
        self
    }

    pub fn slots(&self) -> &[ClusterSlot] {
        &self.slots
    }

    pub fn active_requests(&self) -> usize {
        self.active_requests
    }

    pub fn pipeline_max(&self) -> usize {
        self.pipeline_max
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn frozen(&self) -> usize {
        self.frozen
    }

    pub fn versions(&self) -> &VersionPlan {
        &self.versions
    }

    pub fn summary(&self) -> &ChurnSummary {
        &self.summary
    }

    pub fn is_terminating(&self) -> bool {
        *self.terminate.borrow()
    }

    /// Churn until interrupted and drained.
    pub async fn run(mut self) -> ChurnResult<ChurnSummary> {
        tracing::info!(
            prefix = %self.settings.prefix,
            slots = self.slots.len(),
            threads = self.settings.threads,
            pipeline_max = self.pipeline_max,
            "Starting cluster churn"
        );

        loop {
            if !self.is_terminating() {
                self.fill_pipeline().await?;
            } else if self.drain_for_shutdown() {
                break;
            }
            self.handle_completions().await?;
        }
        tracing::info!(prefix = %self.settings.prefix, "Done with cluster churn");

        self.finish_metrics().await;
        let ChurnDriver { pool, summary, .. } = self;
        pool.shutdown().await;
        Ok(summary)
    }

    /// Submit requests until the pipeline is at capacity. Returns how many
    /// were submitted.
    pub async fn fill_pipeline(&mut self) -> ChurnResult<usize> {
        let mut submitted = 0;
        while self.active_requests < self.pipeline_max && !self.is_terminating() {
            let request = self.select_action()?;
            // Spread out the burst of requests at startup
            tokio::time::sleep(self.settings.submit_delay).await;
            self.dispatch(request)?;
            submitted += 1;
        }
        Ok(submitted)
    }

    /// Wait for one completion, then process every other completion that is
    /// already available. Returns without waiting when nothing is in flight
    /// or an interrupt arrives first.
    pub async fn handle_completions(&mut self) -> ChurnResult<usize> {
        if self.active_requests == 0 {
            return Ok(0);
        }
        let Some(first) = self.wait_for_completion().await? else {
            return Ok(0);
        };

        self.process_completion(first).await?;
        let mut handled = 1;
        while let Some(completed) = self.pool.try_next_completion() {
            self.process_completion(completed).await?;
            handled += 1;
        }
        Ok(handled)
    }

    async fn wait_for_completion(&mut self) -> ChurnResult<Option<CompletedResponse>> {
        if self.is_terminating() {
            return Ok(Some(self.pool.next_completion().await?));
        }

        let wake = tokio::select! {
            completed = self.pool.next_completion() => Wake::Completed(completed),
            changed = self.terminate.changed() => match changed {
                Ok(()) => Wake::Terminate,
                Err(_) => Wake::SignalClosed,
            },
        };
        match wake {
            Wake::Completed(completed) => Ok(Some(completed?)),
            Wake::Terminate => Ok(None),
            Wake::SignalClosed => Ok(Some(self.pool.next_completion().await?)),
        }
    }

    /// Pick a random actionable slot and mark it for its next action.
    ///
    /// Every `watchdog_attempts` consecutive misses the slot table is
    /// checked; with nothing actionable the pick gives up with
    /// [`ChurnError::NoActionableSlot`].
    pub fn select_action(&mut self) -> ChurnResult<PendingRequest> {
        let mut attempts = 0u32;
        loop {
            let idx = self.rng.gen_range(0..self.slots.len());
            match self.slots[idx].state {
                ChurnState::NoCluster => {
                    let name = self.next_name();
                    let slot = &mut self.slots[idx];
                    slot.name = name.clone();
                    slot.master_version.clear();
                    self.set_state(idx, ChurnState::Create);
                    return Ok(PendingRequest::new(ActionType::CreateCluster, name)
                        .with_request_num(idx)
                        .with_workers(self.settings.workers));
                }
                ChurnState::NoAction => {
                    let slot = &self.slots[idx];
                    let upgrade = &self.versions.upgrade;
                    if upgrade.is_empty() || slot.master_version.starts_with(trim_openshift(upgrade)) {
                        let request = PendingRequest::new(ActionType::DeleteCluster, slot.name.clone())
                            .with_request_num(idx);
                        self.set_state(idx, ChurnState::Delete);
                        return Ok(request);
                    }
                    let step = upgrade_step(&slot.master_version, upgrade, self.settings.openshift);
                    let request = PendingRequest::new(ActionType::UpdateCluster, slot.name.clone())
                        .with_request_num(idx)
                        .with_update_version(step);
                    self.set_state(idx, ChurnState::Update);
                    return Ok(request);
                }
                _ => {
                    attempts += 1;
                    if attempts % self.settings.watchdog_attempts.max(1) == 0 {
                        let actionable = self.actionable_slots();
                        if actionable == 0 {
                            return Err(self.watchdog_trip(attempts));
                        }
                        tracing::warn!(
                            attempts,
                            actionable,
                            slots = self.slots.len(),
                            "Random picking is slow to find an actionable slot"
                        );
                    }
                }
            }
        }
    }

    fn actionable_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.state.is_actionable()).count()
    }

    fn watchdog_trip(&self, attempts: u32) -> ChurnError {
        let actionable = self.actionable_slots();
        tracing::error!(
            attempts,
            active_requests = self.active_requests,
            queued = self.pool.queued(),
            frozen = self.frozen,
            actionable,
            "Random picking of cluster found no slot available for an action"
        );
        tracing::error!("Suggests that active requests are out of line with real requests");

        let maxed_out = self
            .slots
            .iter()
            .filter(|s| s.delete_failures >= self.settings.max_delete_failures)
            .count();
        if maxed_out > 1 {
            tracing::warn!(
                clusters = maxed_out,
                max_delete_failures = self.settings.max_delete_failures,
                "Clusters where every delete failed require manual delete"
            );
        }
        for slot in &self.slots {
            tracing::error!(
                cluster = %slot.name,
                state = %slot.state,
                version = %slot.master_version,
                "Slot"
            );
        }

        ChurnError::NoActionableSlot {
            attempts,
            slots: self.slots.len(),
        }
    }

    fn next_name(&mut self) -> String {
        let name = format!("{}{}", self.settings.prefix, self.next_seq);
        self.next_seq += 1;
        name
    }

    fn set_state(&mut self, idx: usize, state: ChurnState) {
        let slot = &mut self.slots[idx];
        if slot.state != state {
            CHURN_TRANSITIONS
                .with_label_values(&[slot.state.as_str(), state.as_str()])
                .inc();
        }
        slot.state = state;
    }

    fn reset_slot(&mut self, idx: usize) {
        self.set_state(idx, ChurnState::NoCluster);
        self.slots[idx] = ClusterSlot::default();
    }

    fn dispatch(&mut self, request: PendingRequest) -> ChurnResult<()> {
        tracing::info!(
            slot = request.request_num,
            cluster = %request.cluster_name,
            action = %request.action,
            "Submitting request"
        );
        self.pool.submit(request)?;
        self.active_requests += 1;
        ACTIVE_REQUESTS.set(self.active_requests as i64);
        Ok(())
    }

    /// Start a new cluster in slot `idx` under a fresh name.
    fn create_cluster(&mut self, idx: usize) -> ChurnResult<()> {
        let name = self.next_name();
        if self.is_terminating() {
            self.set_state(idx, ChurnState::NoCluster);
            return Ok(());
        }
        let slot = &mut self.slots[idx];
        slot.name = name.clone();
        slot.master_version.clear();
        self.set_state(idx, ChurnState::Create);
        self.dispatch(
            PendingRequest::new(ActionType::CreateCluster, name)
                .with_request_num(idx)
                .with_workers(self.settings.workers),
        )
    }

    /// Queue a delete for slot `idx` unless shutting down or out of retries,
    /// in which case a slot left mid-action goes idle.
    fn initiate_delete(&mut self, idx: usize) -> ChurnResult<()> {
        let slot = &self.slots[idx];
        if !self.is_terminating() && slot.delete_failures < self.settings.max_delete_failures {
            let request = PendingRequest::new(ActionType::DeleteCluster, slot.name.clone())
                .with_request_num(idx);
            self.set_state(idx, ChurnState::Delete);
            return self.dispatch(request);
        }
        if slot.state.is_in_flight() {
            tracing::warn!(cluster = %slot.name, state = %slot.state, "Delete not issued, leaving cluster idle");
            self.set_state(idx, ChurnState::NoAction);
        }
        Ok(())
    }

    /// Apply one completion to its slot.
    pub async fn process_completion(&mut self, completed: CompletedResponse) -> ChurnResult<()> {
        self.active_requests = self.active_requests.saturating_sub(1);
        ACTIVE_REQUESTS.set(self.active_requests as i64);
        self.summary.completions += 1;

        if let Some(output) = self.metrics.as_mut() {
            output.batcher.record(completed.action, completed.metrics.clone());
        }

        let idx = completed.request_num;
        if idx >= self.slots.len() {
            tracing::error!(slot = idx, cluster = %completed.cluster_name, "Completion for unknown slot");
            return Ok(());
        }

        let delete = match self.slots[idx].state {
            ChurnState::Create => self.on_create(&completed).await?,
            ChurnState::Update => self.on_update(&completed).await?,
            ChurnState::Delete => self.on_delete(&completed).await?,
            other => {
                tracing::error!(
                    state = %other,
                    cluster = %completed.cluster_name,
                    action = %completed.action,
                    "Unexpected churn state in response"
                );
                false
            }
        };
        if delete {
            self.initiate_delete(idx)?;
        }

        if self.settings.monitor {
            let cluster_id = completed.cluster_id.as_deref().unwrap_or_default();
            let event = if completed.action_failed {
                MonitorEvent::Failed { cluster_id }
            } else {
                MonitorEvent::Succeeded {
                    action_time: completed.action_time,
                    cluster_id,
                }
            };
            monitor::emit(&completed.cluster_name, completed.action, event);
        }

        self.flush_metrics().await;
        Ok(())
    }

    async fn get_cluster(&self, name: &str) -> (CompletedResponse, Option<Value>) {
        let response = self
            .gateway
            .perform(PendingRequest::new(ActionType::GetCluster, name), RetryMode::Single)
            .await;
        let body = response.json().filter(Value::is_object);
        (response, body)
    }

    /// Returns whether the cluster should be deleted.
    async fn on_create(&mut self, completed: &CompletedResponse) -> ChurnResult<bool> {
        let idx = completed.request_num;
        if completed.status == 403 {
            tracing::warn!(cluster = %completed.cluster_name, "Create forbidden, trying again with a new cluster");
            self.create_cluster(idx)?;
            return Ok(false);
        }

        let name = self.slots[idx].name.clone();
        let mut reported_server_error = false;
        let (response, body) = loop {
            let (response, body) = self.get_cluster(&name).await;
            if (body.is_some() && response.status != 500) || response.status == 404 {
                break (response, body);
            }
            if response.status == 500 {
                // Report once; everything else waits until the API recovers
                if !reported_server_error {
                    tracing::error!(cluster = %name, "GetCluster returned 500, waiting till GetCluster is successful");
                    reported_server_error = true;
                }
            } else {
                tracing::error!(cluster = %name, status = response.status, "GetCluster failed");
            }
            tokio::time::sleep(self.settings.state_retry).await;
        };

        if response.status == 404 {
            tracing::warn!(cluster = %name, "Cluster missing after create, creating another");
            self.create_cluster(idx)?;
            return Ok(false);
        }
        if !response.is_success() {
            // Assume the cluster exists rather than risk over populating
            tracing::error!(cluster = %name, status = response.status, "Unexpected response from GetCluster after create");
            return Ok(true);
        }

        let body = body.unwrap_or_default();
        let master_status = body
            .get("masterStatus")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let mut delete = false;

        if READY_EQUIVALENT.contains(&master_status) {
            let version = body
                .get("masterKubeVersion")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            self.slots[idx].master_version = version.clone();
            self.summary.created += 1;

            if self.settings.follow_kube_version
                && !version.starts_with(trim_openshift(&self.versions.default))
            {
                self.follow_default_version().await;
            }
            self.annotate_boms(&name, &version).await;
        } else if completed.action_failed {
            delete = true;
        } else {
            tracing::error!(
                cluster = %name,
                master_status = %master_status,
                "Master not ready after create"
            );
            self.slots[idx].master_version = self.versions.default.clone();
        }

        self.set_state(idx, ChurnState::NoAction);
        Ok(delete)
    }

    async fn on_update(&mut self, completed: &CompletedResponse) -> ChurnResult<bool> {
        let idx = completed.request_num;
        let name = self.slots[idx].name.clone();

        let (response, body) = loop {
            let (response, body) = self.get_cluster(&name).await;
            if body.is_some() || response.status == 404 || response.status == 409 {
                break (response, body);
            }
            tracing::error!(cluster = %name, status = response.status, "GetCluster failed after update");
            tokio::time::sleep(self.settings.state_retry).await;
        };

        if response.status == 404 {
            tracing::error!(cluster = %name, "Couldn't find cluster after update");
            self.reset_slot(idx);
            self.create_cluster(idx)?;
            return Ok(false);
        }

        let observed = body
            .as_ref()
            .and_then(|b| b.get("masterKubeVersion"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if completed.status == 409 {
            let target = trim_openshift(&self.versions.upgrade);
            return Ok(match observed {
                Some(version) if version.starts_with(target) => {
                    // An update from a previous run landed after discovery
                    tracing::info!(cluster = %name, version = %version, "Cluster already upgraded");
                    self.slots[idx].master_version = version;
                    self.set_state(idx, ChurnState::NoAction);
                    false
                }
                _ => {
                    tracing::warn!(cluster = %name, "Update conflict with unknown cause");
                    true
                }
            });
        }

        let mut delete = false;
        if response.is_success() {
            if completed.action_failed {
                // The master would otherwise keep its old version and loop
                delete = true;
            } else if let Some(version) = observed {
                self.slots[idx].master_version = version;
                self.summary.updated += 1;
            } else {
                tracing::warn!(cluster = %name, "masterKubeVersion missing after update");
            }
        } else {
            // TODO: confirm convergence with a later GetCluster instead of assuming the upgrade landed
            tracing::error!(
                cluster = %name,
                update_status = completed.status,
                get_status = response.status,
                "Unexpected error on update, mark as upgraded"
            );
            self.slots[idx].master_version = self.versions.upgrade.clone();
        }

        self.set_state(idx, ChurnState::NoAction);
        Ok(delete)
    }

    async fn on_delete(&mut self, completed: &CompletedResponse) -> ChurnResult<bool> {
        let idx = completed.request_num;
        let name = self.slots[idx].name.clone();
        let (response, _) = self.get_cluster(&name).await;

        if response.status == 404 {
            self.reset_slot(idx);
            self.summary.deleted += 1;
            // Replace straight away or random selection lets the population sag
            self.create_cluster(idx)?;
            return Ok(false);
        }

        let slot = &mut self.slots[idx];
        slot.delete_failures += 1;
        tracing::error!(
            cluster = %name,
            status = response.status,
            failures = slot.delete_failures,
            "Unexpected response after delete"
        );
        if slot.delete_failures < self.settings.max_delete_failures {
            return Ok(true);
        }

        tracing::error!(
            cluster = %name,
            failures = slot.delete_failures,
            status = response.status,
            "REMEDIATE deletes failed, manual fix required"
        );
        self.set_state(idx, ChurnState::Freeze);
        self.frozen += 1;
        self.summary.frozen = self.frozen;
        FROZEN_SLOTS.set(self.frozen as i64);
        self.pipeline_max = self.settings.pipeline_capacity(self.frozen)?;
        Ok(false)
    }

    /// Adopt a new API default version once clusters start coming up with it.
    async fn follow_default_version(&mut self) {
        match startup::fetch_kube_versions(&self.gateway, self.settings.openshift).await {
            Ok(latest) if latest.default != self.versions.default => {
                self.versions.default = latest.default;
                self.versions.upgrade = latest.next;
                self.versions.create = self.versions.default.clone();
                self.gateway.templates().set_kube_version(&self.versions.create);
                if let Some(output) = self.metrics.as_mut() {
                    output.context.kube_version = dashboard_version(&self.versions.default);
                }
                tracing::info!(
                    create = %self.versions.default,
                    upgrade = %self.versions.upgrade,
                    "Kube versions updated due to kube default version change"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to refresh kube versions"),
        }
    }

    async fn annotate_boms(&self, name: &str, master_bom: &str) {
        let Some(output) = &self.metrics else {
            return;
        };
        let now = Utc::now();
        tracing::info!(cluster = %name, bom = %master_bom, "Created cluster with master BOM");
        annotate(output, master_bom, BomType::Master, now).await;

        if self.settings.workers <= 0 {
            return;
        }
        let workers = self
            .gateway
            .perform(
                PendingRequest::new(ActionType::GetClusterWorkers, name),
                RetryMode::Single,
            )
            .await;
        match first_worker_bom(&workers) {
            Some(worker_bom) => {
                tracing::info!(cluster = %name, bom = %worker_bom, "Created cluster with worker BOM");
                let stamped = now - chrono::Duration::minutes(WORKER_BOM_OFFSET_MINUTES);
                annotate(output, &worker_bom, BomType::Worker, stamped).await;
            }
            None => tracing::error!(cluster = %name, status = workers.status, "Failed to get worker BOM version"),
        }
    }

    async fn flush_metrics(&mut self) {
        let Some(output) = self.metrics.as_mut() else {
            return;
        };
        if let Some(wait) = output.batcher.wait_for_full_buffer() {
            tracing::info!(?wait, "Metric buffer full, waiting for the write window");
            tokio::time::sleep(wait).await;
        }
        let pending = self.pool.has_pending_completion();
        let ready = output.batcher.take_ready(pending);
        write_batches(output, ready, self.settings.metrics_workers()).await;
    }

    async fn finish_metrics(&mut self) {
        let Some(output) = self.metrics.as_mut() else {
            return;
        };
        if let Some(wait) = output.batcher.remaining_window() {
            tracing::info!(?wait, "Waiting for the write window before the final metrics");
            tokio::time::sleep(wait).await;
        }
        let ready = output.batcher.drain_all();
        write_batches(output, ready, self.settings.metrics_workers()).await;
    }

    /// Pull queued requests back and report whether the run can end.
    fn drain_for_shutdown(&mut self) -> bool {
        for request in self.pool.drain_queued() {
            self.active_requests = self.active_requests.saturating_sub(1);
            tracing::info!(
                cluster = %request.cluster_name,
                action = %request.action,
                "Dropping queued request"
            );
            if request.request_num < self.slots.len() {
                self.set_state(request.request_num, ChurnState::NoAction);
            }
        }
        ACTIVE_REQUESTS.set(self.active_requests as i64);

        if self.pool.has_pending_completion() {
            return false;
        }
        let remaining = self.slots.iter().filter(|s| s.state.is_in_flight()).count();
        tracing::info!(prefix = %self.settings.prefix, remaining, "Cluster CRUD still active");
        if remaining == 0 {
            return true;
        }
        if self.active_requests == 0 {
            tracing::warn!(remaining, "Slots marked active with no request in flight");
            return true;
        }
        false
    }
}

fn first_worker_bom(response: &CompletedResponse) -> Option<String> {
    if !response.is_success() {
        return None;
    }
    response
        .json()?
        .get(0)?
        .get("kubeVersion")?
        .as_str()
        .map(str::to_string)
}

async fn annotate(output: &MetricsOutput, bom: &str, kind: BomType, timestamp: chrono::DateTime<Utc>) {
    let annotation = BomAnnotation {
        carrier_name: output.carrier_name.clone(),
        bom: bom.to_string(),
        kind,
        timestamp,
    };
    match output.sink.annotate_bom(&annotation).await {
        Ok(true) => tracing::info!(bom = %bom, kind = %kind, "BOM annotation written"),
        Ok(false) => tracing::debug!(bom = %bom, kind = %kind, "BOM unchanged"),
        Err(e) => tracing::error!(error = %e, bom = %bom, kind = %kind, "Failed writing BOM version"),
    }
}

async fn write_batches(output: &MetricsOutput, ready: Vec<(ActionType, Vec<RequestMetric>)>, workers: i64) {
    for (action, batch) in ready {
        // Worker count only means something for creates
        let workers = if action == ActionType::CreateCluster { workers } else { 0 };
        let Some(summary) = summarize(action, workers, &batch) else {
            continue;
        };
        if let Err(e) = output.sink.write_batch(&summary, &output.context).await {
            tracing::warn!(error = %e, action = %action, "Failed to write metrics batch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_perf_client::{
        GatewaySettings, MockTransport, PollSettings, RequestTemplates, TemplateParams,
    };
    use std::time::Duration;

    fn driver(slots: Vec<ClusterSlot>, watchdog_attempts: u32) -> (ChurnDriver, watch::Sender<bool>) {
        let settings = ChurnSettings {
            clusters: slots.len(),
            threads: 1,
            watchdog_attempts,
            submit_delay: Duration::ZERO,
            state_retry: Duration::ZERO,
            seed: Some(7),
            ..Default::default()
        };
        let gateway_settings = GatewaySettings {
            poll: PollSettings {
                master_interval: Duration::ZERO,
                worker_interval: Duration::ZERO,
                ready_grace: Duration::ZERO,
            },
            reauth_delay: Duration::ZERO,
            show_resources: false,
            delete_resources: false,
            monitor: false,
        };
        let templates = RequestTemplates::from_strings("{}", "{}", TemplateParams::default(), "");
        let gateway = Arc::new(Gateway::new(
            Arc::new(MockTransport::new()),
            Arc::new(templates),
            gateway_settings,
        ));
        let (tx, rx) = watch::channel(false);
        let discovery = Discovery { slots, next_seq: 1 };
        let driver = ChurnDriver::new(
            settings,
            gateway.clone(),
            gateway,
            discovery,
            VersionPlan::default(),
            rx,
        )
        .unwrap();
        (driver, tx)
    }

    fn slot(state: ChurnState) -> ClusterSlot {
        ClusterSlot {
            name: "perfCluster1".to_string(),
            state,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_watchdog_trips_when_nothing_is_actionable() {
        let (mut driver, _tx) = driver(
            vec![slot(ChurnState::Create), slot(ChurnState::Freeze), slot(ChurnState::Delete)],
            50,
        );
        assert!(matches!(
            driver.select_action(),
            Err(ChurnError::NoActionableSlot { attempts: 50, slots: 3 })
        ));
    }

    #[tokio::test]
    async fn test_watchdog_keeps_picking_while_a_slot_is_actionable() {
        let mut slots = vec![slot(ChurnState::Delete); 40];
        slots[23] = slot(ChurnState::NoAction);
        let (mut driver, _tx) = driver(slots, 2);

        let request = driver.select_action().unwrap();
        assert_eq!(request.request_num, 23);
        assert_eq!(request.action, ActionType::DeleteCluster);
    }

    #[tokio::test]
    async fn test_frozen_slot_is_never_selected() {
        let (mut driver, _tx) = driver(vec![slot(ChurnState::Freeze), slot(ChurnState::NoAction)], 1000);
        for _ in 0..100 {
            let request = driver.select_action().unwrap();
            assert_eq!(request.request_num, 1);
            assert_eq!(request.action, ActionType::DeleteCluster);
            driver.slots[1].state = ChurnState::NoAction;
        }
        assert_eq!(driver.slots[0].state, ChurnState::Freeze);
    }

    #[tokio::test]
    async fn test_new_cluster_takes_next_sequence_number() {
        let (mut driver, _tx) = driver(vec![ClusterSlot::default()], 10);
        let request = driver.select_action().unwrap();
        assert_eq!(request.action, ActionType::CreateCluster);
        assert_eq!(request.cluster_name, "perfCluster1");
        assert_eq!(request.total_workers, 1);
        assert_eq!(driver.next_seq(), 2);
        assert_eq!(driver.slots()[0].state, ChurnState::Create);
    }

    #[tokio::test]
    async fn test_upgrade_selected_one_minor_at_a_time() {
        let (mut driver, _tx) = driver(vec![ClusterSlot::existing("perfCluster4", "1.28.9_1544")], 10);
        driver.versions.upgrade = "1.31".to_string();

        let request = driver.select_action().unwrap();
        assert_eq!(request.action, ActionType::UpdateCluster);
        assert_eq!(request.kube_update_version.as_deref(), Some("1.29"));
        assert_eq!(request.total_workers, 0);
        assert_eq!(driver.slots()[0].state, ChurnState::Update);
    }

    #[tokio::test]
    async fn test_blocked_delete_leaves_slot_idle() {
        let (mut driver, tx) = driver(vec![slot(ChurnState::Create)], 10);
        tx.send(true).unwrap();
        driver.initiate_delete(0).unwrap();
        assert_eq!(driver.slots()[0].state, ChurnState::NoAction);
        assert_eq!(driver.active_requests(), 0);
    }

    #[tokio::test]
    async fn test_create_while_terminating_is_not_dispatched() {
        let (mut driver, tx) = driver(vec![slot(ChurnState::Delete)], 10);
        tx.send(true).unwrap();
        driver.create_cluster(0).unwrap();
        assert_eq!(driver.slots()[0].state, ChurnState::NoCluster);
        assert_eq!(driver.active_requests(), 0);
        assert_eq!(driver.pool.queued(), 0);
    }
}
