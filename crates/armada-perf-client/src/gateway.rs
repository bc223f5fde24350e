//! The request gateway: one logical cluster action in, one completed
//! response out.
//!
//! A gateway call never returns an error. Transport failures, rejected
//! requests and failed polls all come back as a [`CompletedResponse`] with
//! `action_failed` set, leaving remediation to the caller.

use armada_perf_core::metrics::{REQUESTS_TOTAL, REQUEST_DURATION};
use armada_perf_core::{ActionType, PerfConfig};
use armada_perf_metrics::RequestMetric;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::monitor::{self, MonitorEvent};
use crate::poll::{poll_master, poll_workers, PollSettings};
use crate::route::ApiCall;
use crate::template::RequestTemplates;
use crate::transport::{RawResponse, Transport};

const UNTIL_SUCCESS_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Failure signature recognised in a non-JSON error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureKind {
    #[default]
    Unspecified,
    /// The edge proxy answered instead of the API
    Cloudflare,
    BackendIssue,
}

impl FailureKind {
    fn from_body(body: &str) -> Self {
        if body.contains("cloudflare") {
            FailureKind::Cloudflare
        } else if body.contains("A backend issue occurred")
            || body.contains("Could not connect to a backend service")
        {
            FailureKind::BackendIssue
        } else {
            FailureKind::Unspecified
        }
    }
}

/// How persistently to retry a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// One attempt, plus a single re-authenticated retry on 401 (and on 500
    /// for CreateCluster).
    Single,
    /// Retry with exponential backoff until a 2xx or 404 arrives.
    UntilSuccess,
}

/// A unit of work for the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub action: ActionType,
    pub cluster_name: String,
    /// Caller's correlation index (the churn slot)
    pub request_num: usize,
    /// Version to update to; falls back to the create version
    pub kube_update_version: Option<String>,
    pub total_workers: i64,
}

impl PendingRequest {
    pub fn new(action: ActionType, cluster_name: impl Into<String>) -> Self {
        Self {
            action,
            cluster_name: cluster_name.into(),
            request_num: 0,
            kube_update_version: None,
            total_workers: 0,
        }
    }

    pub fn with_request_num(mut self, request_num: usize) -> Self {
        self.request_num = request_num;
        self
    }

    pub fn with_workers(mut self, total_workers: i64) -> Self {
        self.total_workers = total_workers;
        self
    }

    pub fn with_update_version(mut self, version: impl Into<String>) -> Self {
        self.kube_update_version = Some(version.into());
        self
    }
}

/// Outcome of one gateway call.
#[derive(Debug, Clone)]
pub struct CompletedResponse {
    pub action: ActionType,
    pub cluster_name: String,
    pub request_num: usize,
    /// HTTP status of the final exchange; 0 when none completed
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
    pub action_failed: bool,
    pub response_time: Duration,
    /// Zero unless a poll loop ran to a successful end
    pub action_time: Duration,
    pub cluster_id: Option<String>,
    pub failure: FailureKind,
    pub metrics: RequestMetric,
}

impl CompletedResponse {
    fn for_request(request: &PendingRequest) -> Self {
        Self {
            action: request.action,
            cluster_name: request.cluster_name.clone(),
            request_num: request.request_num,
            status: 0,
            content_type: String::new(),
            body: Bytes::new(),
            action_failed: false,
            response_time: Duration::ZERO,
            action_time: Duration::ZERO,
            cluster_id: None,
            failure: FailureKind::Unspecified,
            metrics: RequestMetric::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body parsed as JSON, if it is JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Fold the timing and failure fields into the metric record.
    fn finalise_metrics(&mut self) {
        self.metrics.cluster_name = self.cluster_name.clone();
        self.metrics.response_time = self.response_time;
        self.metrics.action_time = self.action_time;
        self.metrics.action_failed = self.action_failed;
        self.metrics.backend_failed = self.action_failed && self.failure != FailureKind::Unspecified;
    }
}

/// Hook for environments where cluster provisioning is simulated.
pub trait ProvisionNotifier: Send + Sync {
    fn cluster_created(&self, cluster_id: &str);

    fn workers_added(&self, cluster_name: &str);
}

/// Gateway behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub poll: PollSettings,
    pub reauth_delay: Duration,
    pub show_resources: bool,
    pub delete_resources: bool,
    /// Print `--monitor` lines for each request
    pub monitor: bool,
}

impl GatewaySettings {
    pub fn from_config(config: &PerfConfig) -> Self {
        Self {
            poll: PollSettings::from_config(&config.request),
            reauth_delay: config.request.reauth_delay(),
            show_resources: config.request.show_resources,
            delete_resources: config.request.delete_resources,
            monitor: false,
        }
    }
}

pub struct Gateway {
    transport: Arc<dyn Transport>,
    templates: Arc<RequestTemplates>,
    settings: GatewaySettings,
    notifier: Option<Arc<dyn ProvisionNotifier>>,
}

impl Gateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        templates: Arc<RequestTemplates>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            transport,
            templates,
            settings,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ProvisionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn templates(&self) -> &RequestTemplates {
        &self.templates
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub async fn authenticate(&self) -> crate::ClientResult<()> {
        self.transport.authenticate().await
    }

    /// Translate a request into the concrete API call.
    ///
    /// Actions that have no route here (`ChurnClusters`) map to `None`.
    pub fn build_call(&self, request: &PendingRequest) -> Option<ApiCall> {
        let name = request.cluster_name.clone();
        let call = match request.action {
            ActionType::CreateCluster => ApiCall::CreateCluster {
                body: self.templates.create_body(&name, request.total_workers),
            },
            ActionType::GetClusters => ApiCall::GetClusters,
            ActionType::GetCluster => ApiCall::GetCluster {
                name,
                show_resources: self.settings.show_resources,
            },
            ActionType::GetClusterWorkers => ApiCall::GetClusterWorkers { name },
            ActionType::AddClusterWorkers => ApiCall::AddClusterWorkers {
                name,
                body: self.templates.add_workers_body(request.total_workers),
            },
            ActionType::UpdateCluster => ApiCall::UpdateCluster {
                name,
                version: request
                    .kube_update_version
                    .clone()
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| self.templates.kube_version()),
            },
            ActionType::DeleteCluster => ApiCall::DeleteCluster {
                name,
                delete_resources: self.settings.delete_resources,
            },
            ActionType::GetVersions => ApiCall::GetVersions,
            ActionType::ChurnClusters => return None,
        };
        Some(call)
    }

    async fn reauthenticate(&self) {
        if let Err(e) = self.transport.authenticate().await {
            tracing::warn!(error = %e, "Re-authentication failed");
        }
    }

    /// Perform one action, polling for completion where the action calls
    /// for it.
    pub async fn perform(&self, request: PendingRequest, mode: RetryMode) -> CompletedResponse {
        let mut completed = CompletedResponse::for_request(&request);
        let Some(call) = self.build_call(&request) else {
            tracing::error!(action = %request.action, "Action has no API route");
            completed.action_failed = true;
            completed.finalise_metrics();
            return completed;
        };

        tracing::info!(
            action = %request.action,
            cluster = %request.cluster_name,
            path = %call.path(),
            "API request"
        );
        if self.settings.monitor {
            monitor::emit(&request.cluster_name, request.action, MonitorEvent::Requested);
        }

        let exchange = match mode {
            RetryMode::Single => self.send_single(&call, &request).await,
            RetryMode::UntilSuccess => Some(self.send_until_success(&call).await),
        };
        let Some((response, started)) = exchange else {
            completed.action_failed = true;
            REQUESTS_TOTAL
                .with_label_values(&[request.action.as_str(), "failed"])
                .inc();
            completed.finalise_metrics();
            return completed;
        };
        completed.response_time = started.elapsed();
        REQUEST_DURATION
            .with_label_values(&[request.action.as_str()])
            .observe(completed.response_time.as_secs_f64());

        tracing::info!(
            action = %request.action,
            cluster = %request.cluster_name,
            status = response.status,
            response_time = ?completed.response_time,
            "API response"
        );

        self.inspect_body(&request, &response, &mut completed);
        completed.status = response.status;
        completed.content_type = response.content_type;
        completed.body = response.body;

        if completed.is_success() {
            self.after_success(&request, started, &mut completed).await;
        } else {
            completed.action_failed = true;
        }

        let outcome = if completed.action_failed { "failed" } else { "ok" };
        REQUESTS_TOTAL
            .with_label_values(&[request.action.as_str(), outcome])
            .inc();
        completed.finalise_metrics();
        completed
    }

    /// Single attempt. A 401, or a 500 from CreateCluster, gets one retry
    /// with fresh credentials after `reauth_delay`.
    async fn send_single(
        &self,
        call: &ApiCall,
        request: &PendingRequest,
    ) -> Option<(RawResponse, Instant)> {
        let mut started = Instant::now();
        let mut response = match self.transport.send(call).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(cluster = %request.cluster_name, action = %request.action, error = %e, "Request failed");
                return None;
            }
        };

        let retry = response.status == 401
            || (response.status == 500 && request.action == ActionType::CreateCluster);
        if retry {
            tracing::warn!(
                cluster = %request.cluster_name,
                status = response.status,
                "Request failed, retrying after re-authentication"
            );
            self.reauthenticate().await;
            tokio::time::sleep(self.settings.reauth_delay).await;

            started = Instant::now();
            response = match self.transport.send(call).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(cluster = %request.cluster_name, error = %e, "Second request failed");
                    return None;
                }
            };
            tracing::info!(
                cluster = %request.cluster_name,
                status = response.status,
                "Second request completed"
            );
        }
        Some((response, started))
    }

    async fn send_until_success(&self, call: &ApiCall) -> (RawResponse, Instant) {
        let mut backoff = Duration::from_millis(1);
        loop {
            let started = Instant::now();
            match self.transport.send(call).await {
                Ok(response) if response.is_success() || response.status == 404 => {
                    return (response, started);
                }
                Ok(response) if response.status == 401 => {
                    tracing::info!(path = %call.path(), "Retrying request after re-authenticating");
                    self.reauthenticate().await;
                }
                Ok(response) => {
                    tracing::info!(path = %call.path(), status = response.status, "Retrying request");
                }
                Err(e) => {
                    tracing::warn!(path = %call.path(), error = %e, "Request failed, retrying");
                    self.reauthenticate().await;
                }
            }
            tokio::time::sleep(backoff).await;
            if backoff < UNTIL_SUCCESS_MAX_BACKOFF {
                backoff *= 10;
            }
        }
    }

    fn inspect_body(&self, request: &PendingRequest, response: &RawResponse, completed: &mut CompletedResponse) {
        if response.status == 204 {
            return;
        }
        let body = String::from_utf8_lossy(&response.body);
        if response.is_json() {
            let quiet_not_found = request.action == ActionType::GetCluster && response.status == 404;
            if response.is_success() || quiet_not_found {
                tracing::debug!(cluster = %request.cluster_name, body = %body, "Response body");
            } else {
                tracing::warn!(cluster = %request.cluster_name, status = response.status, body = %body, "Error response body");
            }
        } else if !response.content_type.contains("application/zip") {
            tracing::warn!(
                cluster = %request.cluster_name,
                status = response.status,
                body = %body,
                "Unexpected response content"
            );
            completed.failure = FailureKind::from_body(&body);
            if completed.failure != FailureKind::Unspecified {
                tracing::error!(cluster = %request.cluster_name, failure = ?completed.failure, "Request failed upstream");
            }
        }
    }

    async fn after_success(&self, request: &PendingRequest, started: Instant, completed: &mut CompletedResponse) {
        let mut poll_master_eligible = false;
        let mut poll_workers_eligible = false;

        match request.action {
            ActionType::CreateCluster => {
                poll_master_eligible = true;
                poll_workers_eligible = request.total_workers > 0;
                let id = completed
                    .json()
                    .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string));
                match id {
                    Some(id) => {
                        if let Some(notifier) = &self.notifier {
                            notifier.cluster_created(&id);
                        }
                        completed.cluster_id = Some(id);
                    }
                    None => {
                        tracing::error!(cluster = %request.cluster_name, "CreateCluster response carried no cluster id");
                        completed.action_failed = true;
                    }
                }
            }
            ActionType::DeleteCluster | ActionType::UpdateCluster => poll_master_eligible = true,
            ActionType::AddClusterWorkers => {
                poll_workers_eligible = true;
                if let Some(notifier) = &self.notifier {
                    notifier.workers_added(&request.cluster_name);
                }
            }
            ActionType::GetClusterWorkers => poll_workers_eligible = true,
            _ => {}
        }

        let poll = self.settings.poll;
        if poll_master_eligible && !completed.action_failed && poll.master_interval > Duration::ZERO {
            let target = request
                .kube_update_version
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| self.templates.kube_version());
            match poll_master(
                self.transport.as_ref(),
                &poll,
                request.action,
                &request.cluster_name,
                &target,
                started,
            )
            .await
            {
                Some(action_time) => completed.action_time = action_time,
                None => completed.action_failed = true,
            }
        }

        if poll_workers_eligible && !completed.action_failed && poll.worker_interval > Duration::ZERO {
            completed.action_time = poll_workers(
                self.transport.as_ref(),
                &poll,
                &request.cluster_name,
                started,
                &mut completed.metrics,
            )
            .await;
        }
    }
}
