//! Worker pool behaviour: bounded concurrency, completion delivery and
//! pulling queued work back out.

use armada_perf_client::{
    CompletedResponse, Gateway, GatewaySettings, MockTransport, PendingRequest, PollSettings,
    RawResponse, RequestExecutor, RequestTemplates, TemplateParams, WorkerPool,
};
use armada_perf_core::ActionType;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn gateway(mock: Arc<MockTransport>) -> Arc<Gateway> {
    let settings = GatewaySettings {
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
    Arc::new(Gateway::new(mock, Arc::new(templates), settings))
}

/// Sleeps per request while tracking the highest number running at once.
struct SlowExecutor {
    inner: Arc<Gateway>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl RequestExecutor for SlowExecutor {
    async fn execute(&self, request: PendingRequest) -> CompletedResponse {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let completed = self.inner.execute(request).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        completed
    }
}

#[tokio::test]
async fn test_every_request_yields_one_completion() {
    let mock = Arc::new(MockTransport::new());
    for _ in 0..3 {
        mock.respond(ActionType::DeleteCluster, RawResponse::empty(204));
    }
    let mut pool = WorkerPool::new(gateway(mock.clone()), 2, 4);

    for slot in 0..3 {
        pool.submit(
            PendingRequest::new(ActionType::DeleteCluster, format!("perfCluster{}", slot + 1))
                .with_request_num(slot),
        )
        .unwrap();
    }

    let mut seen = BTreeSet::new();
    for _ in 0..3 {
        let completed = pool.next_completion().await.unwrap();
        assert!(!completed.action_failed);
        assert!(seen.insert(completed.request_num), "duplicate completion");
    }
    assert_eq!(seen, BTreeSet::from([0, 1, 2]));
    assert!(pool.try_next_completion().is_none());
    assert_eq!(mock.count(ActionType::DeleteCluster), 3);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_concurrency_never_exceeds_worker_count() {
    let executor = Arc::new(SlowExecutor {
        inner: gateway(Arc::new(MockTransport::new())),
        running: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let mut pool = WorkerPool::new(executor.clone(), 2, 8);

    for slot in 0..6 {
        pool.submit(PendingRequest::new(ActionType::GetCluster, "perfCluster1").with_request_num(slot))
            .unwrap();
    }
    for _ in 0..6 {
        // The mock answers 404, which is still a completion
        let completed = pool.next_completion().await.unwrap();
        assert!(completed.action_failed);
    }

    assert_eq!(executor.peak.load(Ordering::SeqCst), 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_queued_requests_can_be_pulled_back() {
    let mock = Arc::new(MockTransport::new());
    let mut pool = WorkerPool::new(gateway(mock.clone()), 0, 4);

    pool.submit(PendingRequest::new(ActionType::CreateCluster, "perfCluster1").with_request_num(0))
        .unwrap();
    pool.submit(PendingRequest::new(ActionType::UpdateCluster, "perfCluster2").with_request_num(1))
        .unwrap();
    assert_eq!(pool.queued(), 2);

    let drained = pool.drain_queued();
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[1].action, ActionType::UpdateCluster);
    assert_eq!(pool.queued(), 0);
    assert!(!pool.has_pending_completion());
    assert!(mock.calls().is_empty());

    pool.shutdown().await;
}

#[tokio::test]
async fn test_pending_completion_is_not_lost() {
    let mock = Arc::new(MockTransport::new());
    let mut pool = WorkerPool::new(gateway(mock), 1, 2);
    pool.submit(PendingRequest::new(ActionType::GetCluster, "perfCluster1").with_request_num(7))
        .unwrap();

    while !pool.has_pending_completion() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(pool.has_pending_completion());
    let completed = pool.try_next_completion().unwrap();
    assert_eq!(completed.request_num, 7);

    pool.shutdown().await;
}
