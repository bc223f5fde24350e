//! Bounded job queue feeding a fixed pool of gateway workers.
//!
//! The submitting side is a single driver. Workers only ever produce
//! [`CompletedResponse`] values; they never touch caller state.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::error::{ClientError, ClientResult};
use crate::gateway::{CompletedResponse, Gateway, PendingRequest, RetryMode};

/// Executes one pending request to completion.
#[async_trait]
pub trait RequestExecutor: Send + Sync + 'static {
    async fn execute(&self, request: PendingRequest) -> CompletedResponse;
}

#[async_trait]
impl RequestExecutor for Gateway {
    async fn execute(&self, request: PendingRequest) -> CompletedResponse {
        self.perform(request, RetryMode::Single).await
    }
}

/// FIFO of requests waiting for a worker.
///
/// Every queued job holds one semaphore permit, so workers can wait on the
/// semaphore and the driver can still pull jobs back out.
pub struct JobQueue {
    jobs: Mutex<VecDeque<PendingRequest>>,
    available: Semaphore,
    capacity: usize,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Semaphore::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    pub fn push(&self, request: PendingRequest) -> ClientResult<()> {
        if self.available.is_closed() {
            return Err(ClientError::QueueClosed);
        }
        {
            let mut jobs = self.jobs.lock();
            if jobs.len() >= self.capacity {
                return Err(ClientError::QueueFull {
                    capacity: self.capacity,
                });
            }
            jobs.push_back(request);
        }
        self.available.add_permits(1);
        Ok(())
    }

    /// Wait for the next job. `None` once the queue is closed.
    async fn pop(&self) -> Option<PendingRequest> {
        loop {
            let permit = self.available.acquire().await.ok()?;
            permit.forget();
            // The driver may have drained the job this permit was for.
            if let Some(job) = self.jobs.lock().pop_front() {
                return Some(job);
            }
        }
    }

    /// Remove every job no worker has started yet.
    pub fn drain(&self) -> Vec<PendingRequest> {
        let drained: Vec<PendingRequest> = self.jobs.lock().drain(..).collect();
        for _ in &drained {
            match self.available.try_acquire() {
                Ok(permit) => permit.forget(),
                Err(_) => break,
            }
        }
        drained
    }

    pub fn close(&self) {
        self.available.close();
    }
}

/// A fixed number of workers draining a [`JobQueue`] through an executor.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    completions: mpsc::Receiver<CompletedResponse>,
    // Keeps the channel open when the pool has no workers
    _sender: mpsc::Sender<CompletedResponse>,
    buffered: VecDeque<CompletedResponse>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks. The queue and the completion channel are both
    /// sized to `capacity`.
    pub fn new(executor: Arc<dyn RequestExecutor>, workers: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let queue = Arc::new(JobQueue::new(capacity));
        let (sender, completions) = mpsc::channel(capacity);

        let handles = (0..workers)
            .map(|id| {
                let queue = Arc::clone(&queue);
                let executor = Arc::clone(&executor);
                let sender = sender.clone();
                tokio::spawn(async move {
                    while let Some(request) = queue.pop().await {
                        tracing::debug!(
                            worker = id,
                            action = %request.action,
                            cluster = %request.cluster_name,
                            "Worker picked up request"
                        );
                        let completed = executor.execute(request).await;
                        if sender.send(completed).await.is_err() {
                            break;
                        }
                    }
                    tracing::debug!(worker = id, "Worker exiting");
                })
            })
            .collect();

        Self {
            queue,
            completions,
            _sender: sender,
            buffered: VecDeque::new(),
            workers: handles,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn submit(&self, request: PendingRequest) -> ClientResult<()> {
        self.queue.push(request)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Pull back every request no worker has picked up.
    pub fn drain_queued(&self) -> Vec<PendingRequest> {
        self.queue.drain()
    }

    /// Wait for the next completion.
    pub async fn next_completion(&mut self) -> ClientResult<CompletedResponse> {
        if let Some(completed) = self.buffered.pop_front() {
            return Ok(completed);
        }
        self.completions.recv().await.ok_or(ClientError::QueueClosed)
    }

    pub fn try_next_completion(&mut self) -> Option<CompletedResponse> {
        self.buffered
            .pop_front()
            .or_else(|| self.completions.try_recv().ok())
    }

    /// Whether a completion is ready to be taken without waiting.
    pub fn has_pending_completion(&mut self) -> bool {
        if !self.buffered.is_empty() {
            return true;
        }
        match self.completions.try_recv() {
            Ok(completed) => {
                self.buffered.push_back(completed);
                true
            }
            Err(_) => false,
        }
    }

    /// Close the queue and wait for the workers to finish their current job.
    pub async fn shutdown(mut self) {
        self.queue.close();
        // Workers blocked on a full channel need room to finish.
        self.completions.close();
        while self.completions.recv().await.is_some() {}
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Worker task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_perf_core::ActionType;

    fn request(name: &str) -> PendingRequest {
        PendingRequest::new(ActionType::DeleteCluster, name)
    }

    #[test]
    fn test_queue_rejects_beyond_capacity() {
        let queue = JobQueue::new(2);
        queue.push(request("a")).unwrap();
        queue.push(request("b")).unwrap();
        assert!(matches!(
            queue.push(request("c")),
            Err(ClientError::QueueFull { capacity: 2 })
        ));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_drain_returns_jobs_in_order() {
        let queue = JobQueue::new(4);
        queue.push(request("a")).unwrap();
        queue.push(request("b")).unwrap();

        let drained: Vec<String> = queue.drain().into_iter().map(|r| r.cluster_name).collect();
        assert_eq!(drained, vec!["a", "b"]);
        assert!(queue.is_empty());
        assert_eq!(queue.available.available_permits(), 0);
    }

    #[test]
    fn test_closed_queue_refuses_jobs() {
        let queue = JobQueue::new(1);
        queue.close();
        assert!(matches!(queue.push(request("a")), Err(ClientError::QueueClosed)));
    }

    #[tokio::test]
    async fn test_pop_skips_drained_permit() {
        let queue = Arc::new(JobQueue::new(2));
        queue.push(request("a")).unwrap();
        assert_eq!(queue.drain().len(), 1);

        queue.push(request("b")).unwrap();
        let job = queue.pop().await.unwrap();
        assert_eq!(job.cluster_name, "b");
    }
}
