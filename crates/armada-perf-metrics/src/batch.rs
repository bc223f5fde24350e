//! Per-action buffering of request metrics between writes.
//!
//! Only one write per window is allowed. A buffer that fills before the
//! window has elapsed holds up its owner until the window closes, rather
//! than dropping measurements.

use armada_perf_core::ActionType;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::sample::RequestMetric;

/// Actions whose results are buffered.
pub const TRACKED_ACTIONS: [ActionType; 3] = [
    ActionType::CreateCluster,
    ActionType::UpdateCluster,
    ActionType::DeleteCluster,
];

/// Buffers request metrics per action and decides when they may be written.
#[derive(Debug)]
pub struct MetricsBatcher {
    capacity: usize,
    window: Duration,
    last_write: Option<Instant>,
    buffers: HashMap<ActionType, Vec<RequestMetric>>,
}

impl MetricsBatcher {
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        let buffers = TRACKED_ACTIONS
            .iter()
            .map(|action| (*action, Vec::with_capacity(capacity)))
            .collect();
        Self {
            capacity,
            window,
            last_write: None,
            buffers,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffer a metric. Returns `false` when the action is not tracked.
    pub fn record(&mut self, action: ActionType, metric: RequestMetric) -> bool {
        match self.buffers.get_mut(&action) {
            Some(buffer) => {
                buffer.push(metric);
                true
            }
            None => false,
        }
    }

    pub fn len(&self, action: ActionType) -> usize {
        self.buffers.get(&action).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.values().all(Vec::is_empty)
    }

    fn is_full(&self, action: ActionType) -> bool {
        self.len(action) >= self.capacity
    }

    pub fn any_full(&self) -> bool {
        TRACKED_ACTIONS.iter().any(|action| self.is_full(*action))
    }

    fn since_last_write(&self) -> Option<Duration> {
        self.last_write.map(|at| at.elapsed())
    }

    fn window_open(&self) -> bool {
        self.since_last_write()
            .map_or(true, |elapsed| elapsed >= self.window)
    }

    /// How long the caller must wait before a full buffer can be written.
    ///
    /// One second of slack is added so the subsequent window check is not
    /// defeated by rounding.
    pub fn wait_for_full_buffer(&self) -> Option<Duration> {
        if !self.any_full() {
            return None;
        }
        self.remaining_window()
    }

    /// Time left before the next write is allowed, if any.
    pub fn remaining_window(&self) -> Option<Duration> {
        let elapsed = self.since_last_write()?;
        if elapsed >= self.window {
            return None;
        }
        Some(self.window - elapsed + Duration::from_secs(1))
    }

    /// Take the buffers that are due for writing.
    ///
    /// With the window open, a non-empty buffer is due when it is full or
    /// when no further completion is waiting to be folded in.
    pub fn take_ready(&mut self, completions_pending: bool) -> Vec<(ActionType, Vec<RequestMetric>)> {
        if !self.window_open() {
            return Vec::new();
        }

        let mut ready = Vec::new();
        for action in TRACKED_ACTIONS {
            let due = {
                let len = self.len(action);
                len > 0 && (len >= self.capacity || !completions_pending)
            };
            if due {
                if let Some(buffer) = self.buffers.get_mut(&action) {
                    ready.push((action, std::mem::take(buffer)));
                }
            }
        }
        if !ready.is_empty() {
            self.last_write = Some(Instant::now());
        }
        ready
    }

    /// Take everything regardless of the window; used at shutdown after the
    /// caller has waited out [`remaining_window`](Self::remaining_window).
    pub fn drain_all(&mut self) -> Vec<(ActionType, Vec<RequestMetric>)> {
        let mut drained = Vec::new();
        for action in TRACKED_ACTIONS {
            if let Some(buffer) = self.buffers.get_mut(&action) {
                if !buffer.is_empty() {
                    drained.push((action, std::mem::take(buffer)));
                }
            }
        }
        self.last_write = Some(Instant::now());
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(name: &str) -> RequestMetric {
        RequestMetric {
            cluster_name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_untracked_actions_are_ignored() {
        let mut batcher = MetricsBatcher::new(2, Duration::from_secs(60));
        assert!(!batcher.record(ActionType::GetCluster, metric("a")));
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_first_write_is_not_delayed() {
        let mut batcher = MetricsBatcher::new(2, Duration::from_secs(60));
        batcher.record(ActionType::CreateCluster, metric("a"));

        assert!(batcher.wait_for_full_buffer().is_none());
        let ready = batcher.take_ready(false);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, ActionType::CreateCluster);
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_partial_buffer_waits_while_completions_pending() {
        let mut batcher = MetricsBatcher::new(3, Duration::from_secs(60));
        batcher.record(ActionType::DeleteCluster, metric("a"));

        assert!(batcher.take_ready(true).is_empty());
        assert_eq!(batcher.len(ActionType::DeleteCluster), 1);
    }

    #[test]
    fn test_full_buffer_inside_window_must_wait() {
        let mut batcher = MetricsBatcher::new(1, Duration::from_secs(60));
        batcher.record(ActionType::UpdateCluster, metric("a"));
        assert_eq!(batcher.take_ready(true).len(), 1);

        batcher.record(ActionType::UpdateCluster, metric("b"));
        let wait = batcher.wait_for_full_buffer().unwrap();
        assert!(wait > Duration::from_secs(59));
        assert!(batcher.take_ready(false).is_empty());
    }

    #[test]
    fn test_drain_all_takes_every_action() {
        let mut batcher = MetricsBatcher::new(5, Duration::from_secs(60));
        batcher.record(ActionType::CreateCluster, metric("a"));
        batcher.record(ActionType::DeleteCluster, metric("b"));
        let drained = batcher.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(batcher.is_empty());
    }
}
