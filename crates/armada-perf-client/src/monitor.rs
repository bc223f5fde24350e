//! One-line progress records printed to stdout with `--monitor`.
//!
//! These lines are scraped by dashboards, so they bypass `tracing`.

use armada_perf_core::ActionType;
use chrono::Local;
use std::time::Duration;

/// `Jan _2 15:04:05.000`
pub const STAMP_FORMAT: &str = "%b %e %H:%M:%S%.3f";

pub fn stamp() -> String {
    Local::now().format(STAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent<'a> {
    Requested,
    Succeeded {
        action_time: Duration,
        cluster_id: &'a str,
    },
    Failed {
        cluster_id: &'a str,
    },
}

/// Minutes rounded half up, matching how durations are shown on dashboards.
fn rounded_minutes(d: Duration) -> u64 {
    (d.as_secs() + 30) / 60
}

pub fn monitor_line(cluster: &str, action: ActionType, event: MonitorEvent<'_>) -> String {
    let tail = match event {
        MonitorEvent::Requested => "requested".to_string(),
        MonitorEvent::Succeeded {
            action_time,
            cluster_id,
        } => format!("succeeded {} {}", rounded_minutes(action_time), cluster_id),
        MonitorEvent::Failed { cluster_id } => format!("failed na {}", cluster_id),
    };
    format!("{}: monitor {} {} {}", stamp(), cluster, action, tail)
}

pub fn emit(cluster: &str, action: ActionType, event: MonitorEvent<'_>) {
    println!("{}", monitor_line(cluster, action, event));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_line_shapes() {
        let line = monitor_line("perfCluster1", ActionType::CreateCluster, MonitorEvent::Requested);
        assert!(line.ends_with(": monitor perfCluster1 CreateCluster requested"));

        let line = monitor_line(
            "perfCluster1",
            ActionType::DeleteCluster,
            MonitorEvent::Succeeded {
                action_time: Duration::from_secs(150),
                cluster_id: "abc123",
            },
        );
        assert!(line.ends_with("DeleteCluster succeeded 3 abc123"));

        let line = monitor_line(
            "perfCluster1",
            ActionType::UpdateCluster,
            MonitorEvent::Failed { cluster_id: "" },
        );
        assert!(line.ends_with("UpdateCluster failed na "));
    }

    #[test]
    fn test_rounded_minutes() {
        assert_eq!(rounded_minutes(Duration::from_secs(29)), 0);
        assert_eq!(rounded_minutes(Duration::from_secs(90)), 2);
    }
}
