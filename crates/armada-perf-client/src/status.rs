//! Classification of the free-text master status reported by the API.

/// Status text the API reports while the NLB DNS entry is overdue; the master
/// is still converging.
pub const NLB_DNS_TIMEOUT_STATUS: &str = "CAE011: The domain name service for the network load balancer was not created in the allotted time (2 hours). For troubleshooting steps, see the docs: http://ibm.biz/rhoks_ts_vpn_subnet";

/// Prefix reported when an update targets the version already running.
pub const ALREADY_UP_TO_DATE_PREFIX: &str =
    "The master is already up to date for the specified version";

const READY: &str = "Ready";

const PENDING: [&str; 10] = [
    "Deploy requested.",
    "Deploy in progress.",
    "Version update requested.",
    "Version update in progress.",
    "Delete requested.",
    "Delete in progress.",
    "VPN server configuration update in progress.",
    "VPN server configuration update requested.",
    NLB_DNS_TIMEOUT_STATUS,
    "",
];

const FAILED_MARKERS: [&str; 2] = ["Version update failed.", "Version update cancelled."];

/// Coarse master state derived from `masterStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterStatus {
    /// Still converging; keep polling
    Pending,
    Ready,
    /// A version update failed or was cancelled
    Failed,
    /// Text not seen before
    Unrecognized,
}

impl MasterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MasterStatus::Pending => "pending",
            MasterStatus::Ready => "ready",
            MasterStatus::Failed => "failed",
            MasterStatus::Unrecognized => "unrecognized",
        }
    }
}

pub fn classify_master_status(raw: &str) -> MasterStatus {
    if raw == READY {
        MasterStatus::Ready
    } else if PENDING.contains(&raw) {
        MasterStatus::Pending
    } else if FAILED_MARKERS.iter().any(|marker| raw.contains(marker)) {
        MasterStatus::Failed
    } else {
        MasterStatus::Unrecognized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_is_exact() {
        assert_eq!(classify_master_status("Ready"), MasterStatus::Ready);
        assert_eq!(classify_master_status("ready"), MasterStatus::Unrecognized);
        assert_eq!(classify_master_status("Ready."), MasterStatus::Unrecognized);
    }

    #[test]
    fn test_pending_statuses() {
        for status in PENDING {
            assert_eq!(classify_master_status(status), MasterStatus::Pending, "{status}");
        }
    }

    #[test]
    fn test_failed_update_markers() {
        assert_eq!(
            classify_master_status("Version update failed. Rolling back."),
            MasterStatus::Failed
        );
        assert_eq!(
            classify_master_status("Delete in progress. Version update cancelled."),
            MasterStatus::Failed
        );
    }

    #[test]
    fn test_unknown_text() {
        assert_eq!(
            classify_master_status("Something new happened."),
            MasterStatus::Unrecognized
        );
    }
}
