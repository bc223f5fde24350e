//! Cluster API actions understood by the harness.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A single logical request against the cluster API (or, for
/// `ChurnClusters`, the long-running churn mode built on top of them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    ChurnClusters,
    CreateCluster,
    GetClusters,
    GetCluster,
    GetClusterWorkers,
    AddClusterWorkers,
    UpdateCluster,
    DeleteCluster,
    GetVersions,
}

impl ActionType {
    pub const ALL: [ActionType; 9] = [
        ActionType::ChurnClusters,
        ActionType::CreateCluster,
        ActionType::GetClusters,
        ActionType::GetCluster,
        ActionType::GetClusterWorkers,
        ActionType::AddClusterWorkers,
        ActionType::UpdateCluster,
        ActionType::DeleteCluster,
        ActionType::GetVersions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ChurnClusters => "ChurnClusters",
            ActionType::CreateCluster => "CreateCluster",
            ActionType::GetClusters => "GetClusters",
            ActionType::GetCluster => "GetCluster",
            ActionType::GetClusterWorkers => "GetClusterWorkers",
            ActionType::AddClusterWorkers => "AddClusterWorkers",
            ActionType::UpdateCluster => "UpdateCluster",
            ActionType::DeleteCluster => "DeleteCluster",
            ActionType::GetVersions => "GetVersions",
        }
    }

    /// Whether the action targets a named cluster.
    pub fn has_cluster(&self) -> bool {
        !matches!(self, ActionType::GetClusters | ActionType::GetVersions)
    }

    /// Whether the action brings new workers into existence.
    pub fn worker_creation(&self) -> bool {
        matches!(
            self,
            ActionType::CreateCluster | ActionType::AddClusterWorkers
        )
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .iter()
            .copied()
            .find(|action| action.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::unknown_action(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "churnclusters".parse::<ActionType>().unwrap(),
            ActionType::ChurnClusters
        );
        assert_eq!(
            "DeleteCluster".parse::<ActionType>().unwrap(),
            ActionType::DeleteCluster
        );
        assert!("Explode".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_action_flags() {
        assert!(ActionType::CreateCluster.worker_creation());
        assert!(ActionType::AddClusterWorkers.worker_creation());
        assert!(!ActionType::GetClusterWorkers.worker_creation());

        assert!(ActionType::GetCluster.has_cluster());
        assert!(!ActionType::GetClusters.has_cluster());
        assert!(!ActionType::GetVersions.has_cluster());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for action in ActionType::ALL {
            assert_eq!(action.to_string().parse::<ActionType>().unwrap(), action);
        }
    }
}
