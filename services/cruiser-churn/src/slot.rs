//! Per-cluster churn bookkeeping.

use std::fmt;

/// Where a slot is in its create/update/delete cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChurnState {
    #[default]
    NoCluster,
    Create,
    Update,
    Delete,
    /// Cluster exists and nothing is outstanding
    NoAction,
    /// Gave up after repeated delete failures; needs manual cleanup
    Freeze,
}

impl ChurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChurnState::NoCluster => "no_cluster",
            ChurnState::Create => "create",
            ChurnState::Update => "update",
            ChurnState::Delete => "delete",
            ChurnState::NoAction => "no_action",
            ChurnState::Freeze => "freeze",
        }
    }

    /// A request for the slot is queued or running.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ChurnState::Create | ChurnState::Update | ChurnState::Delete)
    }

    /// The slot may be picked for a new action.
    pub fn is_actionable(&self) -> bool {
        matches!(self, ChurnState::NoCluster | ChurnState::NoAction)
    }
}

impl fmt::Display for ChurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concurrently managed cluster identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSlot {
    /// Empty until the slot first creates a cluster
    pub name: String,
    pub master_version: String,
    pub state: ChurnState,
    pub delete_failures: u32,
}

impl ClusterSlot {
    /// A cluster found on the carrier at startup.
    pub fn existing(name: impl Into<String>, master_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            master_version: master_version.into(),
            state: ChurnState::NoAction,
            delete_failures: 0,
        }
    }
}
