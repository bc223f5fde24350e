//! Work done once before churning starts: find the clusters a previous run
//! left behind and settle which kube versions to create and upgrade to.

use armada_perf_client::{Gateway, KubeVersions, PendingRequest, RetryMode};
use armada_perf_core::ActionType;
use serde_json::Value;

use crate::error::{ChurnError, ChurnResult};
use crate::settings::ChurnSettings;
use crate::slot::ClusterSlot;

/// Initial slot table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub slots: Vec<ClusterSlot>,
    /// Sequence number of the next cluster name
    pub next_seq: u64,
}

impl Discovery {
    /// No clusters on the carrier yet.
    pub fn empty(clusters: usize) -> Self {
        Self {
            slots: vec![ClusterSlot::default(); clusters],
            next_seq: 1,
        }
    }
}

/// Build the slot table from a GetClusters body.
///
/// Every cluster named `prefix<N>` takes a slot in NoAction; numbering
/// continues after the highest `N` seen.
pub fn slots_from_clusters(body: &Value, prefix: &str, clusters: usize) -> ChurnResult<Discovery> {
    let entries = body
        .as_array()
        .ok_or_else(|| ChurnError::Startup("GetClusters did not return a list".to_string()))?;

    let mut discovery = Discovery::empty(clusters);
    let mut found = 0usize;
    let mut max_index = 0u64;

    for entry in entries {
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        let Some(index) = name
            .strip_prefix(prefix)
            .and_then(|suffix| suffix.parse::<u64>().ok())
        else {
            continue;
        };

        if found >= clusters {
            return Err(ChurnError::TooManyClusters {
                found: found + 1,
                slots: clusters,
            });
        }
        let version = entry
            .get("masterKubeVersion")
            .and_then(Value::as_str)
            .unwrap_or_default();
        discovery.slots[found] = ClusterSlot::existing(name, version);
        found += 1;
        max_index = max_index.max(index);
    }

    discovery.next_seq = max_index + 1;
    tracing::info!(found, next_seq = discovery.next_seq, prefix = %prefix, "Existing clusters discovered");
    Ok(discovery)
}

pub async fn discover(gateway: &Gateway, settings: &ChurnSettings) -> ChurnResult<Discovery> {
    let response = gateway
        .perform(PendingRequest::new(ActionType::GetClusters, ""), RetryMode::Single)
        .await;
    if response.action_failed {
        return Err(ChurnError::Startup(format!(
            "request to find existing clusters failed with status {}",
            response.status
        )));
    }
    let body = response
        .json()
        .ok_or_else(|| ChurnError::Startup("GetClusters returned a malformed body".to_string()))?;
    slots_from_clusters(&body, &settings.prefix, settings.clusters)
}

pub async fn fetch_kube_versions(gateway: &Gateway, openshift: bool) -> ChurnResult<KubeVersions> {
    let response = gateway
        .perform(PendingRequest::new(ActionType::GetVersions, ""), RetryMode::Single)
        .await;
    if response.action_failed {
        return Err(ChurnError::Startup(format!(
            "request to find kube versions failed with status {}",
            response.status
        )));
    }
    Ok(KubeVersions::parse(&response.body, openshift)?)
}

/// Kube versions for the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionPlan {
    /// Version put in create requests; empty lets the API choose
    pub create: String,
    /// Version new clusters are expected to come up with
    pub default: String,
    pub upgrade: String,
}

/// Work out the create, default and upgrade versions, asking the API when
/// no default was given or when following its default.
pub async fn plan_versions(gateway: &Gateway, settings: &ChurnSettings) -> ChurnResult<VersionPlan> {
    let plan = if settings.default_version.is_empty() || settings.follow_kube_version {
        let versions = fetch_kube_versions(gateway, settings.openshift).await?;
        if settings.follow_kube_version {
            VersionPlan {
                create: String::new(),
                default: versions.default,
                upgrade: versions.next,
            }
        } else {
            VersionPlan {
                create: versions.default.clone(),
                default: versions.default,
                upgrade: settings.upgrade_version.clone(),
            }
        }
    } else {
        VersionPlan {
            create: settings.default_version.clone(),
            default: settings.default_version.clone(),
            upgrade: settings.upgrade_version.clone(),
        }
    };

    tracing::info!(
        create = %plan.default,
        upgrade = %plan.upgrade,
        "Kube versions"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::ChurnState;
    use serde_json::json;

    #[test]
    fn test_existing_clusters_fill_slots() {
        let body = json!([
            {"name": "perfCluster3", "masterKubeVersion": "1.30.2_1540"},
            {"name": "otherCluster9", "masterKubeVersion": "1.29.1"},
            {"name": "perfClusterX", "masterKubeVersion": "1.29.1"},
            {"name": "perfCluster12", "masterKubeVersion": "1.31.0"}
        ]);
        let discovery = slots_from_clusters(&body, "perfCluster", 4).unwrap();

        assert_eq!(discovery.next_seq, 13);
        assert_eq!(discovery.slots[0], ClusterSlot::existing("perfCluster3", "1.30.2_1540"));
        assert_eq!(discovery.slots[1].name, "perfCluster12");
        assert_eq!(discovery.slots[2].state, ChurnState::NoCluster);
        assert_eq!(discovery.slots[3].state, ChurnState::NoCluster);
    }

    #[test]
    fn test_no_clusters_start_at_one() {
        let discovery = slots_from_clusters(&json!([]), "perfCluster", 2).unwrap();
        assert_eq!(discovery, Discovery::empty(2));
    }

    #[test]
    fn test_more_clusters_than_slots_is_fatal() {
        let body = json!([
            {"name": "perfCluster1", "masterKubeVersion": "1.30"},
            {"name": "perfCluster2", "masterKubeVersion": "1.30"}
        ]);
        assert!(matches!(
            slots_from_clusters(&body, "perfCluster", 1),
            Err(ChurnError::TooManyClusters { found: 2, slots: 1 })
        ));
    }
}
