//! Mapping of cluster API calls onto HTTP requests.

use armada_perf_core::ActionType;
use reqwest::Method;
use serde_json::json;

/// A fully specified call against the cluster API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    CreateCluster { body: String },
    GetClusters,
    GetCluster { name: String, show_resources: bool },
    GetClusterWorkers { name: String },
    AddClusterWorkers { name: String, body: String },
    UpdateCluster { name: String, version: String },
    DeleteCluster { name: String, delete_resources: bool },
    GetVersions,
}

impl ApiCall {
    pub fn action(&self) -> ActionType {
        match self {
            ApiCall::CreateCluster { .. } => ActionType::CreateCluster,
            ApiCall::GetClusters => ActionType::GetClusters,
            ApiCall::GetCluster { .. } => ActionType::GetCluster,
            ApiCall::GetClusterWorkers { .. } => ActionType::GetClusterWorkers,
            ApiCall::AddClusterWorkers { .. } => ActionType::AddClusterWorkers,
            ApiCall::UpdateCluster { .. } => ActionType::UpdateCluster,
            ApiCall::DeleteCluster { .. } => ActionType::DeleteCluster,
            ApiCall::GetVersions => ActionType::GetVersions,
        }
    }

    pub fn method(&self) -> Method {
        match self {
            ApiCall::CreateCluster { .. } | ApiCall::AddClusterWorkers { .. } => Method::POST,
            ApiCall::UpdateCluster { .. } => Method::PUT,
            ApiCall::DeleteCluster { .. } => Method::DELETE,
            _ => Method::GET,
        }
    }

    /// Path and query relative to the versioned API root.
    pub fn path(&self) -> String {
        match self {
            ApiCall::CreateCluster { .. } | ApiCall::GetClusters => "/clusters".to_string(),
            ApiCall::GetCluster {
                name,
                show_resources,
            } => format!("/clusters/{}?showResources={}", name, show_resources),
            ApiCall::GetClusterWorkers { name } | ApiCall::AddClusterWorkers { name, .. } => {
                format!("/clusters/{}/workers", name)
            }
            ApiCall::UpdateCluster { name, .. } => format!("/clusters/{}", name),
            ApiCall::DeleteCluster {
                name,
                delete_resources,
            } => format!("/clusters/{}?deleteResources={}", name, delete_resources),
            ApiCall::GetVersions => "/versions".to_string(),
        }
    }

    pub fn body(&self) -> Option<String> {
        match self {
            ApiCall::CreateCluster { body } | ApiCall::AddClusterWorkers { body, .. } => {
                Some(body.clone())
            }
            ApiCall::UpdateCluster { version, .. } => {
                Some(json!({ "action": "update", "version": version }).to_string())
            }
            _ => None,
        }
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path())
    }

    /// Cluster the call targets, if any.
    pub fn cluster_name(&self) -> Option<&str> {
        match self {
            ApiCall::GetCluster { name, .. }
            | ApiCall::GetClusterWorkers { name }
            | ApiCall::AddClusterWorkers { name, .. }
            | ApiCall::UpdateCluster { name, .. }
            | ApiCall::DeleteCluster { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_table() {
        let base = "http://localhost:6969/v1/";
        let get = ApiCall::GetCluster {
            name: "perfCluster1".to_string(),
            show_resources: false,
        };
        assert_eq!(get.method(), Method::GET);
        assert_eq!(
            get.url(base),
            "http://localhost:6969/v1/clusters/perfCluster1?showResources=false"
        );

        let delete = ApiCall::DeleteCluster {
            name: "perfCluster1".to_string(),
            delete_resources: true,
        };
        assert_eq!(delete.method(), Method::DELETE);
        assert_eq!(delete.path(), "/clusters/perfCluster1?deleteResources=true");
        assert_eq!(delete.action(), ActionType::DeleteCluster);

        assert_eq!(ApiCall::GetVersions.path(), "/versions");
        assert_eq!(ApiCall::GetClusters.cluster_name(), None);
    }

    #[test]
    fn test_update_body() {
        let update = ApiCall::UpdateCluster {
            name: "c".to_string(),
            version: "1.31".to_string(),
        };
        assert_eq!(update.method(), Method::PUT);
        let body: serde_json::Value = serde_json::from_str(&update.body().unwrap()).unwrap();
        assert_eq!(body["action"], "update");
        assert_eq!(body["version"], "1.31");
    }
}
