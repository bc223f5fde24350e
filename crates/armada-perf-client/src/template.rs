//! Request body templates with placeholder substitution.
//!
//! Only the first occurrence of each placeholder is replaced, so templates
//! that need a value twice must spell it out with a second placeholder.

use armada_perf_core::PerfConfig;
use parking_lot::RwLock;
use std::path::Path;

use crate::error::{ClientError, ClientResult};

/// Machine type of single-worker free clusters; VLAN lines are dropped for it.
pub const FREE_MACHINE_TYPE: &str = "free";

/// Values substituted into the create and add-workers templates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateParams {
    pub machine_type: String,
    pub datacenter: String,
    pub private_vlan: String,
    pub public_vlan: String,
    pub billing: String,
    pub isolation: String,
    pub portable_subnet: bool,
    pub disk_encryption: bool,
}

impl TemplateParams {
    /// Build from configuration. `churn_vlans` selects the VLAN pair
    /// reserved for churn runs.
    pub fn from_config(config: &PerfConfig, machine_type: &str, churn_vlans: bool) -> Self {
        let softlayer = &config.softlayer;
        let (private_vlan, public_vlan) = if churn_vlans {
            (&softlayer.churn_private_vlan, &softlayer.churn_public_vlan)
        } else {
            (&softlayer.private_vlan, &softlayer.public_vlan)
        };
        Self {
            machine_type: machine_type.to_string(),
            datacenter: config.location.qualified_datacenter(),
            private_vlan: private_vlan.clone(),
            public_vlan: public_vlan.clone(),
            billing: softlayer.billing.clone(),
            isolation: softlayer.isolation.clone(),
            portable_subnet: softlayer.portable_subnet,
            disk_encryption: softlayer.disk_encryption,
        }
    }
}

#[derive(Debug, Default)]
struct Rendered {
    kube_version: String,
    body: String,
}

/// Loaded templates. The create template is pre-rendered with everything
/// except the per-request cluster name and worker count.
#[derive(Debug)]
pub struct RequestTemplates {
    create_lines: Vec<String>,
    add_workers: String,
    params: TemplateParams,
    rendered: RwLock<Rendered>,
}

fn read_template(path: &Path) -> ClientResult<String> {
    std::fs::read_to_string(path).map_err(|source| ClientError::Template {
        path: path.to_path_buf(),
        source,
    })
}

impl RequestTemplates {
    /// Read both templates from `request.template_dir`.
    pub fn load(config: &PerfConfig, params: TemplateParams, kube_version: &str) -> ClientResult<Self> {
        let create = read_template(&config.request.resolve(&config.request.create_cluster_template))?;
        let add_workers = read_template(&config.request.resolve(&config.request.add_workers_template))?;
        Ok(Self::from_strings(&create, add_workers, params, kube_version))
    }

    pub fn from_strings(
        create: &str,
        add_workers: impl Into<String>,
        params: TemplateParams,
        kube_version: &str,
    ) -> Self {
        let free = params.machine_type == FREE_MACHINE_TYPE;
        let create_lines = create
            .lines()
            .filter(|line| !(free && line.contains("VLAN%")))
            .map(str::to_string)
            .collect();

        let templates = Self {
            create_lines,
            add_workers: add_workers.into(),
            params,
            rendered: RwLock::new(Rendered::default()),
        };
        templates.set_kube_version(kube_version);
        templates
    }

    pub fn params(&self) -> &TemplateParams {
        &self.params
    }

    pub fn kube_version(&self) -> String {
        self.rendered.read().kube_version.clone()
    }

    /// Switch the kube version used for new clusters and re-render.
    ///
    /// Lines mentioning the kube version placeholder are only kept while a
    /// version is set.
    pub fn set_kube_version(&self, kube_version: &str) {
        let p = &self.params;
        let joined = self
            .create_lines
            .iter()
            .filter(|line| !kube_version.is_empty() || !line.contains("KUBEVERSION%"))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");

        let mut body = joined.replacen("%MACHINETYPE%", &p.machine_type, 1);
        if !kube_version.is_empty() {
            body = body.replacen("%KUBEVERSION%", kube_version, 1);
        }
        body = body
            .replacen("%DATACENTER%", &p.datacenter, 1)
            .replacen("%PRIVATEVLAN%", &p.private_vlan, 1)
            .replacen("%PUBLICVLAN%", &p.public_vlan, 1)
            .replacen("%BILLING%", &p.billing, 1)
            .replacen("%ISOLATION%", &p.isolation, 1)
            .replacen("%NOSUBNET%", &(!p.portable_subnet).to_string(), 1)
            .replacen("%DISKENCRYPTION%", &p.disk_encryption.to_string(), 1);

        let mut rendered = self.rendered.write();
        rendered.kube_version = kube_version.to_string();
        rendered.body = body;
    }

    pub fn create_body(&self, cluster_name: &str, total_workers: i64) -> String {
        self.rendered
            .read()
            .body
            .replacen("%CLUSTERNAME%", cluster_name, 1)
            .replacen("\"%WORKERNUM%\"", &total_workers.to_string(), 1)
    }

    pub fn add_workers_body(&self, total_workers: i64) -> String {
        let p = &self.params;
        self.add_workers
            .replacen("\"%WORKERNUM%\"", &total_workers.to_string(), 1)
            .replacen("%MACHINETYPE%", &p.machine_type, 1)
            .replacen("%DISKENCRYPTION%", &p.disk_encryption.to_string(), 1)
            .replacen("%PRIVATEVLAN%", &p.private_vlan, 1)
            .replacen("%PUBLICVLAN%", &p.public_vlan, 1)
    }
}
