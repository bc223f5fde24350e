//! Configuration management for the performance harness
//!
//! This module provides a centralized configuration system that supports:
//! - TOML configuration files
//! - Environment variable overrides
//! - Reasonable defaults
//! - Configuration validation

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure for the harness
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PerfConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub location: LocationConfig,

    #[serde(default)]
    pub softlayer: SoftlayerConfig,

    #[serde(default)]
    pub request: RequestConfig,

    #[serde(default)]
    pub churn: ChurnConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl PerfConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. Config file passed in, else the one named by ARMADA_PERF_CONFIG
    /// 3. ./config/perf.toml
    /// 4. Hardcoded defaults (lowest priority)
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = Self::set_defaults(builder)?;

        builder = builder.add_source(File::with_name("./config/perf").required(false));

        match explicit {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None => {
                if let Ok(config_path) = std::env::var("ARMADA_PERF_CONFIG") {
                    builder = builder.add_source(File::with_name(&config_path).required(false));
                }
            }
        }

        // Example: ARMADA_PERF__CHURN__MAX_DELETE_FAILURES=5
        builder = builder.add_source(
            Environment::with_prefix("ARMADA_PERF")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: PerfConfig = builder.build()?.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Set default values for all configuration options
    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            // API server
            .set_default("api.scheme", "http")?
            .set_default("api.host", "localhost")?
            .set_default("api.port", 6969)?
            .set_default("api.version", "v1")?
            .set_default("api.request_timeout_secs", 300)?
            // Authentication
            .set_default("auth.dummy", false)?
            .set_default("auth.iam_url", "https://iam.cloud.ibm.com")?
            .set_default("auth.token_file", "dummy_iam_token")?
            // Requests
            .set_default("request.template_dir", "config")?
            .set_default("request.create_cluster_template", "create_cluster.json")?
            .set_default("request.add_workers_template", "add_workers.json")?
            .set_default("request.worker_poll_interval_secs", 30)?
            .set_default("request.master_poll_interval_secs", 30)?
            .set_default("request.ready_grace_period_secs", 60)?
            .set_default("request.reauth_delay_secs", 10)?
            // Churn
            .set_default("churn.max_delete_failures", 3)?
            .set_default("churn.watchdog_attempts", 1000)?
            .set_default("churn.submit_delay_millis", 5000)?
            .set_default("churn.state_retry_millis", 1000)?
            .set_default("churn.metrics_window_secs", 60)?
            // Metrics
            .set_default("metrics.influx_port", 8086)?
            .set_default("metrics.fallback_dir", "/performance/metrics")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.host.trim().is_empty() {
            return Err(ConfigError::Message("api.host must not be empty".to_string()));
        }

        if self.api.port == 0 {
            return Err(ConfigError::Message("api.port must be > 0".to_string()));
        }

        if !matches!(self.api.scheme.as_str(), "http" | "https") {
            return Err(ConfigError::Message(format!(
                "api.scheme must be http or https, got `{}`",
                self.api.scheme
            )));
        }

        if self.churn.max_delete_failures == 0 {
            return Err(ConfigError::Message(
                "churn.max_delete_failures must be > 0".to_string(),
            ));
        }

        if self.churn.watchdog_attempts == 0 {
            return Err(ConfigError::Message(
                "churn.watchdog_attempts must be > 0".to_string(),
            ));
        }

        if self.churn.metrics_window_secs == 0 {
            return Err(ConfigError::Message(
                "churn.metrics_window_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a specific file path, without env overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: PerfConfig = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;

        config.validate()?;

        Ok(config)
    }
}

/// Cluster API server location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Path prefix, e.g. `v1`
    pub version: String,
    /// Per-request timeout enforced by the HTTP client
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 6969,
            version: "v1".to_string(),
            request_timeout_secs: 300,
        }
    }
}

impl ApiConfig {
    /// `scheme://host:port/version`, without a trailing slash
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}/{}",
            self.scheme,
            self.host,
            self.port,
            self.version.trim_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Credentials used to obtain API tokens
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Read a static token from `token_file` instead of talking to IAM
    pub dummy: bool,
    pub iam_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default)]
    pub account_id: String,
    /// Relative paths resolve against `request.template_dir`
    pub token_file: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dummy: false,
            iam_url: "https://iam.cloud.ibm.com".to_string(),
            api_key: String::new(),
            account_id: String::new(),
            token_file: "dummy_iam_token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LocationConfig {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default)]
    pub environment: String,
}

impl LocationConfig {
    /// Datacenter identifier as the create template expects it
    pub fn qualified_datacenter(&self) -> String {
        format!("{}-{}", self.environment, self.datacenter)
    }
}

/// Infrastructure settings substituted into request templates
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SoftlayerConfig {
    #[serde(default)]
    pub private_vlan: String,
    #[serde(default)]
    pub public_vlan: String,
    #[serde(default)]
    pub churn_private_vlan: String,
    #[serde(default)]
    pub churn_public_vlan: String,
    pub billing: String,
    pub isolation: String,
    #[serde(default)]
    pub portable_subnet: bool,
    #[serde(default)]
    pub disk_encryption: bool,
}

impl Default for SoftlayerConfig {
    fn default() -> Self {
        Self {
            private_vlan: String::new(),
            public_vlan: String::new(),
            churn_private_vlan: String::new(),
            churn_public_vlan: String::new(),
            billing: "hourly".to_string(),
            isolation: "public".to_string(),
            portable_subnet: false,
            disk_encryption: true,
        }
    }
}

/// Request templates and polling behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestConfig {
    pub template_dir: PathBuf,
    pub create_cluster_template: String,
    pub add_workers_template: String,

    /// 0 disables worker polling
    pub worker_poll_interval_secs: u64,

    /// 0 disables master polling
    pub master_poll_interval_secs: u64,

    /// A master reporting Ready sooner than this after the request is
    /// assumed to be showing the pre-request status
    pub ready_grace_period_secs: u64,

    /// Pause before retrying a request after re-authenticating
    pub reauth_delay_secs: u64,

    #[serde(default)]
    pub show_resources: bool,

    #[serde(default)]
    pub delete_resources: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("config"),
            create_cluster_template: "create_cluster.json".to_string(),
            add_workers_template: "add_workers.json".to_string(),
            worker_poll_interval_secs: 30,
            master_poll_interval_secs: 30,
            ready_grace_period_secs: 60,
            reauth_delay_secs: 10,
            show_resources: false,
            delete_resources: false,
        }
    }
}

impl RequestConfig {
    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_secs(self.worker_poll_interval_secs)
    }

    pub fn master_poll_interval(&self) -> Duration {
        Duration::from_secs(self.master_poll_interval_secs)
    }

    pub fn ready_grace_period(&self) -> Duration {
        Duration::from_secs(self.ready_grace_period_secs)
    }

    pub fn reauth_delay(&self) -> Duration {
        Duration::from_secs(self.reauth_delay_secs)
    }

    /// Resolve a file name against `template_dir` unless already absolute
    pub fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.template_dir.join(path)
        }
    }
}

/// Churn driver tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChurnConfig {
    /// Failed deletes tolerated before a slot is frozen
    pub max_delete_failures: u32,

    /// Consecutive non-actionable random picks before giving up
    pub watchdog_attempts: u32,

    /// Pause between submissions, spreads the startup burst
    pub submit_delay_millis: u64,

    /// Pause between repeated cluster-state lookups after a completion
    pub state_retry_millis: u64,

    /// Minimum spacing between metric batch writes
    pub metrics_window_secs: u64,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            max_delete_failures: 3,
            watchdog_attempts: 1000,
            submit_delay_millis: 5000,
            state_retry_millis: 1000,
            metrics_window_secs: 60,
        }
    }
}

impl ChurnConfig {
    pub fn submit_delay(&self) -> Duration {
        Duration::from_millis(self.submit_delay_millis)
    }

    pub fn state_retry(&self) -> Duration {
        Duration::from_millis(self.state_retry_millis)
    }

    pub fn metrics_window(&self) -> Duration {
        Duration::from_secs(self.metrics_window_secs)
    }
}

/// Time-series store connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub influx_host: String,
    pub influx_port: u16,
    #[serde(default)]
    pub influx_database: String,
    #[serde(default)]
    pub influx_user: String,
    /// Never read back out; normally supplied through METRICS_DB_KEY
    #[serde(default, skip_serializing)]
    pub influx_password: Option<String>,
    #[serde(default)]
    pub carrier_name: String,
    pub fallback_dir: PathBuf,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            influx_host: String::new(),
            influx_port: 8086,
            influx_database: String::new(),
            influx_user: String::new(),
            influx_password: None,
            carrier_name: String::new(),
            fallback_dir: PathBuf::from("/performance/metrics"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_configuration() {
        let config = PerfConfig::default();

        assert_eq!(config.api.base_url(), "http://localhost:6969/v1");
        assert_eq!(config.churn.max_delete_failures, 3);
        assert_eq!(config.churn.watchdog_attempts, 1000);
        assert_eq!(config.churn.submit_delay(), Duration::from_secs(5));
        assert_eq!(config.request.ready_grace_period(), Duration::from_secs(60));
        assert_eq!(config.metrics.influx_port, 8086);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_delete_failures() {
        let mut config = PerfConfig::default();
        config.churn.max_delete_failures = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_scheme() {
        let mut config = PerfConfig::default();
        config.api.scheme = "gopher".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_merges_over_struct_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[api]
scheme = "https"
host = "api.example.test"
port = 443
version = "v1"
request_timeout_secs = 30

[request]
template_dir = "/etc/perf"
create_cluster_template = "create.json"
add_workers_template = "workers.json"
worker_poll_interval_secs = 10
master_poll_interval_secs = 20
ready_grace_period_secs = 0
reauth_delay_secs = 1

[churn]
max_delete_failures = 5
watchdog_attempts = 10
submit_delay_millis = 0
state_retry_millis = 5
metrics_window_secs = 1
"#
        )
        .unwrap();

        let config = PerfConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api.base_url(), "https://api.example.test:443/v1");
        assert_eq!(config.request.master_poll_interval(), Duration::from_secs(20));
        assert_eq!(
            config.request.resolve("create.json"),
            PathBuf::from("/etc/perf/create.json")
        );
        assert_eq!(config.churn.max_delete_failures, 5);
        assert_eq!(config.softlayer.billing, "hourly");
    }

    #[test]
    fn test_qualified_datacenter() {
        let location = LocationConfig {
            region: "us-south".to_string(),
            datacenter: "dal10".to_string(),
            environment: "stage".to_string(),
        };
        assert_eq!(location.qualified_datacenter(), "stage-dal10");
    }
}
