//! Command line for the churn tool.
//!
//! Flag names keep the camelCase spelling existing job definitions use.

use armada_perf_client::FREE_MACHINE_TYPE;
use armada_perf_core::{ActionType, CoreError, PerfConfig};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ChurnError, ChurnResult};
use crate::settings::ChurnSettings;

/// Machine type used whenever more than a single free cluster is requested.
pub const DEFAULT_PAID_MACHINE_TYPE: &str = "u2c.2x4";

/// A poll interval from the command line. Negative values defer to the
/// configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalOverride(pub Option<Duration>);

/// Parse `90`, `90s`, `500ms`, `2m` or `1h`.
pub fn parse_interval(raw: &str) -> Result<IntervalOverride, String> {
    let raw = raw.trim();
    if raw.starts_with('-') {
        return Ok(IntervalOverride(None));
    }
    let split = raw
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(raw.len());
    let (value, unit) = raw.split_at(split);
    let value: f64 = value
        .parse()
        .map_err(|_| format!("invalid interval `{}`", raw))?;
    let seconds = match unit {
        "" | "s" => value,
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(format!("unknown interval unit `{}`", unit)),
    };
    Ok(IntervalOverride(Some(Duration::from_secs_f64(seconds))))
}

/// Poll intervals are configured in seconds; a sub-second interval still
/// polls rather than disabling the loop.
fn whole_seconds(interval: Duration) -> u64 {
    if interval.is_zero() {
        0
    } else {
        interval.as_secs().max(1)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "cruiser-churn")]
#[command(about = "Continuously create, update and delete clusters to load the cluster API", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Name prefix of churned clusters
    #[arg(long = "clusterNamePrefix", default_value = "perfCluster")]
    pub cluster_name_prefix: String,

    /// Number of concurrent API requests
    #[arg(long = "numThreads", default_value_t = 0)]
    pub num_threads: usize,

    /// Total number of clusters to keep churning
    #[arg(long, default_value_t = 1)]
    pub clusters: usize,

    /// Worker nodes per cluster
    #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
    pub workers: i64,

    /// Machine type: free, or a paid flavour such as u2c.2x4 or b2c.4x16
    #[arg(long = "machineType")]
    pub machine_type: Option<String>,

    /// Kube version to upgrade clusters to; no upgrades when empty
    #[arg(long = "upgradeKubeVersion", default_value = "")]
    pub upgrade_kube_version: String,

    /// Kube version to create clusters with; the API default when empty
    #[arg(long = "defaultKubeVersion", default_value = "")]
    pub default_kube_version: String,

    /// Track the API's default kube version and upgrade to the next one
    #[arg(long = "followKubeVersion")]
    pub follow_kube_version: bool,

    /// Worker poll interval; 0 disables worker polling
    #[arg(long = "workerPollInterval", value_parser = parse_interval, allow_hyphen_values = true)]
    pub worker_poll_interval: Option<IntervalOverride>,

    /// Master poll interval; 0 disables master polling
    #[arg(long = "masterPollInterval", value_parser = parse_interval, allow_hyphen_values = true)]
    pub master_poll_interval: Option<IntervalOverride>,

    /// API action; must be ChurnClusters
    #[arg(long)]
    pub action: Option<String>,

    /// Send metrics to the metrics database
    #[arg(long)]
    pub metrics: bool,

    /// Print a monitor line for every request
    #[arg(long)]
    pub monitor: bool,

    /// Request and response summary logging
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub verbose: bool,

    /// Detailed logging
    #[arg(long)]
    pub debug: bool,

    /// Test name, used as the metric measurement
    #[arg(long, default_value = "")]
    pub testname: String,

    /// Metrics database password
    #[arg(long, env = "METRICS_DB_KEY", hide_env_values = true)]
    pub dbkey: Option<String>,

    /// Carrier name recorded with BOM versions
    #[arg(long = "carrierName")]
    pub carrier_name: Option<String>,

    /// Zone (datacenter) to create clusters in
    #[arg(long = "zoneId")]
    pub zone_id: Option<String>,

    /// Delete linked resources (e.g. storage) with the cluster
    #[arg(long = "deleteResources")]
    pub delete_resources: bool,

    /// Ask for linked resources on GetCluster
    #[arg(long = "showResources")]
    pub show_resources: bool,

    /// Configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Validate the command line and merge it over the configuration file.
    pub fn resolve(&self) -> ChurnResult<(ChurnSettings, PerfConfig)> {
        let action = match self.action.as_deref() {
            Some(raw) => ActionType::from_str(raw)?,
            None => return Err(ChurnError::Usage("Must specify --action ChurnClusters".to_string())),
        };
        if action != ActionType::ChurnClusters {
            return Err(ChurnError::Usage(format!(
                "Must specify --action ChurnClusters, got {}",
                action
            )));
        }
        if self.num_threads == 0 {
            return Err(ChurnError::Usage(
                "numThreads needs to be set to something other than 0".to_string(),
            ));
        }
        if self.clusters == 0 {
            return Err(ChurnError::Usage("clusters must be at least 1".to_string()));
        }

        let mut config = PerfConfig::load(self.config.as_deref()).map_err(CoreError::from)?;
        let settings = self.apply(&mut config);
        Ok((settings, config))
    }

    /// Fold flag overrides into `config` and derive the run settings.
    pub fn apply(&self, config: &mut PerfConfig) -> ChurnSettings {
        let openshift = self.default_kube_version.contains("openshift")
            || self.upgrade_kube_version.contains("openshift");

        // Churned clusters would use up the portable subnets; only real
        // openshift clusters need one.
        config.softlayer.portable_subnet = self.workers > 0 && openshift;
        if config.softlayer.portable_subnet {
            tracing::info!("Detected real openshift cluster so will order subnet");
        }

        if let Some(IntervalOverride(Some(interval))) = self.master_poll_interval {
            config.request.master_poll_interval_secs = whole_seconds(interval);
        }
        if let Some(IntervalOverride(Some(interval))) = self.worker_poll_interval {
            config.request.worker_poll_interval_secs = whole_seconds(interval);
        }
        config.request.delete_resources = self.delete_resources;
        config.request.show_resources = self.show_resources;

        if let Some(zone) = self.zone_id.as_ref().filter(|z| !z.is_empty()) {
            config.location.datacenter = zone.clone();
        }
        if let Some(key) = self.dbkey.as_ref().filter(|k| !k.is_empty()) {
            config.metrics.influx_password = Some(key.clone());
        }
        if let Some(carrier) = &self.carrier_name {
            config.metrics.carrier_name = carrier.clone();
        }

        let machine_type = match self.machine_type.as_ref().filter(|m| !m.is_empty()) {
            Some(machine_type) => machine_type.clone(),
            None if self.workers > 1 || self.clusters > 1 => DEFAULT_PAID_MACHINE_TYPE.to_string(),
            None => FREE_MACHINE_TYPE.to_string(),
        };

        ChurnSettings {
            prefix: self.cluster_name_prefix.clone(),
            clusters: self.clusters,
            workers: self.workers,
            threads: self.num_threads,
            machine_type,
            upgrade_version: self.upgrade_kube_version.clone(),
            default_version: self.default_kube_version.clone(),
            follow_kube_version: self.follow_kube_version,
            openshift,
            max_delete_failures: config.churn.max_delete_failures,
            watchdog_attempts: config.churn.watchdog_attempts,
            submit_delay: config.churn.submit_delay(),
            state_retry: config.churn.state_retry(),
            metrics_window: config.churn.metrics_window(),
            monitor: self.monitor,
            send_metrics: self.metrics,
            test_name: self.testname.clone(),
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["cruiser-churn"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("30").unwrap().0, Some(Duration::from_secs(30)));
        assert_eq!(parse_interval("45s").unwrap().0, Some(Duration::from_secs(45)));
        assert_eq!(parse_interval("2m").unwrap().0, Some(Duration::from_secs(120)));
        assert_eq!(parse_interval("250ms").unwrap().0, Some(Duration::from_millis(250)));
        assert_eq!(parse_interval("0").unwrap().0, Some(Duration::ZERO));
        assert_eq!(parse_interval("-1s").unwrap().0, None);
        assert!(parse_interval("3 days").is_err());
    }

    #[test]
    fn test_action_is_mandatory() {
        let cli = parse(&["--numThreads", "2"]);
        assert!(matches!(cli.resolve(), Err(ChurnError::Usage(_))));

        let cli = parse(&["--numThreads", "2", "--action", "CreateCluster"]);
        assert!(matches!(cli.resolve(), Err(ChurnError::Usage(_))));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let cli = parse(&["--action", "ChurnClusters"]);
        assert!(matches!(cli.resolve(), Err(ChurnError::Usage(_))));
    }

    #[test]
    fn test_apply_overrides() {
        let cli = parse(&[
            "--action",
            "ChurnClusters",
            "--numThreads",
            "4",
            "--clusters",
            "20",
            "--workers",
            "-1",
            "--masterPollInterval",
            "15s",
            "--workerPollInterval",
            "-1s",
            "--upgradeKubeVersion",
            "4.15_openshift",
            "--dbkey",
            "secret",
            "--verbose",
            "false",
        ]);
        let mut config = PerfConfig::default();
        config.request.worker_poll_interval_secs = 7;
        let settings = cli.apply(&mut config);

        assert!(!cli.verbose);
        assert_eq!(settings.threads, 4);
        assert_eq!(settings.workers, -1);
        assert_eq!(settings.machine_type, DEFAULT_PAID_MACHINE_TYPE);
        assert!(settings.openshift);
        // No workers, so no subnet even for openshift
        assert!(!config.softlayer.portable_subnet);
        assert_eq!(config.request.master_poll_interval_secs, 15);
        assert_eq!(config.request.worker_poll_interval_secs, 7);
        assert_eq!(config.metrics.influx_password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_resolve_reads_churn_tuning_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("churn.toml");
        std::fs::write(
            &path,
            "[churn]\nmax_delete_failures = 5\nwatchdog_attempts = 20\nstate_retry_millis = 250\n",
        )
        .unwrap();

        let path = path.to_string_lossy().into_owned();
        let cli = parse(&[
            "--action",
            "churnclusters",
            "--numThreads",
            "2",
            "--zoneId",
            "dal10",
            "--config",
            &path,
        ]);
        let (settings, config) = cli.resolve().unwrap();

        assert_eq!(settings.max_delete_failures, 5);
        assert_eq!(settings.watchdog_attempts, 20);
        assert_eq!(settings.state_retry, Duration::from_millis(250));
        assert_eq!(config.location.datacenter, "dal10");
    }

    #[test]
    fn test_single_cluster_defaults_to_free() {
        let cli = parse(&["--action", "ChurnClusters", "--numThreads", "1"]);
        let settings = cli.apply(&mut PerfConfig::default());
        assert_eq!(settings.machine_type, FREE_MACHINE_TYPE);
        assert_eq!(settings.prefix, "perfCluster");
    }
}
