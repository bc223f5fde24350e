//! Cluster churn: keep a fixed population of clusters cycling through
//! create, optional upgrade and delete against the cluster API until
//! interrupted.

pub mod cli;
pub mod driver;
pub mod error;
pub mod settings;
pub mod shutdown;
pub mod slot;
pub mod startup;

use std::sync::Arc;

use armada_perf_client::{
    Gateway, GatewaySettings, HttpTransport, RequestTemplates, TemplateParams,
};
use armada_perf_metrics::{InfluxSink, SinkContext};

pub use cli::Cli;
pub use driver::{ChurnDriver, ChurnSummary};
pub use error::{ChurnError, ChurnResult};
pub use settings::{dashboard_version, ChurnSettings};
pub use slot::{ChurnState, ClusterSlot};
pub use startup::{Discovery, VersionPlan};

/// Run a churn session described by `cli` against the live API.
pub async fn run(cli: &Cli) -> ChurnResult<ChurnSummary> {
    let (settings, config) = cli.resolve()?;

    let transport = Arc::new(HttpTransport::new(&config)?);
    let params = TemplateParams::from_config(&config, &settings.machine_type, true);
    let templates = Arc::new(RequestTemplates::load(&config, params, "")?);
    let gateway_settings = GatewaySettings {
        monitor: settings.monitor,
        ..GatewaySettings::from_config(&config)
    };
    let gateway = Arc::new(Gateway::new(transport, templates, gateway_settings));
    gateway.authenticate().await?;

    let versions = startup::plan_versions(&gateway, &settings).await?;
    gateway.templates().set_kube_version(&versions.create);
    tracing::info!(
        create = %versions.create,
        default = %versions.default,
        upgrade = %versions.upgrade,
        "Kube versions"
    );

    let discovery = startup::discover(&gateway, &settings).await?;
    let terminate = shutdown::install_interrupt_handler();

    let send_metrics = settings.send_metrics;
    let context = SinkContext {
        test_name: settings.metrics_test_name(),
        machine_type: settings.machine_type.clone(),
        kube_version: dashboard_version(&versions.default),
    };
    let mut driver = ChurnDriver::new(
        settings,
        gateway.clone(),
        gateway,
        discovery,
        versions,
        terminate,
    )?;
    if send_metrics {
        let sink = Arc::new(InfluxSink::new(&config.metrics)?);
        driver = driver.with_metrics(sink, context, config.metrics.carrier_name.clone());
    }

    driver.run().await
}
