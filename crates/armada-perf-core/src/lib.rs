//! Shared building blocks for the cluster API performance harness.

pub mod action;
pub mod config;
pub mod error;
pub mod metrics;

pub use action::ActionType;
pub use config::{
    ApiConfig, AuthConfig, ChurnConfig, LocationConfig, MetricsConfig, PerfConfig, RequestConfig,
    SoftlayerConfig,
};
pub use error::{CoreError, CoreResult};
