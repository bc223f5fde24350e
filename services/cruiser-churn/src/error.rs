use armada_perf_client::ClientError;
use armada_perf_core::CoreError;
use armada_perf_metrics::MetricsError;
use thiserror::Error;

/// Conditions that end a churn run.
///
/// Remote failures on individual clusters are handled by the state machine
/// and never surface here.
#[derive(Debug, Error)]
pub enum ChurnError {
    /// The command line asks for something the tool cannot do.
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// A request needed to set up the run failed.
    #[error("startup request failed: {0}")]
    Startup(String),

    #[error("{found} clusters named with the prefix already exist but only {slots} slots are configured")]
    TooManyClusters { found: usize, slots: usize },

    #[error("no pipeline capacity left: {slots} slots, {frozen} frozen")]
    PipelineExhausted { slots: usize, frozen: usize },

    /// Random selection found nothing to act on. This points at the driver's
    /// active-request count drifting from reality.
    #[error("none of the {slots} slots was actionable after {attempts} picks")]
    NoActionableSlot { attempts: u32, slots: usize },
}

pub type ChurnResult<T> = Result<T, ChurnError>;
