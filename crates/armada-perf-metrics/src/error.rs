use thiserror::Error;

/// Errors raised while summarising or shipping metric batches.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid percentile {0} requested")]
    InvalidPercentile(u32),

    #[error("percentile of an empty series")]
    EmptySeries,

    /// The sink lacks the settings needed for this operation.
    #[error("metrics sink not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered but refused the write or query.
    #[error("metrics store rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type MetricsResult<T> = Result<T, MetricsError>;
