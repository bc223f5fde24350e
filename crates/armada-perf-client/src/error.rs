use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the cluster API client itself.
///
/// Remote-service failures are not errors at this level: they come back as
/// a failed [`CompletedResponse`](crate::CompletedResponse).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// No HTTP response was obtained for reasons other than reqwest's.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("failed to read template {}: {source}", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The job queue already holds as many requests as it was sized for.
    #[error("job queue is full ({capacity} requests)")]
    QueueFull { capacity: usize },

    #[error("job queue is closed")]
    QueueClosed,
}

pub type ClientResult<T> = Result<T, ClientError>;
