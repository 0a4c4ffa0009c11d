use stampede_core::{ConfigError, TargetKind};
use std::sync::PoisonError;
use thiserror::Error;

/// Failure to build or connect an executor. Failures of individual operations are never
/// reported through this type; they become failed outcomes.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Invalid parameters for a `{kind}` target: {source}")]
    InvalidParams {
        kind: TargetKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Target `{0}` has no usable address.")]
    MissingAddress(String),

    #[error("Invalid address `{0}`.")]
    InvalidAddress(String),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to set up executor: {0}")]
    Executor(#[from] ExecutorError),

    #[error("No worker of target `{0}` could start.")]
    NoWorkers(String),
}

/// Failure of a whole run. Failures of single targets are reported per target instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to persist outcomes: {0}")]
    Sink(#[from] SinkError),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Mutex is poisoned.")]
    PoisonData,

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Stored record is malformed: {0}")]
    Malformed(String),
}

impl<T> From<PoisonError<T>> for SinkError {
    fn from(_err: PoisonError<T>) -> Self {
        Self::PoisonData
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
}
