use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Target name must not be empty.")]
    EmptyName,

    #[error("Target `{0}` must have at least one worker.")]
    NoWorkers(String),

    #[error("Target `{name}` has an invalid rate of {rate} operations/second.")]
    InvalidRate { name: String, rate: f64 },

    #[error("Target `{0}` must run for a non-zero duration.")]
    ZeroDuration(String),

    #[error("Target `{0}` must have a non-zero operation timeout.")]
    ZeroTimeout(String),

    #[error("Target name `{0}` is used more than once.")]
    DuplicateName(String),
}
