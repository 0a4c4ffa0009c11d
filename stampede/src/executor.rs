//! Operation executors: one timed operation against one target, normalized into an [`Outcome`].
use crate::error::ExecutorError;
use async_trait::async_trait;
use rand::{rngs::SmallRng, RngCore, SeedableRng};
use serde::de::DeserializeOwned;
use stampede_core::{Outcome, TargetConfig, TargetKind};
use std::fmt;
use std::future::Future;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

mod filesystem;
mod http;
mod mix;
mod object_store;
mod sql;
mod vector_db;

pub use filesystem::{FileOp, FilesystemExecutor, FilesystemParams};
pub use http::{HttpInferenceExecutor, InferenceApi, InferenceParams};
pub use mix::{ByteSize, WeightedChoice};
pub use object_store::{ObjectOp, ObjectStoreExecutor, ObjectStoreParams};
pub use sql::{SqlExecutor, SqlOp, SqlParams};
pub use vector_db::{VectorDbExecutor, VectorDbParams, VectorOp};

/// Performs exactly one operation per call against the target it was built for.
///
/// Implementations must bound every call by `target.timeout` and turn every failure into
/// [`Outcome::failure`]. State kept between calls (connections, keys of created objects) belongs
/// to the executor instance, and every worker owns its own instance.
#[async_trait]
pub trait OperationExecutor: Send {
    async fn execute(&mut self, target: &TargetConfig) -> Outcome;

    /// Executors that need setup before their first operation expose it here.
    fn connectable(&mut self) -> Option<&mut dyn Connectable> {
        None
    }
}

/// Optional setup and teardown for executors holding connections or server-side resources.
#[async_trait]
pub trait Connectable: Send {
    async fn connect(&mut self) -> Result<(), ExecutorError>;

    async fn close(&mut self) {}
}

/// Executor for any [`TargetKind`], chosen once from the target's configuration.
pub enum Backend {
    Http(HttpInferenceExecutor),
    Sql(SqlExecutor),
    ObjectStore(ObjectStoreExecutor),
    VectorDb(VectorDbExecutor),
    Filesystem(FilesystemExecutor),
}

impl Backend {
    /// Builds the executor matching `target.kind`. Remote kinds require `address`.
    pub fn for_target(target: &TargetConfig, address: Option<&str>) -> Result<Self, ExecutorError> {
        let require = || address.ok_or_else(|| ExecutorError::MissingAddress(target.name.clone()));

        Ok(match target.kind {
            TargetKind::HttpInference => Backend::Http(HttpInferenceExecutor::new(
                require()?,
                parse_params(target)?,
                target.timeout,
            )?),
            TargetKind::Sql => Backend::Sql(SqlExecutor::new(require()?, parse_params(target)?)?),
            TargetKind::ObjectStore => Backend::ObjectStore(ObjectStoreExecutor::new(
                require()?,
                parse_params(target)?,
                target.timeout,
            )),
            TargetKind::VectorDb => Backend::VectorDb(VectorDbExecutor::new(
                require()?,
                parse_params(target)?,
                target.timeout,
            )?),
            TargetKind::Filesystem => {
                Backend::Filesystem(FilesystemExecutor::new(parse_params(target)?))
            }
        })
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            Backend::Http(_) => TargetKind::HttpInference,
            Backend::Sql(_) => TargetKind::Sql,
            Backend::ObjectStore(_) => TargetKind::ObjectStore,
            Backend::VectorDb(_) => TargetKind::VectorDb,
            Backend::Filesystem(_) => TargetKind::Filesystem,
        }
    }
}

#[async_trait]
impl OperationExecutor for Backend {
    async fn execute(&mut self, target: &TargetConfig) -> Outcome {
        match self {
            Backend::Http(e) => e.execute(target).await,
            Backend::Sql(e) => e.execute(target).await,
            Backend::ObjectStore(e) => e.execute(target).await,
            Backend::VectorDb(e) => e.execute(target).await,
            Backend::Filesystem(e) => e.execute(target).await,
        }
    }

    fn connectable(&mut self) -> Option<&mut dyn Connectable> {
        match self {
            Backend::Http(e) => e.connectable(),
            Backend::Sql(e) => e.connectable(),
            Backend::ObjectStore(e) => e.connectable(),
            Backend::VectorDb(e) => e.connectable(),
            Backend::Filesystem(e) => e.connectable(),
        }
    }
}

/// Deserializes the target's parameter bag, treating a missing bag as all defaults.
pub(crate) fn parse_params<T: DeserializeOwned + Default>(
    target: &TargetConfig,
) -> Result<T, ExecutorError> {
    if target.params.is_null() {
        return Ok(T::default());
    }

    serde_json::from_value(target.params.clone()).map_err(|source| ExecutorError::InvalidParams {
        kind: target.kind,
        source,
    })
}

/// What a successful operation reports back.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Completed {
    pub status: Option<i64>,
    pub transferred: Option<u64>,
}

impl Completed {
    pub fn transferred(transferred: u64) -> Self {
        Self {
            status: None,
            transferred: Some(transferred),
        }
    }
}

/// A failed operation, optionally with the status code the backend answered with.
#[derive(Debug)]
pub(crate) struct OperationError {
    message: String,
    status: Option<i64>,
}

impl OperationError {
    pub fn with_status(message: impl Into<String>, status: i64) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

impl<E: fmt::Display> From<E> for OperationError {
    fn from(err: E) -> Self {
        Self {
            message: err.to_string(),
            status: None,
        }
    }
}

/// Wall-clock and monotonic start of one operation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Started {
    at: SystemTime,
    instant: Instant,
}

impl Started {
    pub(crate) fn now() -> Self {
        Self {
            at: SystemTime::now(),
            instant: Instant::now(),
        }
    }
}

/// Times `operation` under `timeout` and turns its result into an outcome.
///
/// The start timestamp is taken immediately before the operation is polled, and the duration
/// covers the operation whether it succeeds, fails or times out.
pub(crate) async fn measure<F>(timeout: Duration, operation: &str, fut: F) -> Outcome
where
    F: Future<Output = Result<Completed, OperationError>>,
{
    measure_since(Started::now(), timeout, operation, fut).await
}

/// Like [`measure`], for operations whose clock started earlier, e.g. before looking up the
/// object they act on. That time counts towards both the duration and the timeout.
pub(crate) async fn measure_since<F>(
    started: Started,
    timeout: Duration,
    operation: &str,
    fut: F,
) -> Outcome
where
    F: Future<Output = Result<Completed, OperationError>>,
{
    let started_at = started.at;
    let remaining = timeout.saturating_sub(started.instant.elapsed());
    let res = tokio::time::timeout(remaining, fut).await;
    let duration = started.instant.elapsed();

    let outcome = match res {
        Ok(Ok(done)) => {
            let mut outcome = Outcome::success(started_at, duration);
            if let Some(status) = done.status {
                outcome = outcome.with_status(status);
            }
            if let Some(transferred) = done.transferred {
                outcome = outcome.with_transferred(transferred);
            }
            outcome
        }
        Ok(Err(err)) => {
            let outcome = Outcome::failure(started_at, duration, err.message);
            match err.status {
                Some(status) => outcome.with_status(status),
                None => outcome,
            }
        }
        Err(_) => Outcome::failure(
            started_at,
            duration,
            format!(
                "Operation timed out after {}",
                humantime::format_duration(timeout)
            ),
        ),
    };

    outcome.with_operation(operation)
}

/// Per-executor random source. Executors are worker-local, so no locking is needed.
pub(crate) fn worker_rng() -> SmallRng {
    SmallRng::from_entropy()
}

pub(crate) fn random_payload(rng: &mut SmallRng, size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    rng.fill_bytes(&mut data);
    data
}

/// Unique-enough name for a created object: milliseconds since the epoch plus a random suffix.
pub(crate) fn object_name(rng: &mut SmallRng) -> String {
    use rand::Rng;

    let millis = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{millis}-{:08x}", rng.gen::<u32>())
}
