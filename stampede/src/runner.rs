//! Target runner: drives the configured number of workers against one target.
use crate::error::{ExecutorError, RunnerError};
use crate::executor::OperationExecutor;
use stampede_core::{Outcome, TargetConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

mod pacing;
mod worker;

use pacing::Pacer;

/// Runs `target.workers` concurrent workers for `target.duration` and returns every outcome they
/// produced, in no particular order.
///
/// `factory` builds one executor per worker, given the worker index. A factory error aborts the
/// target before any worker starts. A worker that fails to connect contributes no outcomes; if no
/// worker manages to start, the whole target fails with [`RunnerError::NoWorkers`].
///
/// # Example
/// ```no_run
/// use stampede::prelude::*;
/// use std::time::Duration;
///
/// # async fn demo() -> Result<(), RunnerError> {
/// let target = TargetConfig::new("disk", TargetKind::Filesystem)
///     .workers(2)
///     .rate(10.)
///     .duration(Duration::from_secs(5));
///
/// let outcomes = run_target(&target, |_| Backend::for_target(&target, None)).await?;
/// println!("{} operations", outcomes.len());
/// # Ok(())
/// # }
/// ```
#[instrument(name = "target", skip_all, fields(name = %target.name))]
pub async fn run_target<E, F>(
    target: &TargetConfig,
    mut factory: F,
) -> Result<Vec<Outcome>, RunnerError>
where
    E: OperationExecutor + 'static,
    F: FnMut(usize) -> Result<E, ExecutorError>,
{
    target.validate()?;

    let executors = (0..target.workers)
        .map(&mut factory)
        .collect::<Result<Vec<E>, ExecutorError>>()?;

    let start = Instant::now();
    info!("Starting {target}");

    let shared = Arc::new(target.clone());
    let pacer = Arc::new(Pacer::for_target(target));
    let tasks: Vec<_> = executors
        .into_iter()
        .enumerate()
        .map(|(id, executor)| {
            trace!("Spawning worker {id}.");
            tokio::spawn(worker::run_worker(
                id,
                executor,
                shared.clone(),
                pacer.clone(),
            ))
        })
        .collect();

    let mut outcomes = Vec::new();
    let mut started = 0;
    for (id, task) in tasks.into_iter().enumerate() {
        match task.await {
            Ok(Ok(buffer)) => {
                started += 1;
                outcomes.extend(buffer);
            }
            Ok(Err(err)) => warn!("Worker {id} could not start: {err}"),
            Err(err) => error!("Worker {id} failed: {err}"),
        }
    }

    if started == 0 {
        return Err(RunnerError::NoWorkers(target.name.clone()));
    }

    info!(
        "Finished {} with {} outcomes from {started} workers in {}",
        target.name,
        outcomes.len(),
        humantime::format_duration(Duration::from_millis(start.elapsed().as_millis() as u64)),
    );

    Ok(outcomes)
}
