use super::pacing::Pacer;
use crate::error::ExecutorError;
use crate::executor::OperationExecutor;
use futures_util::FutureExt;
use stampede_core::{Outcome, TargetConfig, WORKER_GUARD_GRACE};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Upper bound on the buffer preallocated per worker.
const MAX_PREALLOCATED: usize = 1 << 16;

/// One worker's loop: connect, then execute and pace until `target.duration` has elapsed.
///
/// Every attempt yields exactly one outcome. An operation that panics or outlives its own
/// timeout by [`WORKER_GUARD_GRACE`] is recorded as a failure and the loop continues. An
/// operation in flight at the deadline runs to completion, but none is started after it.
#[instrument(name = "worker", skip_all, fields(target = %target.name, worker = id))]
pub(crate) async fn run_worker<E: OperationExecutor>(
    id: usize,
    mut executor: E,
    target: Arc<TargetConfig>,
    pacer: Arc<Pacer>,
) -> Result<Vec<Outcome>, ExecutorError> {
    if let Some(connectable) = executor.connectable() {
        connectable.connect().await?;
    }

    let deadline = Instant::now() + target.duration;
    let expected = (target.duration.as_secs_f64() * target.rate_per_second).ceil() as usize + 1;
    let mut buffer = Vec::with_capacity(expected.min(MAX_PREALLOCATED));
    trace!("Worker started.");

    while pacer.before_operation(deadline).await {
        let outcome = guarded_execute(&mut executor, &target).await.with_worker(id);

        #[cfg(feature = "metrics")]
        record_metrics(&target.name, &outcome);

        buffer.push(outcome);

        if !pacer.after_operation(deadline).await {
            break;
        }
    }

    if let Some(connectable) = executor.connectable() {
        connectable.close().await;
    }

    debug!("Worker finished with {} outcomes.", buffer.len());
    Ok(buffer)
}

async fn guarded_execute<E: OperationExecutor>(executor: &mut E, target: &TargetConfig) -> Outcome {
    let started_at = SystemTime::now();
    let start = Instant::now();
    let guard = target.timeout.saturating_add(WORKER_GUARD_GRACE);

    let res = tokio::time::timeout(
        guard,
        AssertUnwindSafe(executor.execute(target)).catch_unwind(),
    )
    .await;

    match res {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            error!("Operation panicked: {message}");
            Outcome::failure(
                started_at,
                start.elapsed(),
                format!("Operation panicked: {message}"),
            )
        }
        Err(_) => {
            warn!(
                "Operation did not finish within {}.",
                humantime::format_duration(guard)
            );
            Outcome::failure(
                started_at,
                start.elapsed(),
                format!(
                    "Operation did not finish within {}",
                    humantime::format_duration(guard)
                ),
            )
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(feature = "metrics")]
fn record_metrics(target: &str, outcome: &Outcome) {
    metrics::histogram!("stampede_operation_latency", "target" => target.to_string())
        .record(outcome.duration().as_secs_f64());

    if outcome.is_success() {
        metrics::counter!("stampede_operations_success", "target" => target.to_string())
            .increment(1);
    } else {
        metrics::counter!("stampede_operations_error", "target" => target.to_string())
            .increment(1);
    }
}
