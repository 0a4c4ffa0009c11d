//! Outcome sinks: append-only, concurrency-safe storage of outcomes keyed by run.
use crate::error::SinkError;
use stampede_core::{Outcome, RecordedOutcome, RunId, RunInfo};
use std::sync::Arc;

mod memory;
mod sqlite;

pub use memory::MemorySink;
pub use sqlite::{JournalMode, SqliteSink, SqliteSinkConfig};

/// Storage for outcomes.
///
/// Every `append` is applied as one unit: concurrent readers see either none or all of a batch.
/// Implementations are synchronous; async callers go through [`append_async`] and friends, which
/// move the call onto the blocking pool.
pub trait OutcomeSink: Send + Sync {
    fn append(&self, run_id: &RunId, target: &str, outcomes: &[Outcome]) -> Result<(), SinkError>;

    /// All outcomes of a run across targets, ordered by start time. Outcomes starting at the
    /// same instant keep the order in which they were appended.
    fn query(&self, run_id: &RunId) -> Result<Vec<RecordedOutcome>, SinkError>;

    /// The `limit` most recently appended outcomes across all runs, newest first.
    fn query_recent(&self, limit: usize) -> Result<Vec<RecordedOutcome>, SinkError>;

    /// Runs with stored outcomes, in the order they were first appended to.
    fn runs(&self) -> Result<Vec<RunInfo>, SinkError>;
}

pub async fn append_async(
    sink: Arc<dyn OutcomeSink>,
    run_id: RunId,
    target: String,
    outcomes: Vec<Outcome>,
) -> Result<(), SinkError> {
    tokio::task::spawn_blocking(move || sink.append(&run_id, &target, &outcomes)).await?
}

pub async fn query_async(
    sink: Arc<dyn OutcomeSink>,
    run_id: RunId,
) -> Result<Vec<RecordedOutcome>, SinkError> {
    tokio::task::spawn_blocking(move || sink.query(&run_id)).await?
}

pub async fn query_recent_async(
    sink: Arc<dyn OutcomeSink>,
    limit: usize,
) -> Result<Vec<RecordedOutcome>, SinkError> {
    tokio::task::spawn_blocking(move || sink.query_recent(limit)).await?
}

#[cfg(test)]
pub(crate) mod tests {
    //! Behavior shared by every sink implementation.
    use super::*;
    use std::time::{Duration, SystemTime};

    pub fn outcome_at(secs: u64, success: bool) -> Outcome {
        let started = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs);
        if success {
            Outcome::success(started, Duration::from_millis(10)).with_transferred(42)
        } else {
            Outcome::failure(started, Duration::from_millis(10), "HTTP 500").with_status(500)
        }
    }

    pub fn orders_by_start_then_append(sink: &dyn OutcomeSink) {
        let run = RunId::new("r1");
        sink.append(&run, "b", &[outcome_at(5, true), outcome_at(1, false)])
            .unwrap();
        sink.append(&run, "a", &[outcome_at(3, true), outcome_at(1, true)])
            .unwrap();
        sink.append(&RunId::new("other"), "a", &[outcome_at(0, true)])
            .unwrap();

        let records = sink.query(&run).unwrap();
        let order: Vec<_> = records
            .iter()
            .map(|r| (r.target.as_str(), r.outcome.is_success()))
            .collect();
        assert_eq!(
            order,
            vec![("b", false), ("a", true), ("a", true), ("b", true)]
        );
        assert!(records.iter().all(|r| r.run_id == run));
        assert_eq!(records[0].outcome.error(), Some("HTTP 500"));
        assert_eq!(records[0].outcome.status(), Some(500));
        assert_eq!(records[1].outcome.transferred(), Some(42));
    }

    pub fn recent_is_newest_first(sink: &dyn OutcomeSink) {
        sink.append(&RunId::new("r1"), "a", &[outcome_at(1, true), outcome_at(2, true)])
            .unwrap();
        sink.append(&RunId::new("r2"), "a", &[outcome_at(0, false)])
            .unwrap();

        let recent = sink.query_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].run_id, RunId::new("r2"));
        assert_eq!(recent[1].outcome.started_at(), outcome_at(2, true).started_at());

        assert_eq!(sink.query_recent(100).unwrap().len(), 3);
        assert!(sink.query_recent(0).unwrap().is_empty());

        let runs = sink.runs().unwrap();
        assert_eq!(
            runs,
            vec![
                RunInfo {
                    run_id: RunId::new("r1"),
                    records: 2
                },
                RunInfo {
                    run_id: RunId::new("r2"),
                    records: 1
                },
            ]
        );
    }

    pub async fn concurrent_appends_are_not_lost(sink: Arc<dyn OutcomeSink>) {
        let run = RunId::new("parallel");
        let batches: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|target| {
                let outcomes: Vec<_> = (0..250).map(|i| outcome_at(i, i % 3 != 0)).collect();
                tokio::spawn(append_async(
                    sink.clone(),
                    run.clone(),
                    target.to_string(),
                    outcomes,
                ))
            })
            .collect();
        for batch in batches {
            batch.await.unwrap().unwrap();
        }

        let records = query_async(sink.clone(), run).await.unwrap();
        assert_eq!(records.len(), 1_000);
        for target in ["a", "b", "c", "d"] {
            assert_eq!(records.iter().filter(|r| r.target == target).count(), 250);
        }
        assert!(records
            .windows(2)
            .all(|w| w[0].outcome.started_at() <= w[1].outcome.started_at()));
    }
}
