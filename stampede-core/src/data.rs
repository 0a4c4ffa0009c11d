use crate::RunId;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac, TimestampSecondsWithFrac};
use std::time::{Duration, SystemTime};

/// Result of a single operation attempt.
///
/// Outcomes are built once by the worker that performed the operation and never change
/// afterwards. A failed outcome always carries a non-empty error description.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde_as(as = "TimestampSecondsWithFrac<f64>")]
    started_at: SystemTime,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    duration: Duration,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transferred: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    worker: Option<usize>,
}

impl Outcome {
    pub fn success(started_at: SystemTime, duration: Duration) -> Self {
        Self {
            started_at,
            duration,
            success: true,
            status: None,
            error: None,
            transferred: None,
            operation: None,
            worker: None,
        }
    }

    pub fn failure(started_at: SystemTime, duration: Duration, error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }

        Self {
            started_at,
            duration,
            success: false,
            status: None,
            error: Some(error),
            transferred: None,
            operation: None,
            worker: None,
        }
    }

    pub fn with_status(mut self, status: i64) -> Self {
        self.status = Some(status);
        self
    }

    /// Bytes, rows or vectors moved by the operation, depending on the backend kind.
    pub fn with_transferred(mut self, transferred: u64) -> Self {
        self.transferred = Some(transferred);
        self
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn ended_at(&self) -> SystemTime {
        self.started_at + self.duration
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn status(&self) -> Option<i64> {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn transferred(&self) -> Option<u64> {
        self.transferred
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    pub fn worker(&self) -> Option<usize> {
        self.worker
    }

    /// Rebuilds an outcome from its stored columns.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        started_at: SystemTime,
        duration: Duration,
        success: bool,
        status: Option<i64>,
        error: Option<String>,
        transferred: Option<u64>,
        operation: Option<String>,
        worker: Option<usize>,
    ) -> Self {
        let error = match (success, error) {
            (true, _) => None,
            (false, Some(error)) if !error.trim().is_empty() => Some(error),
            (false, _) => Some("unknown error".to_string()),
        };

        Self {
            started_at,
            duration,
            success,
            status,
            error,
            transferred,
            operation,
            worker,
        }
    }
}

/// An outcome as stored in a sink, tagged with the run and target it belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedOutcome {
    pub run_id: RunId,
    pub target: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// All outcomes of one target within one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub target: String,
    pub outcomes: Vec<Outcome>,
}

impl RunRecord {
    /// Groups records by `(run_id, target)`, keeping the order in which each pair first appears.
    pub fn group(records: impl IntoIterator<Item = RecordedOutcome>) -> Vec<RunRecord> {
        let mut groups: Vec<RunRecord> = Vec::new();
        for record in records {
            match groups
                .iter_mut()
                .find(|g| g.run_id == record.run_id && g.target == record.target)
            {
                Some(group) => group.outcomes.push(record.outcome),
                None => groups.push(RunRecord {
                    run_id: record.run_id,
                    target: record.target,
                    outcomes: vec![record.outcome],
                }),
            }
        }
        groups
    }
}

/// A run known to a sink, with the number of outcomes stored for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: RunId,
    pub records: usize,
}
