use super::OutcomeSink;
use crate::error::SinkError;
use stampede_core::{Outcome, RecordedOutcome, RunId, RunInfo};
use std::sync::RwLock;

/// In-process sink. Outcomes live as long as the sink does.
#[derive(Default)]
pub struct MemorySink {
    records: RwLock<Vec<RecordedOutcome>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, SinkError> {
        Ok(self.records.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, SinkError> {
        Ok(self.len()? == 0)
    }
}

impl OutcomeSink for MemorySink {
    fn append(&self, run_id: &RunId, target: &str, outcomes: &[Outcome]) -> Result<(), SinkError> {
        let batch = outcomes.iter().map(|outcome| RecordedOutcome {
            run_id: run_id.clone(),
            target: target.to_string(),
            outcome: outcome.clone(),
        });

        self.records.write()?.extend(batch);
        Ok(())
    }

    fn query(&self, run_id: &RunId) -> Result<Vec<RecordedOutcome>, SinkError> {
        let mut found: Vec<RecordedOutcome> = self
            .records
            .read()?
            .iter()
            .filter(|r| &r.run_id == run_id)
            .cloned()
            .collect();

        // Stable, so equal start times keep append order.
        found.sort_by_key(|r| r.outcome.started_at());
        Ok(found)
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<RecordedOutcome>, SinkError> {
        Ok(self
            .records
            .read()?
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn runs(&self) -> Result<Vec<RunInfo>, SinkError> {
        let mut runs: Vec<RunInfo> = Vec::new();
        for record in self.records.read()?.iter() {
            match runs.iter_mut().find(|r| r.run_id == record.run_id) {
                Some(run) => run.records += 1,
                None => runs.push(RunInfo {
                    run_id: record.run_id.clone(),
                    records: 1,
                }),
            }
        }
        Ok(runs)
    }
}
