//! Runs a list of targets and persists their outcomes under one run id.
use crate::error::{RunError, SinkError};
use crate::executor::Backend;
use crate::runner::run_target;
use crate::sink::{append_async, OutcomeSink};
use serde::Serialize;
use stampede_core::{ConfigError, Outcome, RunId, RunMode, TargetConfig};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Keys of a target's kind parameters that may hold a statically configured address.
const ADDRESS_PARAMS: [&str; 3] = ["url", "endpoint", "endpoint_url"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TargetStatus {
    Completed,
    /// The target never ran, e.g. because it has no usable address.
    Skipped(String),
    /// The target was attempted but could not start.
    Failed(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct TargetRun {
    pub name: String,
    #[serde(flatten)]
    pub status: TargetStatus,
    pub outcomes: Vec<Outcome>,
}

impl TargetRun {
    /// Whether the target ran and produced at least one outcome.
    pub fn succeeded(&self) -> bool {
        self.status == TargetStatus::Completed && !self.outcomes.is_empty()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunOutput {
    pub run_id: RunId,
    pub targets: Vec<TargetRun>,
}

impl RunOutput {
    pub fn total_outcomes(&self) -> usize {
        self.targets.iter().map(|t| t.outcomes.len()).sum()
    }

    pub fn target(&self, name: &str) -> Option<&TargetRun> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// Drives every target of a run and stores each target's outcomes as soon as it finishes.
///
/// A target that cannot run is reported with a [`TargetStatus`] other than `Completed` and does
/// not affect the others. Only sink failures abort the run.
pub struct Orchestrator {
    sink: Arc<dyn OutcomeSink>,
    mode: RunMode,
    addresses: HashMap<String, String>,
    run_id: Option<RunId>,
}

impl Orchestrator {
    pub fn new(sink: Arc<dyn OutcomeSink>) -> Self {
        Self {
            sink,
            mode: RunMode::default(),
            addresses: HashMap::new(),
            run_id: None,
        }
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Addresses of provisioned backends, keyed by target name.
    pub fn addresses(mut self, addresses: HashMap<String, String>) -> Self {
        self.addresses = addresses;
        self
    }

    /// Use a fixed run id instead of generating one.
    pub fn run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Provisioned address first, then the target's own address, then an address found in its
    /// kind parameters.
    pub fn resolve_address(&self, target: &TargetConfig) -> Option<String> {
        if let Some(address) = self.addresses.get(&target.name) {
            return Some(address.clone());
        }
        if let Some(address) = &target.address {
            return Some(address.clone());
        }
        ADDRESS_PARAMS
            .iter()
            .find_map(|key| target.params.get(key)?.as_str())
            .map(str::to_string)
    }

    /// Runs every target, in order or concurrently depending on the [`RunMode`].
    ///
    /// In both modes every target runs even when storing an earlier target's outcomes fails.
    /// The first such sink error is returned once all targets are done.
    pub async fn run(&self, targets: &[TargetConfig]) -> Result<RunOutput, RunError> {
        let mut names = HashSet::new();
        if let Some(dup) = targets.iter().find(|t| !names.insert(t.name.as_str())) {
            return Err(ConfigError::DuplicateName(dup.name.clone()).into());
        }

        let run_id = self.run_id.clone().unwrap_or_else(RunId::generate);
        info!("Starting run {run_id} with {} targets ({:?})", targets.len(), self.mode);

        let jobs = targets.iter().map(|target| {
            run_one(
                self.sink.clone(),
                run_id.clone(),
                target.clone(),
                self.resolve_address(target),
            )
        });

        let mut runs = Vec::with_capacity(targets.len());
        let mut sink_error = None;
        let mut persisted = |target: &TargetConfig, result: Result<TargetRun, SinkError>| {
            match result {
                Ok(run) => runs.push(run),
                Err(err) => {
                    error!("Failed to persist outcomes of {}: {err}", target.name);
                    sink_error.get_or_insert(err);
                }
            }
        };

        match self.mode {
            RunMode::Sequential => {
                for (job, target) in jobs.zip(targets) {
                    persisted(target, job.await);
                }
            }
            RunMode::Parallel => {
                let handles: Vec<_> = jobs.map(tokio::spawn).collect();
                for (handle, target) in handles.into_iter().zip(targets) {
                    match handle.await {
                        Ok(result) => persisted(target, result),
                        Err(err) => {
                            error!("Target {} panicked: {err}", target.name);
                            persisted(
                                target,
                                Ok(TargetRun {
                                    name: target.name.clone(),
                                    status: TargetStatus::Failed(err.to_string()),
                                    outcomes: vec![],
                                }),
                            );
                        }
                    }
                }
            }
        }

        if let Some(err) = sink_error {
            return Err(err.into());
        }

        info!(
            "Finished run {run_id}: {} of {} targets produced outcomes",
            runs.iter().filter(|r| r.succeeded()).count(),
            runs.len()
        );
        Ok(RunOutput {
            run_id,
            targets: runs,
        })
    }
}

#[instrument(name = "orchestrate", skip_all, fields(target = %target.name))]
async fn run_one(
    sink: Arc<dyn OutcomeSink>,
    run_id: RunId,
    target: TargetConfig,
    address: Option<String>,
) -> Result<TargetRun, SinkError> {
    if target.kind.needs_address() && address.is_none() {
        warn!("Skipping {}: no address for a {} target.", target.name, target.kind);
        return Ok(TargetRun {
            status: TargetStatus::Skipped(format!("no address for `{}`", target.name)),
            name: target.name,
            outcomes: vec![],
        });
    }

    let result = run_target(&target, |_| Backend::for_target(&target, address.as_deref())).await;
    match result {
        Ok(outcomes) => {
            append_async(sink, run_id, target.name.clone(), outcomes.clone()).await?;
            debug!("Stored {} outcomes.", outcomes.len());
            Ok(TargetRun {
                name: target.name,
                status: TargetStatus::Completed,
                outcomes,
            })
        }
        Err(err) => {
            warn!("Target {} failed: {err}", target.name);
            Ok(TargetRun {
                name: target.name,
                status: TargetStatus::Failed(err.to_string()),
                outcomes: vec![],
            })
        }
    }
}
