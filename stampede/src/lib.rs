#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod aggregate;
pub mod error;
pub mod executor;
pub mod exposition;
pub mod orchestrator;
pub mod report;
pub mod runner;
pub mod sink;

pub use stampede_core as core;

pub use aggregate::{summarize, summarize_by_target};
pub use exposition::Exposition;
pub use orchestrator::{Orchestrator, RunOutput, TargetRun, TargetStatus};
pub use report::Report;
pub use runner::run_target;

pub mod prelude {
    pub use crate::error::{RunError, RunnerError};
    pub use crate::executor::{Backend, Connectable, OperationExecutor};
    pub use crate::exposition::Exposition;
    pub use crate::orchestrator::{Orchestrator, TargetStatus};
    pub use crate::report::Report;
    pub use crate::runner::run_target;
    pub use crate::sink::{MemorySink, OutcomeSink, SqliteSink, SqliteSinkConfig};

    pub use stampede_core::{Outcome, Pacing, RunId, RunMode, TargetConfig, TargetKind};
}
