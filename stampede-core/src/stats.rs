use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Statistics derived from a set of outcomes.
///
/// Latency figures are in seconds and only consider successful outcomes. Throughput counts
/// every outcome over the observed wall-clock span. `success_rate` is a percentage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub latency: LatencyStats,
    pub percentiles: Percentiles,
    /// Operations per second over the observed span.
    pub throughput: f64,
    /// Observed wall-clock span in seconds, from the first start to the last completion.
    pub span: f64,
    /// Mean over every reported transferred size, present only when some size is non-zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_transferred: Option<f64>,
    pub histogram: LatencyHistogram,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub workers: BTreeMap<usize, WorkerBreakdown>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Cumulative latency histogram over successful outcomes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyHistogram {
    /// Finite buckets in ascending order of `le`. The `+Inf` bucket is `count`.
    pub buckets: Vec<Bucket>,
    pub sum: f64,
    pub count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub le: f64,
    pub count: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerBreakdown {
    pub requests: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Summary of a single target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<crate::RunId>,
    pub summary: Summary,
}
