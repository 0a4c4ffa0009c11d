//! Aggregation of outcomes into [`Summary`] statistics.
use stampede_core::{
    Bucket, LatencyHistogram, LatencyStats, Outcome, Percentiles, RecordedOutcome, Summary,
    TargetSummary, WorkerBreakdown, LATENCY_BUCKETS,
};
use std::collections::BTreeMap;

/// Summarizes a set of outcomes.
///
/// Latency statistics, percentiles and the histogram only consider successful outcomes.
/// Counts and throughput consider every outcome.
pub fn summarize(outcomes: &[Outcome]) -> Summary {
    if outcomes.is_empty() {
        return Summary::default();
    }

    let total = outcomes.len();
    let successful = outcomes.iter().filter(|o| o.is_success()).count();
    let failed = total - successful;

    let mut latencies: Vec<f64> = outcomes
        .iter()
        .filter(|o| o.is_success())
        .map(|o| o.duration().as_secs_f64())
        .collect();
    latencies.sort_by(f64::total_cmp);

    let span = observed_span(outcomes);
    let throughput = if span > 0. { total as f64 / span } else { 0. };

    Summary {
        total,
        successful,
        failed,
        success_rate: successful as f64 / total as f64 * 100.,
        latency: latency_stats(&latencies),
        percentiles: Percentiles {
            p50: percentile(&latencies, 50.),
            p90: percentile(&latencies, 90.),
            p95: percentile(&latencies, 95.),
            p99: percentile(&latencies, 99.),
        },
        throughput,
        span,
        mean_transferred: mean_transferred(outcomes),
        histogram: histogram(&latencies),
        workers: worker_breakdown(outcomes),
    }
}

/// Summarizes records per target and over their union.
///
/// Targets appear in the order of their first record. A target only appears if it has records,
/// so there are never zero-valued entries.
pub fn summarize_by_target(records: &[RecordedOutcome]) -> (Summary, Vec<TargetSummary>) {
    let mut groups: Vec<(&str, Vec<Outcome>)> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|(name, _)| *name == record.target) {
            Some((_, outcomes)) => outcomes.push(record.outcome.clone()),
            None => groups.push((&record.target, vec![record.outcome.clone()])),
        }
    }

    let all: Vec<Outcome> = records.iter().map(|r| r.outcome.clone()).collect();
    let per_target = groups
        .into_iter()
        .map(|(target, outcomes)| TargetSummary {
            target: target.to_string(),
            run_id: None,
            summary: summarize(&outcomes),
        })
        .collect();

    (summarize(&all), per_target)
}

/// Linear interpolation between the closest ranks of an ascending slice. `p` is in `0..=100`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.,
        1 => sorted[0],
        n => {
            let index = (n - 1) as f64 * p.clamp(0., 100.) / 100.;
            let lower = index.floor() as usize;
            let upper = index.ceil() as usize;
            sorted[lower] + (index - lower as f64) * (sorted[upper] - sorted[lower])
        }
    }
}

fn latency_stats(sorted: &[f64]) -> LatencyStats {
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return LatencyStats::default();
    };

    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let stddev = if sorted.len() < 2 {
        0.
    } else {
        (sorted.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / n).sqrt()
    };

    LatencyStats {
        mean,
        median: percentile(sorted, 50.),
        min,
        max,
        stddev,
    }
}

/// Seconds from the earliest start to the latest completion.
fn observed_span(outcomes: &[Outcome]) -> f64 {
    let first = outcomes.iter().map(Outcome::started_at).min();
    let last = outcomes.iter().map(Outcome::ended_at).max();
    match (first, last) {
        (Some(first), Some(last)) => last
            .duration_since(first)
            .unwrap_or_default()
            .as_secs_f64(),
        _ => 0.,
    }
}

/// Mean over every reported size, zeros included. `None` unless some size is non-zero.
fn mean_transferred(outcomes: &[Outcome]) -> Option<f64> {
    let sizes: Vec<u64> = outcomes.iter().filter_map(Outcome::transferred).collect();
    if !sizes.iter().any(|&s| s > 0) {
        return None;
    }
    Some(sizes.iter().map(|&s| s as f64).sum::<f64>() / sizes.len() as f64)
}

fn histogram(sorted: &[f64]) -> LatencyHistogram {
    let buckets = LATENCY_BUCKETS
        .iter()
        .map(|&le| Bucket {
            le,
            count: sorted.partition_point(|&l| l <= le) as u64,
        })
        .collect();

    LatencyHistogram {
        buckets,
        sum: sorted.iter().sum(),
        count: sorted.len() as u64,
    }
}

fn worker_breakdown(outcomes: &[Outcome]) -> BTreeMap<usize, WorkerBreakdown> {
    let mut workers: BTreeMap<usize, WorkerBreakdown> = BTreeMap::new();
    for outcome in outcomes {
        let Some(worker) = outcome.worker() else {
            continue;
        };
        let entry = workers.entry(worker).or_default();
        entry.requests += 1;
        if outcome.is_success() {
            entry.successful += 1;
        } else {
            entry.failed += 1;
        }
    }
    workers
}
