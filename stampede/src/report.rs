//! Run reports: per-target and global summaries, saved as JSON or rendered as text.
use crate::aggregate::summarize_by_target;
use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use stampede_core::{RecordedOutcome, RunId, Summary, TargetSummary};
use std::fmt::Write;
use std::path::Path;
use time::OffsetDateTime;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: RunId,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    /// Summary over every target's outcomes.
    pub summary: Summary,
    /// Only targets that produced outcomes, in the order they first appear in the records.
    pub targets: Vec<TargetSummary>,
}

impl Report {
    pub fn from_records(run_id: RunId, records: Vec<RecordedOutcome>) -> Self {
        let (summary, targets) = summarize_by_target(&records);
        Self {
            run_id,
            generated_at: OffsetDateTime::now_utc(),
            summary,
            targets,
        }
    }

    /// Writes the report as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Saved report for run {} to {}", self.run_id, path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn human_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Run {} ({})", self.run_id, self.generated_at);
        if self.summary.is_empty() {
            let _ = writeln!(out, "  no outcomes recorded");
            return out;
        }

        render_summary(&mut out, "all targets", &self.summary);
        for target in &self.targets {
            render_summary(&mut out, &target.target, &target.summary);
        }
        out
    }
}

fn render_summary(out: &mut String, title: &str, summary: &Summary) {
    let ms = |secs: f64| secs * 1_000.;
    let _ = writeln!(out);
    let _ = writeln!(out, "{title}");
    let _ = writeln!(
        out,
        "  requests:   {} ({} ok, {} failed, {:.2}% success)",
        summary.total, summary.successful, summary.failed, summary.success_rate
    );
    let _ = writeln!(
        out,
        "  throughput: {:.2} ops/s over {:.2}s",
        summary.throughput, summary.span
    );
    if summary.successful > 0 {
        let latency = &summary.latency;
        let p = &summary.percentiles;
        let _ = writeln!(
            out,
            "  latency:    mean {:.2}ms, min {:.2}ms, max {:.2}ms, stddev {:.2}ms",
            ms(latency.mean),
            ms(latency.min),
            ms(latency.max),
            ms(latency.stddev)
        );
        let _ = writeln!(
            out,
            "  percentile: p50 {:.2}ms, p90 {:.2}ms, p95 {:.2}ms, p99 {:.2}ms",
            ms(p.p50),
            ms(p.p90),
            ms(p.p95),
            ms(p.p99)
        );
    }
    if let Some(size) = summary.mean_transferred {
        let _ = writeln!(out, "  transfer:   {size:.0} per operation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::Outcome;
    use std::time::{Duration, SystemTime};

    fn records() -> Vec<RecordedOutcome> {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let record = |target: &str, outcome: Outcome| RecordedOutcome {
            run_id: RunId::new("nightly"),
            target: target.to_string(),
            outcome,
        };
        vec![
            record("s3", Outcome::success(start, Duration::from_millis(20)).with_transferred(1024)),
            record("pg", Outcome::success(start, Duration::from_millis(5))),
            record(
                "pg",
                Outcome::failure(start + Duration::from_secs(1), Duration::from_millis(5), "boom"),
            ),
        ]
    }

    #[test]
    fn summarizes_targets_and_run() {
        let report = Report::from_records(RunId::new("nightly"), records());

        assert_eq!(report.summary.total, 3);
        let names: Vec<_> = report.targets.iter().map(|t| t.target.as_str()).collect();
        assert_eq!(names, vec!["s3", "pg"]);

        let text = report.human_summary();
        assert!(text.starts_with("Run nightly"));
        assert!(text.contains("all targets"));
        assert!(text.contains("requests:   2 (1 ok, 1 failed, 50.00% success)"));
        assert!(text.contains("transfer:   1024 per operation"));
    }

    #[test]
    fn empty_report() {
        let report = Report::from_records(RunId::new("empty"), vec![]);
        assert!(report.targets.is_empty());
        assert!(report.human_summary().contains("no outcomes recorded"));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = Report::from_records(RunId::new("nightly"), records());

        report.save(&path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["run_id"], "nightly");
        assert_eq!(json["targets"][0]["target"], "s3");

        let loaded = Report::load(&path).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.targets.len(), 2);
    }
}
