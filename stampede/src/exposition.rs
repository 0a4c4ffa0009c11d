//! Rendering of summaries into the metrics-exposition text format.
use crate::aggregate::summarize;
use stampede_core::{RecordedOutcome, RunId, RunRecord, Summary, TargetSummary};
use std::fmt::{self, Write};

#[derive(Clone, Copy, PartialEq)]
enum Family {
    Total,
    Successful,
    Failed,
    Duration,
    ResponseSize,
}

impl Family {
    const ALL: [Family; 5] = [
        Family::Total,
        Family::Successful,
        Family::Failed,
        Family::Duration,
        Family::ResponseSize,
    ];

    fn name(self) -> &'static str {
        match self {
            Family::Total => "requests_total",
            Family::Successful => "requests_successful",
            Family::Failed => "requests_failed",
            Family::Duration => "request_duration_seconds",
            Family::ResponseSize => "response_size_bytes",
        }
    }

    fn kind(self) -> &'static str {
        match self {
            Family::Duration => "histogram",
            Family::ResponseSize => "gauge",
            _ => "counter",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Family::Total => "Total operations attempted.",
            Family::Successful => "Operations that succeeded.",
            Family::Failed => "Operations that failed.",
            Family::Duration => "Latency of successful operations in seconds.",
            Family::ResponseSize => "Mean size transferred per operation.",
        }
    }
}

/// Encoder for per-target summaries.
///
/// Output is deterministic: the `# HELP`/`# TYPE` block comes first, then one blank-line
/// separated group per target in input order, each with a fixed series order. Targets without
/// outcomes are omitted.
#[derive(Clone, Debug, Default)]
pub struct Exposition {
    namespace: Option<String>,
    job: Option<String>,
}

impl Exposition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix for every metric name, e.g. `benchmark_`.
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Adds a `job` label to every series.
    pub fn job(mut self, job: &str) -> Self {
        self.job = Some(job.to_string());
        self
    }

    /// Encodes summaries. `run_id`, if given, labels every series; otherwise a summary's own
    /// run id is used when it has one.
    pub fn encode(&self, summaries: &[TargetSummary], run_id: Option<&RunId>) -> String {
        let groups: Vec<_> = summaries
            .iter()
            .filter(|t| !t.summary.is_empty())
            .map(|t| (t.target.as_str(), run_id.or(t.run_id.as_ref()), &t.summary))
            .collect();

        let mut out = String::new();
        // Writing to a `String` cannot fail.
        let _ = self.render(&mut out, &groups);
        out
    }

    /// Encodes records spanning several runs, one group per (run, target) pair, labelled with
    /// both. Meant for the output of [`OutcomeSink::query_recent`](crate::sink::OutcomeSink).
    pub fn encode_recent(&self, records: &[RecordedOutcome]) -> String {
        let summaries: Vec<TargetSummary> = RunRecord::group(records.iter().cloned())
            .into_iter()
            .map(|group| TargetSummary {
                summary: summarize(&group.outcomes),
                target: group.target,
                run_id: Some(group.run_id),
            })
            .collect();
        self.encode(&summaries, None)
    }

    fn render(&self, out: &mut String, groups: &[(&str, Option<&RunId>, &Summary)]) -> fmt::Result {
        if groups.is_empty() {
            return Ok(());
        }

        let with_sizes = groups.iter().any(|(_, _, s)| s.mean_transferred.is_some());
        for family in Family::ALL {
            if family == Family::ResponseSize && !with_sizes {
                continue;
            }
            let name = self.metric(family.name());
            writeln!(out, "# HELP {name} {}", family.help())?;
            writeln!(out, "# TYPE {name} {}", family.kind())?;
        }

        for (target, run_id, summary) in groups {
            out.push('\n');
            let labels = self.labels(target, *run_id);
            self.render_group(out, &labels, summary)?;
        }
        Ok(())
    }

    fn render_group(&self, out: &mut String, labels: &str, summary: &Summary) -> fmt::Result {
        let total = self.metric(Family::Total.name());
        let successful = self.metric(Family::Successful.name());
        let failed = self.metric(Family::Failed.name());
        let duration = self.metric(Family::Duration.name());

        writeln!(out, "{total}{{{labels}}} {}", summary.total)?;
        writeln!(out, "{successful}{{{labels}}} {}", summary.successful)?;
        writeln!(out, "{failed}{{{labels}}} {}", summary.failed)?;

        let histogram = &summary.histogram;
        for bucket in &histogram.buckets {
            writeln!(
                out,
                "{duration}_bucket{{{labels},le=\"{:?}\"}} {}",
                bucket.le, bucket.count
            )?;
        }
        writeln!(
            out,
            "{duration}_bucket{{{labels},le=\"+Inf\"}} {}",
            histogram.count
        )?;
        writeln!(out, "{duration}_sum{{{labels}}} {}", histogram.sum)?;
        writeln!(out, "{duration}_count{{{labels}}} {}", histogram.count)?;

        if let Some(size) = summary.mean_transferred {
            let name = self.metric(Family::ResponseSize.name());
            writeln!(out, "{name}{{{labels}}} {size}")?;
        }
        Ok(())
    }

    fn metric(&self, name: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}{name}"),
            None => name.to_string(),
        }
    }

    fn labels(&self, target: &str, run_id: Option<&RunId>) -> String {
        let mut labels = Vec::with_capacity(3);
        if let Some(job) = &self.job {
            labels.push(format!("job=\"{}\"", escape(job)));
        }
        labels.push(format!("target=\"{}\"", escape(target)));
        if let Some(run_id) = run_id {
            labels.push(format!("run_id=\"{}\"", escape(run_id.as_str())));
        }
        labels.join(",")
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::Outcome;
    use std::time::{Duration, SystemTime};

    fn summary_of(millis: &[u64], transferred: Option<u64>) -> Summary {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let outcomes: Vec<_> = millis
            .iter()
            .enumerate()
            .map(|(i, &ms)| {
                let outcome = Outcome::success(
                    start + Duration::from_secs(i as u64),
                    Duration::from_millis(ms),
                );
                match transferred {
                    Some(t) => outcome.with_transferred(t),
                    None => outcome,
                }
            })
            .collect();
        summarize(&outcomes)
    }

    fn target(name: &str, summary: Summary) -> TargetSummary {
        TargetSummary {
            target: name.to_string(),
            run_id: None,
            summary,
        }
    }

    #[test]
    fn snapshot() {
        let summaries = vec![target("llm", summary_of(&[125, 750], Some(64)))];
        let text = Exposition::new().encode(&summaries, Some(&RunId::new("r1")));

        let expected = r#"# HELP requests_total Total operations attempted.
# TYPE requests_total counter
# HELP requests_successful Operations that succeeded.
# TYPE requests_successful counter
# HELP requests_failed Operations that failed.
# TYPE requests_failed counter
# HELP request_duration_seconds Latency of successful operations in seconds.
# TYPE request_duration_seconds histogram
# HELP response_size_bytes Mean size transferred per operation.
# TYPE response_size_bytes gauge

requests_total{target="llm",run_id="r1"} 2
requests_successful{target="llm",run_id="r1"} 2
requests_failed{target="llm",run_id="r1"} 0
request_duration_seconds_bucket{target="llm",run_id="r1",le="0.001"} 0
request_duration_seconds_bucket{target="llm",run_id="r1",le="0.01"} 0
request_duration_seconds_bucket{target="llm",run_id="r1",le="0.1"} 0
request_duration_seconds_bucket{target="llm",run_id="r1",le="0.5"} 1
request_duration_seconds_bucket{target="llm",run_id="r1",le="1.0"} 2
request_duration_seconds_bucket{target="llm",run_id="r1",le="2.5"} 2
request_duration_seconds_bucket{target="llm",run_id="r1",le="5.0"} 2
request_duration_seconds_bucket{target="llm",run_id="r1",le="10.0"} 2
request_duration_seconds_bucket{target="llm",run_id="r1",le="+Inf"} 2
request_duration_seconds_sum{target="llm",run_id="r1"} 0.875
request_duration_seconds_count{target="llm",run_id="r1"} 2
response_size_bytes{target="llm",run_id="r1"} 64
"#;
        assert_eq!(text, expected);
    }

    #[test]
    fn encoding_is_idempotent() {
        let summaries = vec![
            target("a", summary_of(&[1, 2, 3], None)),
            target("b", summary_of(&[700, 3_000], Some(10))),
        ];
        let exposition = Exposition::new().namespace("benchmark_").job("nightly");
        assert_eq!(
            exposition.encode(&summaries, None),
            exposition.encode(&summaries, None)
        );
    }

    #[test]
    fn groups_keep_input_order_and_skip_empty_targets() {
        let summaries = vec![
            target("zeta", summary_of(&[1], None)),
            target("empty", Summary::default()),
            target("alpha", summary_of(&[1], None)),
        ];
        let text = Exposition::new().encode(&summaries, None);

        assert!(!text.contains("empty"));
        assert!(!text.contains("response_size_bytes"));
        let zeta = text.find("target=\"zeta\"").unwrap();
        let alpha = text.find("target=\"alpha\"").unwrap();
        assert!(zeta < alpha);
        assert_eq!(text.matches("\n\n").count(), 2);
    }

    #[test]
    fn buckets_are_monotonic_and_end_at_count() {
        let summaries = vec![target("t", summary_of(&[0, 3, 40, 90, 600, 4_000, 12_000], None))];
        let text = Exposition::new().encode(&summaries, None);

        let buckets: Vec<u64> = text
            .lines()
            .filter(|l| l.starts_with("request_duration_seconds_bucket"))
            .map(|l| l.rsplit(' ').next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(buckets.len(), 9);
        assert!(buckets.windows(2).all(|w| w[0] <= w[1]));

        let count: u64 = text
            .lines()
            .find(|l| l.starts_with("request_duration_seconds_count"))
            .and_then(|l| l.rsplit(' ').next())
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(buckets.last().copied(), Some(count));
        assert_eq!(buckets[buckets.len() - 2], 6);
    }

    #[test]
    fn namespace_job_and_escaping() {
        let summaries = vec![target("we\"ird\\name", summary_of(&[1], None))];
        let text = Exposition::new()
            .namespace("benchmark_")
            .job("ci")
            .encode(&summaries, None);

        assert!(text.contains("# TYPE benchmark_requests_total counter"));
        assert!(text.contains(r#"benchmark_requests_total{job="ci",target="we\"ird\\name"} 1"#));
    }

    #[test]
    fn empty_input_encodes_to_nothing() {
        assert_eq!(Exposition::new().encode(&[], None), "");
        assert_eq!(
            Exposition::new().encode(&[target("a", Summary::default())], None),
            ""
        );
        assert_eq!(Exposition::new().encode_recent(&[]), "");
    }

    #[test]
    fn recent_records_are_labelled_by_run() {
        let outcome = Outcome::success(SystemTime::now(), Duration::from_millis(5));
        let records: Vec<_> = ["r2", "r1", "r2"]
            .into_iter()
            .map(|run| RecordedOutcome {
                run_id: RunId::new(run),
                target: "api".to_string(),
                outcome: outcome.clone(),
            })
            .collect();
        let text = Exposition::new().encode_recent(&records);

        assert!(text.contains(r#"requests_total{target="api",run_id="r2"} 2"#));
        assert!(text.contains(r#"requests_total{target="api",run_id="r1"} 1"#));
    }
}
