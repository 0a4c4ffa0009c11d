mod utils;
#[allow(unused)]
use utils::*;

use stampede::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn target(name: &str, kind: TargetKind) -> TargetConfig {
    TargetConfig::new(name, kind)
        .workers(2)
        .rate(10.)
        .duration(Duration::from_secs(1))
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn run_persist_report_and_expose() -> anyhow::Result<()> {
    init();
    let base = mock().await;
    let dir = tempfile::tempdir()?;
    let db = SqliteSinkConfig::new(dir.path().join("outcomes.db"));

    let targets = vec![
        target("llm", TargetKind::HttpInference),
        target("chroma", TargetKind::VectorDb)
            .params(serde_json::json!({ "url": base, "dimension": 8 })),
        target("broken", TargetKind::HttpInference)
            .address(&format!("{base}/status/503"))
            .params(serde_json::json!({ "api": "generic" })),
        target("disk", TargetKind::Filesystem).params(serde_json::json!({
            "base_path": dir.path().join("files"),
            "file_sizes": { "1KB": 0.5, "10KB": 0.5 },
        })),
        target("postgres", TargetKind::Sql),
    ];

    let run = {
        let sink: Arc<dyn OutcomeSink> = Arc::new(SqliteSink::open(&db)?);
        Orchestrator::new(sink)
            .mode(RunMode::Parallel)
            .addresses(HashMap::from([("llm".to_string(), base.clone())]))
            .run(&targets)
            .await?
    };

    for name in ["llm", "chroma", "broken", "disk"] {
        let target = run.target(name).unwrap();
        assert_eq!(target.status, TargetStatus::Completed, "{name}");
        assert!(!target.outcomes.is_empty(), "{name}");
    }
    assert!(matches!(
        run.target("postgres").unwrap().status,
        TargetStatus::Skipped(_)
    ));

    // Reporting happens against a fresh handle on the same database.
    let sink = SqliteSink::open(&db)?;
    let records = sink.query(&run.run_id)?;
    assert_eq!(records.len(), run.total_outcomes());
    assert!(records
        .windows(2)
        .all(|w| w[0].outcome.started_at() <= w[1].outcome.started_at()));

    let report = Report::from_records(run.run_id.clone(), records);
    let names: Vec<_> = report.targets.iter().map(|t| t.target.as_str()).collect();
    assert_eq!(names.len(), 4);
    assert!(!names.contains(&"postgres"));

    let by_name = |name: &str| {
        &report
            .targets
            .iter()
            .find(|t| t.target == name)
            .unwrap()
            .summary
    };
    assert_eq!(by_name("llm").success_rate, 100.);
    assert_eq!(by_name("broken").success_rate, 0.);
    assert!(by_name("disk").mean_transferred.is_some());
    assert_eq!(
        report.summary.total,
        report.targets.iter().map(|t| t.summary.total).sum::<usize>()
    );

    report.save(dir.path().join("report.json"))?;
    assert!(report.human_summary().contains("broken"));

    let exposition = Exposition::new().namespace("benchmark_");
    let text = exposition.encode(&report.targets, Some(&run.run_id));
    assert_eq!(text, exposition.encode(&report.targets, Some(&run.run_id)));
    assert!(text.contains(&format!(
        "benchmark_requests_failed{{target=\"broken\",run_id=\"{}\"}}",
        run.run_id
    )));
    assert!(!text.contains("postgres"));

    let recent = sink.query_recent(10_000)?;
    assert_eq!(recent.len(), run.total_outcomes());
    assert!(Exposition::new()
        .encode_recent(&recent)
        .contains(&format!("run_id=\"{}\"", run.run_id)));
    Ok(())
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn runs_accumulate_in_one_store() -> anyhow::Result<()> {
    init();
    let base = mock().await;
    let sink = Arc::new(MemorySink::new());
    let targets = vec![target("llm", TargetKind::HttpInference).address(&base)];

    let first = Orchestrator::new(sink.clone()).run(&targets).await?;
    let second = Orchestrator::new(sink.clone())
        .run_id(RunId::new("second"))
        .run(&targets)
        .await?;

    let runs = sink.runs()?;
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].run_id, first.run_id);
    assert_eq!(runs[1].run_id, second.run_id);
    assert_eq!(runs[1].records, second.total_outcomes());
    Ok(())
}
