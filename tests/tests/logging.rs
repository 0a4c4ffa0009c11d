use stampede::prelude::*;
use std::time::Duration;
use tracing_test::traced_test;

#[tokio::test]
#[traced_test]
async fn run_progress_is_logged() -> anyhow::Result<()> {
    let addr = mock_service::spawn().await?;
    let targets = vec![
        TargetConfig::new("llm", TargetKind::HttpInference)
            .address(&format!("http://{addr}"))
            .rate(10.)
            .duration(Duration::from_millis(300)),
        TargetConfig::new("vectors", TargetKind::VectorDb),
    ];

    let run = Orchestrator::new(std::sync::Arc::new(MemorySink::new()))
        .run_id(RunId::new("logged"))
        .run(&targets)
        .await?;

    assert!(run.target("llm").is_some_and(|t| t.succeeded()));
    assert!(logs_contain("Starting run logged with 2 targets"));
    assert!(logs_contain("Skipping vectors: no address"));
    assert!(logs_contain("Finished run logged: 1 of 2 targets produced outcomes"));
    Ok(())
}
