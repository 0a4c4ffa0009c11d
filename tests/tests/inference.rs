mod utils;
#[allow(unused)]
use utils::*;

use stampede::prelude::*;
use std::time::Duration;

fn llm(address: &str, api: &str) -> TargetConfig {
    TargetConfig::new("llm", TargetKind::HttpInference)
        .workers(3)
        .rate(5.)
        .duration(Duration::from_secs(2))
        .address(address)
        .params(serde_json::json!({ "api": api, "model": "tiny" }))
}

async fn run(target: &TargetConfig) -> Vec<Outcome> {
    let address = target.address.clone();
    run_target(target, |_| Backend::for_target(target, address.as_deref()))
        .await
        .unwrap()
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn paced_workers_against_ollama() {
    init();
    let base = mock().await;

    let outcomes = run(&llm(&base, "ollama")).await;

    assert!((24..=33).contains(&outcomes.len()), "{}", outcomes.len());
    for outcome in &outcomes {
        assert!(outcome.is_success(), "{:?}", outcome.error());
        assert_eq!(outcome.status(), Some(200));
        assert_eq!(outcome.operation(), Some("GENERATE"));
        assert!(outcome.transferred().unwrap_or(0) > 0);
        assert!(outcome.worker().is_some_and(|w| w < 3));
    }
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn error_status_becomes_failed_outcomes() {
    init();
    let base = mock().await;

    let outcomes = run(&llm(&format!("{base}/status/500"), "generic")).await;

    assert!((24..=33).contains(&outcomes.len()), "{}", outcomes.len());
    for outcome in &outcomes {
        assert!(!outcome.is_success());
        assert_eq!(outcome.status(), Some(500));
        assert!(outcome.error().is_some_and(|e| e.contains("500")));
    }
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn vllm_and_triton_apis() {
    init();
    let base = mock().await;

    for (api, operation) in [("vllm", "COMPLETION"), ("triton", "INFER")] {
        let target = llm(&base, api)
            .workers(1)
            .duration(Duration::from_secs(1));
        let outcomes = run(&target).await;

        assert!(!outcomes.is_empty());
        assert!(outcomes
            .iter()
            .all(|o| o.is_success() && o.operation() == Some(operation)));
    }
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn unreachable_backend_times_out_into_failures() {
    init();
    let base = mock().await;

    let target = llm(&format!("{base}/delay/ms/2000"), "generic")
        .workers(1)
        .duration(Duration::from_millis(500))
        .timeout(Duration::from_millis(100));
    let outcomes = run(&target).await;

    assert!(!outcomes.is_empty());
    assert!(outcomes.iter().all(|o| !o.is_success()));
    assert!(outcomes
        .iter()
        .all(|o| o.duration() < Duration::from_millis(1_000)));
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn outcomes_feed_the_metrics_recorder() {
    let handle = init();
    let base = mock().await;

    let target = llm(&base, "ollama")
        .workers(1)
        .duration(Duration::from_millis(500));
    run(&target).await;

    let rendered = handle.render();
    assert!(rendered.contains("stampede_operations_success"));
    assert!(rendered.contains("target=\"llm\""));
}

#[cfg(feature = "integration")]
mod pacing {
    use super::*;

    #[tokio::test]
    async fn slow_backend_lowers_realized_rate() {
        init();
        let base = mock().await;

        // 100ms of latency on top of a 100ms interval halves the per-worker rate.
        let target = llm(&format!("{base}/delay/ms/100"), "generic")
            .workers(2)
            .rate(10.)
            .duration(Duration::from_secs(10));
        let outcomes = run(&target).await;

        assert!((90..=110).contains(&outcomes.len()), "{}", outcomes.len());
    }

    #[tokio::test]
    async fn shared_limiter_holds_target_rate() {
        init();
        let base = mock().await;

        let target = llm(&format!("{base}/delay/ms/1"), "generic")
            .workers(8)
            .rate(5.)
            .duration(Duration::from_secs(10))
            .pacing(Pacing::SharedLimiter);
        let outcomes = run(&target).await;

        assert!((380..=420).contains(&outcomes.len()), "{}", outcomes.len());
    }
}
