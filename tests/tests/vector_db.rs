mod utils;
#[allow(unused)]
use utils::*;

use stampede::prelude::*;
use std::time::Duration;

#[tokio::test]
#[ntest::timeout(10_000)]
async fn chroma_mix_runs_against_mock() {
    init();
    let base = mock().await;

    let target = TargetConfig::new("chroma", TargetKind::VectorDb)
        .workers(2)
        .rate(10.)
        .duration(Duration::from_secs(1))
        .params(serde_json::json!({
            "collection_name": "bench",
            "dimension": 8,
            "batch_size": 4,
            "search_k": 3,
        }));

    let outcomes = run_target(&target, |_| Backend::for_target(&target, Some(&base)))
        .await
        .unwrap();

    assert!(outcomes.len() >= 10, "{}", outcomes.len());
    for outcome in &outcomes {
        assert!(outcome.is_success(), "{:?}", outcome.error());
        assert!(matches!(
            outcome.operation(),
            Some("INSERT" | "SEARCH" | "UPDATE" | "DELETE")
        ));
    }
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn insert_only_mix_reports_batch_size() {
    init();
    let base = mock().await;

    let target = TargetConfig::new("chroma", TargetKind::VectorDb)
        .workers(1)
        .rate(10.)
        .duration(Duration::from_millis(500))
        .params(serde_json::json!({
            "dimension": 4,
            "batch_size": 5,
            "operation_mix": { "insert": 1.0 },
        }));

    let outcomes = run_target(&target, |_| Backend::for_target(&target, Some(&base)))
        .await
        .unwrap();

    assert!(!outcomes.is_empty());
    assert!(outcomes
        .iter()
        .all(|o| o.operation() == Some("INSERT") && o.transferred() == Some(5)));
}
