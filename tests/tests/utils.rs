use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

/// Installs tracing, a panic hook and a global metrics recorder once per test binary.
#[allow(unused)]
pub fn init() -> &'static PrometheusHandle {
    static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

    RECORDER.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_env_filter("stampede=debug,mock_service=debug")
            .try_init();

        PrometheusBuilder::new()
            .install_recorder()
            .expect("metrics recorder is installed once")
    })
}

/// Base URL of a fresh mock service.
#[allow(unused)]
pub async fn mock() -> String {
    let addr = mock_service::spawn().await.expect("mock service binds");
    format!("http://{addr}")
}
