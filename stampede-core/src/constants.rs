use std::time::Duration;

/// Per-operation timeout applied by every executor unless the target overrides it.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra headroom the worker grants an executor beyond its own timeout before it records a
/// synthetic failure on the executor's behalf.
pub const WORKER_GUARD_GRACE: Duration = Duration::from_secs(5);

/// Upper bounds (seconds) of the latency histogram. The `+Inf` bucket is implicit.
pub const LATENCY_BUCKETS: [f64; 8] = [0.001, 0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0];

