use crate::{ConfigError, DEFAULT_OPERATION_TIMEOUT};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Backend family a target belongs to. Selects which operation executor drives it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    HttpInference,
    Sql,
    ObjectStore,
    VectorDb,
    Filesystem,
}

impl TargetKind {
    /// Whether the kind talks to a remote endpoint and so needs a resolved address.
    pub fn needs_address(self) -> bool {
        !matches!(self, TargetKind::Filesystem)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::HttpInference => "http-inference",
            TargetKind::Sql => "sql",
            TargetKind::ObjectStore => "object-store",
            TargetKind::VectorDb => "vector-db",
            TargetKind::Filesystem => "filesystem",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How workers of a target are paced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Every worker sleeps `1 / rate_per_second` after each operation. The sleep is not reduced
    /// by the operation's own latency, so the configured rate is a per-worker ceiling and the
    /// target as a whole issues at most `workers * rate_per_second` operations per second.
    #[default]
    PerWorker,
    /// All workers of the target draw from one token bucket refilled at
    /// `workers * rate_per_second`, which holds the aggregate rate even when individual
    /// operations are slow.
    SharedLimiter,
}

/// Whether the targets of a run execute one after another or all at once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Sequential,
    Parallel,
}

/// Immutable description of one benchmarked backend.
///
/// `kind_params` is an opaque bag; only the executor matching `kind` interprets it.
///
/// # Example
/// ```
/// use stampede_core::{TargetConfig, TargetKind};
/// use std::time::Duration;
///
/// let target = TargetConfig::new("ollama", TargetKind::HttpInference)
///     .workers(3)
///     .rate(5.)
///     .duration(Duration::from_secs(2))
///     .params(serde_json::json!({ "api": "ollama", "model": "llama2" }));
///
/// assert!(target.validate().is_ok());
/// ```
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub kind: TargetKind,
    #[serde(rename = "worker_count", alias = "workers")]
    pub workers: usize,
    #[serde(alias = "rate")]
    pub rate_per_second: f64,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(rename = "duration_seconds")]
    pub duration: Duration,
    #[serde(rename = "kind_params", alias = "params", default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    #[serde(rename = "timeout_seconds", default = "default_timeout")]
    pub timeout: Duration,
    /// Statically configured base address, used when provisioning does not supply one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

fn default_timeout() -> Duration {
    DEFAULT_OPERATION_TIMEOUT
}

impl TargetConfig {
    /// A single worker issuing one operation per second for ten seconds.
    pub fn new(name: &str, kind: TargetKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            workers: 1,
            rate_per_second: 1.,
            duration: Duration::from_secs(10),
            params: serde_json::Value::Null,
            pacing: Pacing::default(),
            timeout: DEFAULT_OPERATION_TIMEOUT,
            address: None,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Operations per second, per worker.
    pub fn rate(mut self, rate_per_second: f64) -> Self {
        self.rate_per_second = rate_per_second;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    /// Delay each worker inserts between consecutive operations.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(1. / self.rate_per_second).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers(self.name.clone()));
        }
        if !self.rate_per_second.is_finite() || self.rate_per_second <= 0. {
            return Err(ConfigError::InvalidRate {
                name: self.name.clone(),
                rate: self.rate_per_second,
            });
        }
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration(self.name.clone()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout(self.name.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): workers={}, rate={}/s, duration={}",
            self.name,
            self.kind,
            self.workers,
            self.rate_per_second,
            humantime::format_duration(self.duration),
        )
    }
}

/// Validates every target and checks that names are unique.
pub fn validate_targets(targets: &[TargetConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for target in targets {
        target.validate()?;
        if !seen.insert(target.name.as_str()) {
            return Err(ConfigError::DuplicateName(target.name.clone()));
        }
    }
    Ok(())
}

/// Identifier grouping every outcome of one run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_external_shape() {
        let target: TargetConfig = serde_json::from_value(serde_json::json!({
            "name": "chroma",
            "kind": "vector-db",
            "worker_count": 4,
            "rate_per_second": 2.5,
            "duration_seconds": 1.5,
            "kind_params": { "dimension": 8 },
        }))
        .unwrap();

        assert_eq!(target.kind, TargetKind::VectorDb);
        assert_eq!(target.workers, 4);
        assert_eq!(target.duration, Duration::from_millis(1500));
        assert_eq!(target.timeout, DEFAULT_OPERATION_TIMEOUT);
        assert_eq!(target.pacing, Pacing::PerWorker);
        assert_eq!(target.params["dimension"], 8);
        assert!(target.address.is_none());
    }

    #[test]
    fn interval_is_inverse_rate() {
        let target = TargetConfig::new("a", TargetKind::Sql).rate(4.);
        assert_eq!(target.interval(), Duration::from_millis(250));
    }

    #[test]
    fn rejects_bad_targets() {
        let base = TargetConfig::new("a", TargetKind::Filesystem);
        assert!(base.validate().is_ok());

        assert_eq!(
            base.clone().workers(0).validate(),
            Err(ConfigError::NoWorkers("a".into()))
        );
        assert!(matches!(
            base.clone().rate(0.).validate(),
            Err(ConfigError::InvalidRate { .. })
        ));
        assert!(matches!(
            base.clone().rate(f64::NAN).validate(),
            Err(ConfigError::InvalidRate { .. })
        ));
        assert_eq!(
            base.clone().duration(Duration::ZERO).validate(),
            Err(ConfigError::ZeroDuration("a".into()))
        );
        assert_eq!(
            TargetConfig::new(" ", TargetKind::Sql).validate(),
            Err(ConfigError::EmptyName)
        );
    }

    #[test]
    fn rejects_duplicate_names() {
        let targets = [
            TargetConfig::new("a", TargetKind::Sql),
            TargetConfig::new("b", TargetKind::Sql),
            TargetConfig::new("a", TargetKind::VectorDb),
        ];
        assert_eq!(
            validate_targets(&targets),
            Err(ConfigError::DuplicateName("a".into()))
        );
    }
}
