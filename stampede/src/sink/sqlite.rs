use super::OutcomeSink;
use crate::error::SinkError;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use stampede_core::{Outcome, RecordedOutcome, RunId, RunInfo};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
}

impl JournalMode {
    fn pragma(self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SqliteSinkConfig {
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub journal_mode: JournalMode,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl SqliteSinkConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: JournalMode::default(),
        }
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS outcomes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        target TEXT NOT NULL,
        worker INTEGER,
        operation TEXT,
        started_at_ns INTEGER NOT NULL,
        duration_ns INTEGER NOT NULL,
        success INTEGER NOT NULL,
        status INTEGER,
        error TEXT,
        transferred INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_outcomes_run_id ON outcomes(run_id);
    CREATE INDEX IF NOT EXISTS idx_outcomes_started_at ON outcomes(started_at_ns);";

const COLUMNS: &str = "run_id, target, worker, operation, started_at_ns, duration_ns, success, \
                       status, error, transferred";

/// SQLite-backed sink. Outcomes survive process restarts, so a run can be reported on after the
/// process that drove it has exited.
pub struct SqliteSink {
    connection: Mutex<Connection>,
}

impl SqliteSink {
    pub fn open(config: &SqliteSinkConfig) -> Result<Self, SinkError> {
        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch(&format!(
            "PRAGMA journal_mode={};{SCHEMA}",
            config.journal_mode.pragma()
        ))?;
        debug!("Opened outcome store at {}", config.path.display());

        Ok(Self {
            connection: Mutex::new(conn),
        })
    }

    /// A private, non-persistent database, mostly useful in tests.
    pub fn in_memory() -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Mutex::new(conn),
        })
    }

    fn select(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<RecordedOutcome>, SinkError> {
        let conn = self.connection.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, StoredRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(StoredRow::into_record).collect()
    }
}

impl OutcomeSink for SqliteSink {
    fn append(&self, run_id: &RunId, target: &str, outcomes: &[Outcome]) -> Result<(), SinkError> {
        let mut conn = self.connection.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO outcomes ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ))?;
            for outcome in outcomes {
                stmt.execute(params![
                    run_id.as_str(),
                    target,
                    outcome.worker().map(|w| i64::try_from(w).unwrap_or(i64::MAX)),
                    outcome.operation(),
                    epoch_nanos(outcome.started_at()),
                    saturating_nanos(outcome.duration()),
                    outcome.is_success(),
                    outcome.status(),
                    outcome.error(),
                    outcome
                        .transferred()
                        .map(|t| i64::try_from(t).unwrap_or(i64::MAX)),
                ])?;
            }
        }
        tx.commit()?;

        trace!("Stored {} outcomes for {target} in run {run_id}", outcomes.len());
        Ok(())
    }

    fn query(&self, run_id: &RunId) -> Result<Vec<RecordedOutcome>, SinkError> {
        self.select(
            &format!("SELECT {COLUMNS} FROM outcomes WHERE run_id = ?1 ORDER BY started_at_ns, id"),
            params![run_id.as_str()],
        )
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<RecordedOutcome>, SinkError> {
        self.select(
            &format!("SELECT {COLUMNS} FROM outcomes ORDER BY id DESC LIMIT ?1"),
            params![i64::try_from(limit).unwrap_or(i64::MAX)],
        )
    }

    fn runs(&self) -> Result<Vec<RunInfo>, SinkError> {
        let conn = self.connection.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, COUNT(*) FROM outcomes GROUP BY run_id ORDER BY MIN(id)",
        )?;
        let runs = stmt
            .query_map([], |row| {
                Ok(RunInfo {
                    run_id: RunId::new(&row.get::<_, String>(0)?),
                    records: row.get::<_, i64>(1)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}

/// Raw column values of one stored outcome.
struct StoredRow {
    run_id: String,
    target: String,
    worker: Option<i64>,
    operation: Option<String>,
    started_at_ns: i64,
    duration_ns: i64,
    success: bool,
    status: Option<i64>,
    error: Option<String>,
    transferred: Option<i64>,
}

impl StoredRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            target: row.get(1)?,
            worker: row.get(2)?,
            operation: row.get(3)?,
            started_at_ns: row.get(4)?,
            duration_ns: row.get(5)?,
            success: row.get(6)?,
            status: row.get(7)?,
            error: row.get(8)?,
            transferred: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<RecordedOutcome, SinkError> {
        let non_negative = |value: i64, column: &str| {
            u64::try_from(value)
                .map_err(|_| SinkError::Malformed(format!("negative {column}: {value}")))
        };

        let started_at =
            SystemTime::UNIX_EPOCH + Duration::from_nanos(non_negative(self.started_at_ns, "start")?);
        let duration = Duration::from_nanos(non_negative(self.duration_ns, "duration")?);
        let transferred = self
            .transferred
            .map(|t| non_negative(t, "transferred"))
            .transpose()?;
        let worker = self
            .worker
            .map(|w| non_negative(w, "worker").map(|w| w as usize))
            .transpose()?;

        Ok(RecordedOutcome {
            run_id: RunId::new(&self.run_id),
            target: self.target,
            outcome: Outcome::from_parts(
                started_at,
                duration,
                self.success,
                self.status,
                self.error,
                transferred,
                self.operation,
                worker,
            ),
        })
    }
}

fn epoch_nanos(at: SystemTime) -> i64 {
    at.duration_since(SystemTime::UNIX_EPOCH)
        .map(saturating_nanos)
        .unwrap_or(0)
}

fn saturating_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::tests as shared;
    use std::sync::Arc;

    #[test]
    fn orders_by_start_then_append() {
        shared::orders_by_start_then_append(&SqliteSink::in_memory().unwrap());
    }

    #[test]
    fn recent_is_newest_first() {
        shared::recent_is_newest_first(&SqliteSink::in_memory().unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteSink::open(&SqliteSinkConfig::new(dir.path().join("outcomes.db"))).unwrap();
        shared::concurrent_appends_are_not_lost(Arc::new(sink)).await;
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteSinkConfig::new(dir.path().join("outcomes.db"));
        let run = RunId::new("persisted");

        {
            let sink = SqliteSink::open(&config).unwrap();
            let outcome = shared::outcome_at(7, true)
                .with_worker(3)
                .with_operation("PUT");
            sink.append(&run, "s3", &[outcome]).unwrap();
        }

        let sink = SqliteSink::open(&config).unwrap();
        let records = sink.query(&run).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target, "s3");
        assert_eq!(records[0].outcome, {
            shared::outcome_at(7, true)
                .with_worker(3)
                .with_operation("PUT")
        });
    }

    #[test]
    fn config_defaults() {
        let config: SqliteSinkConfig =
            serde_json::from_value(serde_json::json!({ "path": "/tmp/x.db" })).unwrap();
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert_eq!(config.journal_mode, JournalMode::Wal);
    }
}
