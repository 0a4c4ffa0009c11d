use super::{measure, worker_rng, Completed, Connectable, OperationExecutor, WeightedChoice};
use crate::error::ExecutorError;
use async_trait::async_trait;
use postgres::{Client, NoTls};
use rand::{distributions::Alphanumeric, rngs::SmallRng, Rng};
use serde::Deserialize;
use serde_with::{serde_as, Map};
use stampede_core::{Outcome, TargetConfig};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlOp {
    Select,
    Insert,
    Update,
    Delete,
}

impl SqlOp {
    pub fn name(self) -> &'static str {
        match self {
            SqlOp::Select => "SELECT",
            SqlOp::Insert => "INSERT",
            SqlOp::Update => "UPDATE",
            SqlOp::Delete => "DELETE",
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SqlParams {
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub table_name: String,
    #[serde_as(as = "Option<Map<_, _>>")]
    pub operation_mix: Option<Vec<(SqlOp, f64)>>,
}

impl Default for SqlParams {
    fn default() -> Self {
        Self {
            port: 5432,
            database: "benchmark".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            table_name: "benchmark_test".to_string(),
            operation_mix: None,
        }
    }
}

/// Runs single statements against a PostgreSQL table with a weighted select/insert/update/delete
/// mix. Transferred counts rows returned or affected.
///
/// The synchronous client is driven on the blocking pool. A connection lost to a timeout or a
/// broken socket is re-established on the next operation.
pub struct SqlExecutor {
    config: postgres::Config,
    table: String,
    mix: WeightedChoice<SqlOp>,
    client: Option<Client>,
    rng: SmallRng,
}

impl SqlExecutor {
    pub fn new(address: &str, params: SqlParams) -> Result<Self, ExecutorError> {
        if !is_identifier(&params.table_name) {
            return Err(ExecutorError::InvalidParam(format!(
                "table name `{}` is not a plain identifier",
                params.table_name
            )));
        }

        let mix = WeightedChoice::new(
            params.operation_mix.clone().unwrap_or_else(|| {
                vec![
                    (SqlOp::Select, 0.4),
                    (SqlOp::Insert, 0.3),
                    (SqlOp::Update, 0.2),
                    (SqlOp::Delete, 0.1),
                ]
            }),
            SqlOp::Select,
        );

        Ok(Self {
            config: pg_config(address, &params)?,
            table: params.table_name,
            mix,
            client: None,
            rng: worker_rng(),
        })
    }
}

#[async_trait]
impl OperationExecutor for SqlExecutor {
    async fn execute(&mut self, target: &TargetConfig) -> Outcome {
        let op = *self.mix.sample(&mut self.rng);
        let statement = Statement::random(op, &self.table, &mut self.rng);
        let config = self.config.clone();
        let slot = &mut self.client;
        let client = slot.take();

        measure(target.timeout, op.name(), async move {
            let (client, res) = tokio::task::spawn_blocking(move || {
                let mut client = match client {
                    Some(client) => client,
                    None => match config.connect(NoTls) {
                        Ok(client) => client,
                        Err(err) => return (None, Err(err)),
                    },
                };
                let res = statement.run(&mut client);
                let client = (!client.is_closed()).then_some(client);
                (client, res)
            })
            .await?;

            *slot = client;
            Ok(Completed::transferred(res?))
        })
        .await
    }

    fn connectable(&mut self) -> Option<&mut dyn Connectable> {
        Some(self)
    }
}

#[async_trait]
impl Connectable for SqlExecutor {
    async fn connect(&mut self) -> Result<(), ExecutorError> {
        let config = self.config.clone();
        let table = self.table.clone();

        let client = tokio::task::spawn_blocking(move || {
            let mut client = config
                .connect(NoTls)
                .map_err(|e| ExecutorError::Connect(e.to_string()))?;

            // Sibling workers race on the same DDL; losing that race is harmless.
            if let Err(err) = client.batch_execute(&setup_sql(&table)) {
                warn!("Failed to prepare table {table}: {err}");
            }
            Ok::<_, ExecutorError>(client)
        })
        .await
        .map_err(|e| ExecutorError::Connect(e.to_string()))??;

        self.client = Some(client);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = tokio::task::spawn_blocking(move || {
                if let Err(err) = client.close() {
                    debug!("Error closing connection: {err}");
                }
            })
            .await;
        }
    }
}

impl Drop for SqlExecutor {
    fn drop(&mut self) {
        // The synchronous client blocks on its own runtime when dropped, which must not happen on
        // an async worker thread.
        if let Some(client) = self.client.take() {
            std::thread::spawn(move || drop(client));
        }
    }
}

/// A statement with its randomly drawn arguments.
enum Statement {
    Select { sql: String, value: i32 },
    Insert { sql: String, name: String, value: i32, data: String },
    Update { sql: String, data: String, value: i32 },
    Delete { sql: String, value: i32 },
}

impl Statement {
    fn random(op: SqlOp, table: &str, rng: &mut SmallRng) -> Self {
        let value = rng.gen_range(1..=10_000);
        match op {
            SqlOp::Select => Statement::Select {
                sql: format!("SELECT * FROM {table} WHERE value = $1 LIMIT 100"),
                value,
            },
            SqlOp::Insert => Statement::Insert {
                sql: format!("INSERT INTO {table} (name, value, data) VALUES ($1, $2, $3)"),
                name: random_text(rng, 10),
                value,
                data: random_text(rng, 100),
            },
            SqlOp::Update => Statement::Update {
                sql: format!("UPDATE {table} SET data = $1 WHERE value = $2"),
                data: random_text(rng, 100),
                value,
            },
            // PostgreSQL has no DELETE ... LIMIT.
            SqlOp::Delete => Statement::Delete {
                sql: format!(
                    "DELETE FROM {table} WHERE id IN (SELECT id FROM {table} WHERE value = $1 LIMIT 10)"
                ),
                value,
            },
        }
    }

    fn run(&self, client: &mut Client) -> Result<u64, postgres::Error> {
        match self {
            Statement::Select { sql, value } => {
                Ok(client.query(sql.as_str(), &[value])?.len() as u64)
            }
            Statement::Insert {
                sql,
                name,
                value,
                data,
            } => client.execute(sql.as_str(), &[name, value, data]),
            Statement::Update { sql, data, value } => client.execute(sql.as_str(), &[data, value]),
            Statement::Delete { sql, value } => client.execute(sql.as_str(), &[value]),
        }
    }
}

fn setup_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id SERIAL PRIMARY KEY,
            name VARCHAR(100),
            value INTEGER,
            data TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_value ON {table}(value);"
    )
}

fn random_text(rng: &mut SmallRng, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Accepts either a full connection string (`postgres://...` or `key=value` pairs) or a bare
/// `host[:port]`. Credentials and database missing from the address come from the params.
fn pg_config(address: &str, params: &SqlParams) -> Result<postgres::Config, ExecutorError> {
    let mut config = if address.contains("://") || address.contains('=') {
        address
            .parse::<postgres::Config>()
            .map_err(|_| ExecutorError::InvalidAddress(address.to_string()))?
    } else {
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .map_err(|_| ExecutorError::InvalidAddress(address.to_string()))?,
            ),
            None => (address, params.port),
        };
        let mut config = postgres::Config::new();
        config.host(host).port(port);
        config
    };

    if config.get_user().is_none() {
        config.user(&params.user);
    }
    if config.get_password().is_none() {
        config.password(&params.password);
    }
    if config.get_dbname().is_none() {
        config.dbname(&params.database);
    }

    Ok(config)
}
