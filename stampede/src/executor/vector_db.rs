use super::{
    measure, worker_rng, Completed, Connectable, OperationError, OperationExecutor, WeightedChoice,
};
use crate::error::ExecutorError;
use async_trait::async_trait;
use rand::{rngs::SmallRng, seq::index, Rng};
use rand_distr::StandardNormal;
use serde::Deserialize;
use serde_json::json;
use serde_with::{serde_as, Map};
use stampede_core::{Outcome, TargetConfig};
use std::time::{Duration, SystemTime};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorOp {
    Insert,
    Search,
    Update,
    Delete,
}

impl VectorOp {
    pub fn name(self) -> &'static str {
        match self {
            VectorOp::Insert => "INSERT",
            VectorOp::Search => "SEARCH",
            VectorOp::Update => "UPDATE",
            VectorOp::Delete => "DELETE",
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VectorDbParams {
    pub collection_name: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub search_k: usize,
    #[serde_as(as = "Option<Map<_, _>>")]
    pub operation_mix: Option<Vec<(VectorOp, f64)>>,
}

impl Default for VectorDbParams {
    fn default() -> Self {
        Self {
            collection_name: "benchmark_collection".to_string(),
            dimension: 384,
            batch_size: 10,
            search_k: 10,
            operation_mix: None,
        }
    }
}

#[derive(Deserialize)]
struct Collection {
    id: String,
}

/// Drives a Chroma collection over its REST API with random normal embeddings.
///
/// Inserts and updates write `batch_size` vectors, searches ask for the `search_k` nearest
/// neighbours of one random vector, and deletes remove up to `batch_size` of the ids this
/// executor inserted. Transferred counts vectors.
pub struct VectorDbExecutor {
    client: reqwest::Client,
    base: String,
    params: VectorDbParams,
    mix: WeightedChoice<VectorOp>,
    collection: Option<String>,
    inserted: Vec<String>,
    next_id: u64,
    rng: SmallRng,
}

impl VectorDbExecutor {
    pub fn new(
        base: &str,
        params: VectorDbParams,
        timeout: Duration,
    ) -> Result<Self, ExecutorError> {
        if params.dimension == 0 || params.batch_size == 0 {
            return Err(ExecutorError::InvalidParam(
                "dimension and batch_size must be positive".to_string(),
            ));
        }

        let mix = WeightedChoice::new(
            params.operation_mix.clone().unwrap_or_else(|| {
                vec![
                    (VectorOp::Insert, 0.3),
                    (VectorOp::Search, 0.5),
                    (VectorOp::Update, 0.1),
                    (VectorOp::Delete, 0.1),
                ]
            }),
            VectorOp::Search,
        );

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base: format!("{}/api/v1/collections", base.trim_end_matches('/')),
            params,
            mix,
            collection: None,
            inserted: Vec::new(),
            next_id: 0,
            rng: worker_rng(),
        })
    }

    fn vectors(&mut self, count: usize) -> Vec<Vec<f32>> {
        let dimension = self.params.dimension;
        (0..count)
            .map(|_| {
                (0..dimension)
                    .map(|_| self.rng.sample::<f32, _>(StandardNormal))
                    .collect()
            })
            .collect()
    }

    fn fresh_ids(&mut self, count: usize) -> Vec<String> {
        let micros = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros();
        (0..count)
            .map(|_| {
                self.next_id += 1;
                format!("vec_{micros}_{:x}_{}", self.rng.gen::<u32>(), self.next_id)
            })
            .collect()
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, OperationError> {
        let collection = self
            .collection
            .as_deref()
            .ok_or("collection is not connected")?;
        let response = self
            .client
            .post(format!("{}/{collection}/{path}", self.base))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(OperationError::with_status(
                format!("HTTP {status}"),
                status.as_u16() as i64,
            ))
        }
    }

    /// Writes a fresh batch through `path` (`add` or `upsert`).
    async fn write(&mut self, target: &TargetConfig, op: VectorOp, path: &str) -> Outcome {
        let count = self.params.batch_size;
        let ids = self.fresh_ids(count);
        let embeddings = self.vectors(count);
        let body = json!({ "ids": ids, "embeddings": embeddings });

        let outcome = measure(target.timeout, op.name(), async {
            self.post(path, body).await?;
            Ok(Completed::transferred(count as u64))
        })
        .await;

        if outcome.is_success() {
            self.inserted.extend(ids);
        }
        outcome
    }

    async fn search(&mut self, target: &TargetConfig) -> Outcome {
        let query = self.vectors(1);
        let body = json!({ "query_embeddings": query, "n_results": self.params.search_k });

        measure(target.timeout, VectorOp::Search.name(), async {
            self.post("query", body).await?;
            Ok(Completed::transferred(1))
        })
        .await
    }

    async fn delete(&mut self, target: &TargetConfig) -> Outcome {
        let count = self.params.batch_size.min(self.inserted.len());
        let mut picked = index::sample(&mut self.rng, self.inserted.len(), count).into_vec();
        // Remove from the back so earlier indices stay valid.
        picked.sort_unstable_by(|a, b| b.cmp(a));
        let ids: Vec<String> = picked
            .into_iter()
            .map(|i| self.inserted.swap_remove(i))
            .collect();

        measure(target.timeout, VectorOp::Delete.name(), async {
            if ids.is_empty() {
                return Ok(Completed::transferred(0));
            }
            self.post("delete", json!({ "ids": ids })).await?;
            Ok(Completed::transferred(ids.len() as u64))
        })
        .await
    }
}

#[async_trait]
impl OperationExecutor for VectorDbExecutor {
    async fn execute(&mut self, target: &TargetConfig) -> Outcome {
        match *self.mix.sample(&mut self.rng) {
            VectorOp::Insert => self.write(target, VectorOp::Insert, "add").await,
            VectorOp::Search => self.search(target).await,
            VectorOp::Update => self.write(target, VectorOp::Update, "upsert").await,
            VectorOp::Delete => self.delete(target).await,
        }
    }

    fn connectable(&mut self) -> Option<&mut dyn Connectable> {
        Some(self)
    }
}

#[async_trait]
impl Connectable for VectorDbExecutor {
    /// Gets or creates the collection and remembers its id.
    async fn connect(&mut self) -> Result<(), ExecutorError> {
        let response = self
            .client
            .post(&self.base)
            .json(&json!({
                "name": self.params.collection_name,
                "get_or_create": true,
                "metadata": { "dimension": self.params.dimension },
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ExecutorError::Connect(e.to_string()))?;

        let collection: Collection = response
            .json()
            .await
            .map_err(|e| ExecutorError::Connect(e.to_string()))?;

        debug!(
            "Using collection {} ({})",
            self.params.collection_name, collection.id
        );
        self.collection = Some(collection.id);
        Ok(())
    }
}
