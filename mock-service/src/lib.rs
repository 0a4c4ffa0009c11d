//! Stand-in backend for exercising stampede: inference APIs, a Chroma-like collection store and
//! endpoints that inject latency, errors or rate limits on demand.
use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::{any, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, info, warn};

const GENERATED_TEXT: &str = "This is a synthetic completion produced by the mock service.";

#[derive(Clone, Default)]
pub struct AppState {
    collections: Arc<RwLock<Collections>>,
    limiters: Arc<RwLock<HashMap<u32, Arc<DefaultDirectRateLimiter>>>>,
}

#[derive(Default)]
struct Collections {
    ids: HashMap<String, String>,
    vectors: HashMap<String, HashMap<String, Vec<f32>>>,
}

type Locked<T> = Result<T, StatusCode>;

impl AppState {
    fn collections(&self) -> Locked<std::sync::RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(generic))
        .route("/api/generate", post(generate))
        .route("/v1/completions", post(completions))
        .route("/v2/models/:model/infer", post(infer))
        .route("/api/v1/collections", post(get_or_create_collection))
        .route("/api/v1/collections/:id/add", post(add))
        .route("/api/v1/collections/:id/upsert", post(add))
        .route("/api/v1/collections/:id/query", post(query))
        .route("/api/v1/collections/:id/delete", post(delete))
        .route("/status/:code", any(status))
        .route("/delay/ms/:delay_ms", any(delay))
        .route("/limited/:max_tps/delay/ms/:delay_ms", any(limited))
        .with_state(AppState::default())
        .layer(TraceLayer::new_for_http())
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mock service listening on {}", listener.local_addr()?);
    axum::serve(listener, router()).await?;
    Ok(())
}

/// Serves on an ephemeral local port in the background and returns the bound address.
pub async fn spawn() -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router()).await {
            warn!("Mock service stopped: {err}");
        }
    });
    Ok(addr)
}

async fn generic() -> Json<Value> {
    counter!("mock_service_requests", "endpoint" => "generic").increment(1);
    Json(json!({ "ok": true }))
}

#[derive(Deserialize)]
struct GenerateRequest {
    model: String,
    #[allow(unused)]
    prompt: String,
}

#[debug_handler]
async fn generate(Json(req): Json<GenerateRequest>) -> Json<Value> {
    counter!("mock_service_requests", "endpoint" => "generate").increment(1);
    Json(json!({ "model": req.model, "response": GENERATED_TEXT, "done": true }))
}

#[derive(Deserialize)]
struct CompletionRequest {
    model: String,
    #[serde(default)]
    max_tokens: Option<u32>,
}

async fn completions(Json(req): Json<CompletionRequest>) -> Json<Value> {
    counter!("mock_service_requests", "endpoint" => "completions").increment(1);
    let words: Vec<&str> = GENERATED_TEXT
        .split(' ')
        .take(req.max_tokens.unwrap_or(16) as usize)
        .collect();
    Json(json!({
        "object": "text_completion",
        "model": req.model,
        "choices": [{ "index": 0, "text": words.join(" "), "finish_reason": "length" }],
    }))
}

async fn infer(Path(model): Path<String>) -> Json<Value> {
    counter!("mock_service_requests", "endpoint" => "infer").increment(1);
    Json(json!({
        "model_name": model,
        "outputs": [{ "name": "text_output", "datatype": "BYTES", "shape": [1], "data": [GENERATED_TEXT] }],
    }))
}

#[derive(Deserialize)]
struct CreateCollection {
    name: String,
}

async fn get_or_create_collection(
    State(state): State<AppState>,
    Json(req): Json<CreateCollection>,
) -> Locked<Json<Value>> {
    let mut collections = state.collections()?;
    let id = match collections.ids.get(&req.name) {
        Some(id) => id.clone(),
        None => {
            let id = format!("{:016x}", rand::random::<u64>());
            collections.ids.insert(req.name.clone(), id.clone());
            collections.vectors.insert(id.clone(), HashMap::new());
            debug!("Created collection {} ({id})", req.name);
            id
        }
    };
    Ok(Json(json!({ "id": id, "name": req.name })))
}

#[derive(Deserialize)]
struct AddRequest {
    ids: Vec<String>,
    embeddings: Vec<Vec<f32>>,
}

async fn add(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddRequest>,
) -> Locked<Json<bool>> {
    if req.ids.len() != req.embeddings.len() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let mut collections = state.collections()?;
    let vectors = collections
        .vectors
        .get_mut(&id)
        .ok_or(StatusCode::NOT_FOUND)?;
    vectors.extend(req.ids.into_iter().zip(req.embeddings));
    counter!("mock_service_requests", "endpoint" => "add").increment(1);
    Ok(Json(true))
}

#[derive(Deserialize)]
struct QueryRequest {
    query_embeddings: Vec<Vec<f32>>,
    #[serde(default = "default_results")]
    n_results: usize,
}

fn default_results() -> usize {
    10
}

async fn query(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<QueryRequest>,
) -> Locked<Json<Value>> {
    let collections = state.collections()?;
    let vectors = collections.vectors.get(&id).ok_or(StatusCode::NOT_FOUND)?;

    let (ids, distances): (Vec<Vec<String>>, Vec<Vec<f32>>) = req
        .query_embeddings
        .iter()
        .map(|query| {
            let mut scored: Vec<(&String, f32)> = vectors
                .iter()
                .map(|(id, v)| (id, squared_distance(query, v)))
                .collect();
            scored.sort_by(|a, b| a.1.total_cmp(&b.1));
            let nearest: (Vec<String>, Vec<f32>) = scored
                .into_iter()
                .take(req.n_results)
                .map(|(id, d)| (id.clone(), d))
                .unzip();
            nearest
        })
        .unzip();

    counter!("mock_service_requests", "endpoint" => "query").increment(1);
    Ok(Json(json!({ "ids": ids, "distances": distances })))
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[derive(Deserialize)]
struct DeleteRequest {
    ids: Vec<String>,
}

async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DeleteRequest>,
) -> Locked<Json<Vec<String>>> {
    let mut collections = state.collections()?;
    let vectors = collections
        .vectors
        .get_mut(&id)
        .ok_or(StatusCode::NOT_FOUND)?;
    let deleted = req
        .ids
        .into_iter()
        .filter(|id| vectors.remove(id).is_some())
        .collect();
    counter!("mock_service_requests", "endpoint" => "delete").increment(1);
    Ok(Json(deleted))
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    counter!("mock_service_requests", "endpoint" => "status").increment(1);
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

#[debug_handler]
async fn delay(Path(delay_ms): Path<u64>) {
    counter!("mock_service_requests", "endpoint" => "delay").increment(1);
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

/// Answers `429` once more than `max_tps` requests per second arrive across all callers.
async fn limited(
    State(state): State<AppState>,
    Path((max_tps, delay_ms)): Path<(u32, u64)>,
) -> Result<(), StatusCode> {
    counter!("mock_service_requests", "endpoint" => "limited").increment(1);
    let max_tps = NonZeroU32::new(max_tps).ok_or(StatusCode::BAD_REQUEST)?;

    let limiter = {
        let mut limiters = state
            .limiters
            .write()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        limiters
            .entry(max_tps.get())
            .or_insert_with(|| Arc::new(RateLimiter::direct(Quota::per_second(max_tps))))
            .clone()
    };

    match limiter.check() {
        Ok(_) => {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(())
        }
        Err(_) => Err(StatusCode::TOO_MANY_REQUESTS),
    }
}
