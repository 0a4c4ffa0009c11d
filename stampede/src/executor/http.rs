use super::{measure, Completed, OperationError, OperationExecutor};
use crate::error::ExecutorError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use stampede_core::{Outcome, TargetConfig};
use std::time::Duration;

/// Request shape understood by the inference server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceApi {
    #[default]
    Ollama,
    Vllm,
    Triton,
    /// Plain `POST` of a small JSON document to the base address.
    Generic,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct InferenceParams {
    pub api: InferenceApi,
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            api: InferenceApi::default(),
            model: "llama2".to_string(),
            prompt: "Hello, this is a benchmark test.".to_string(),
            max_tokens: 50,
        }
    }
}

/// Sends one inference request per operation. Any 2xx answer is a success and the size of the
/// response body is recorded as transferred bytes.
pub struct HttpInferenceExecutor {
    client: reqwest::Client,
    url: String,
    body: serde_json::Value,
    operation: &'static str,
}

impl HttpInferenceExecutor {
    pub fn new(
        base: &str,
        params: InferenceParams,
        timeout: Duration,
    ) -> Result<Self, ExecutorError> {
        let base = base.trim_end_matches('/');
        let (url, body, operation) = match params.api {
            InferenceApi::Ollama => (
                format!("{base}/api/generate"),
                json!({ "model": params.model, "prompt": params.prompt, "stream": false }),
                "GENERATE",
            ),
            InferenceApi::Vllm => (
                format!("{base}/v1/completions"),
                json!({
                    "model": params.model,
                    "prompt": params.prompt,
                    "max_tokens": params.max_tokens,
                }),
                "COMPLETION",
            ),
            InferenceApi::Triton => (
                format!("{base}/v2/models/{}/infer", params.model),
                json!({
                    "inputs": [{
                        "name": "text_input",
                        "shape": [1],
                        "datatype": "BYTES",
                        "data": [params.prompt],
                    }]
                }),
                "INFER",
            ),
            InferenceApi::Generic => (base.to_string(), json!({ "test": "benchmark" }), "POST"),
        };

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url,
            body,
            operation,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self) -> Result<Completed, OperationError> {
        let response = self.client.post(&self.url).json(&self.body).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            Ok(Completed {
                status: Some(status.as_u16() as i64),
                transferred: Some(body.len() as u64),
            })
        } else {
            Err(OperationError::with_status(
                format!("HTTP {status}"),
                status.as_u16() as i64,
            ))
        }
    }
}

#[async_trait]
impl OperationExecutor for HttpInferenceExecutor {
    async fn execute(&mut self, target: &TargetConfig) -> Outcome {
        measure(target.timeout, self.operation, self.request()).await
    }
}
