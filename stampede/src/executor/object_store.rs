use super::{
    measure, measure_since, object_name, random_payload, worker_rng, ByteSize, Completed,
    Connectable, OperationExecutor, Started, WeightedChoice,
};
use crate::error::ExecutorError;
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Builder, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client,
};
use rand::{rngs::SmallRng, Rng};
use serde::Deserialize;
use serde_with::{serde_as, Map};
use stampede_core::{Outcome, TargetConfig};
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

const KEY_PREFIX: &str = "benchmark/";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectOp {
    Put,
    Get,
    List,
    Delete,
}

impl ObjectOp {
    pub fn name(self) -> &'static str {
        match self {
            ObjectOp::Put => "PUT",
            ObjectOp::Get => "GET",
            ObjectOp::List => "LIST",
            ObjectOp::Delete => "DELETE",
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ObjectStoreParams {
    pub access_key: String,
    pub secret_key: String,
    pub bucket_name: String,
    pub region: String,
    #[serde_as(as = "Option<Map<_, _>>")]
    pub operation_mix: Option<Vec<(ObjectOp, f64)>>,
    #[serde_as(as = "Option<Map<_, _>>")]
    pub object_sizes: Option<Vec<(ByteSize, f64)>>,
}

impl Default for ObjectStoreParams {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            bucket_name: "benchmark-bucket".to_string(),
            region: "us-east-1".to_string(),
            operation_mix: None,
            object_sizes: None,
        }
    }
}

/// Puts, gets, lists and deletes objects under `benchmark/` in an S3-compatible bucket.
///
/// Keys written by this executor are remembered so that reads and deletes hit objects that
/// exist. A read with nothing to read writes instead; a delete with nothing to delete succeeds
/// with zero bytes.
pub struct ObjectStoreExecutor {
    client: Client,
    bucket: String,
    region: String,
    mix: WeightedChoice<ObjectOp>,
    sizes: WeightedChoice<ByteSize>,
    created: Vec<String>,
    rng: SmallRng,
}

impl ObjectStoreExecutor {
    pub fn new(endpoint: &str, params: ObjectStoreParams, timeout: Duration) -> Self {
        let credentials = Credentials::new(
            params.access_key,
            params.secret_key,
            None,
            None,
            "stampede-static",
        );
        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(params.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .timeout_config(
                aws_sdk_s3::config::timeout::TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .build(),
            )
            .build();

        let mix = WeightedChoice::new(
            params.operation_mix.unwrap_or_else(|| {
                vec![
                    (ObjectOp::Put, 0.4),
                    (ObjectOp::Get, 0.4),
                    (ObjectOp::List, 0.1),
                    (ObjectOp::Delete, 0.1),
                ]
            }),
            ObjectOp::Put,
        );
        let sizes = WeightedChoice::new(
            params.object_sizes.unwrap_or_else(|| {
                vec![
                    (ByteSize(ByteSize::KB), 0.3),
                    (ByteSize(10 * ByteSize::KB), 0.3),
                    (ByteSize(100 * ByteSize::KB), 0.2),
                    (ByteSize(ByteSize::MB), 0.15),
                    (ByteSize(10 * ByteSize::MB), 0.05),
                ]
            }),
            ByteSize(ByteSize::KB),
        );

        Self {
            client: Client::from_conf(config),
            bucket: params.bucket_name,
            region: params.region,
            mix,
            sizes,
            created: Vec::new(),
            rng: worker_rng(),
        }
    }

    async fn put(&mut self, target: &TargetConfig) -> Outcome {
        let key = format!("{KEY_PREFIX}{}.bin", object_name(&mut self.rng));
        let size = self.sizes.sample(&mut self.rng).bytes();
        let data = random_payload(&mut self.rng, size);

        let outcome = measure(target.timeout, ObjectOp::Put.name(), async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(ByteStream::from(data))
                .send()
                .await
                .map_err(DisplayErrorContext)?;
            Ok(Completed::transferred(size as u64))
        })
        .await;

        if outcome.is_success() {
            self.created.push(key);
        }
        outcome
    }

    async fn get(&mut self, target: &TargetConfig, started: Started, key: String) -> Outcome {
        measure_since(started, target.timeout, ObjectOp::Get.name(), async {
            let object = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(DisplayErrorContext)?;
            let body = object.body.collect().await?.into_bytes();
            Ok(Completed::transferred(body.len() as u64))
        })
        .await
    }

    async fn list(&mut self, target: &TargetConfig) -> Outcome {
        measure(target.timeout, ObjectOp::List.name(), async {
            let listing = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(KEY_PREFIX)
                .max_keys(1000)
                .send()
                .await
                .map_err(DisplayErrorContext)?;
            Ok(Completed::transferred(listing.contents().len() as u64))
        })
        .await
    }

    async fn delete(
        &mut self,
        target: &TargetConfig,
        started: Started,
        key: Option<String>,
    ) -> Outcome {
        measure_since(started, target.timeout, ObjectOp::Delete.name(), async {
            if let Some(key) = key {
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(&key)
                    .send()
                    .await
                    .map_err(DisplayErrorContext)?;
            }
            Ok(Completed::transferred(0))
        })
        .await
    }

    /// A random key written earlier by this executor, or failing that one found in the bucket.
    async fn existing_key(&mut self, timeout: Duration, take: bool) -> Option<String> {
        if !self.created.is_empty() {
            let idx = self.rng.gen_range(0..self.created.len());
            return Some(if take {
                self.created.swap_remove(idx)
            } else {
                self.created[idx].clone()
            });
        }

        let listing = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(KEY_PREFIX)
            .max_keys(100)
            .send();
        let listing = match tokio::time::timeout(timeout, listing).await {
            Ok(Ok(listing)) => listing,
            Ok(Err(err)) => {
                debug!("Listing for an existing key failed: {}", DisplayErrorContext(err));
                return None;
            }
            Err(_) => return None,
        };

        let keys: Vec<&str> = listing.contents().iter().filter_map(|o| o.key()).collect();
        if keys.is_empty() {
            None
        } else {
            Some(keys[self.rng.gen_range(0..keys.len())].to_string())
        }
    }
}

#[async_trait]
impl OperationExecutor for ObjectStoreExecutor {
    async fn execute(&mut self, target: &TargetConfig) -> Outcome {
        match *self.mix.sample(&mut self.rng) {
            ObjectOp::Put => self.put(target).await,
            // Finding a key to act on is timed as part of the operation.
            ObjectOp::Get => {
                let started = Started::now();
                match self.existing_key(target.timeout, false).await {
                    Some(key) => self.get(target, started, key).await,
                    None => self.put(target).await,
                }
            }
            ObjectOp::List => self.list(target).await,
            ObjectOp::Delete => {
                let started = Started::now();
                let key = self.existing_key(target.timeout, true).await;
                self.delete(target, started, key).await
            }
        }
    }

    fn connectable(&mut self) -> Option<&mut dyn Connectable> {
        Some(self)
    }
}

#[async_trait]
impl Connectable for ObjectStoreExecutor {
    /// Makes sure the bucket exists, creating it when missing.
    async fn connect(&mut self) -> Result<(), ExecutorError> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!("Created bucket {}", self.bucket);
                Ok(())
            }
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists() => {
                    Ok(())
                }
                _ => Err(ExecutorError::Connect(
                    DisplayErrorContext(err).to_string(),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_distribution_from_labels() {
        let params: ObjectStoreParams = serde_json::from_value(serde_json::json!({
            "bucket_name": "load",
            "object_sizes": { "1KB": 0.5, "1MB": 0.5 },
        }))
        .unwrap();

        assert_eq!(params.bucket_name, "load");
        assert_eq!(
            params.object_sizes,
            Some(vec![(ByteSize(1024), 0.5), (ByteSize(1024 * 1024), 0.5)])
        );
    }

    #[tokio::test]
    async fn delete_without_objects_succeeds_empty() {
        let mut exec = ObjectStoreExecutor::new(
            "http://127.0.0.1:9",
            ObjectStoreParams::default(),
            Duration::from_secs(1),
        );
        let target = TargetConfig::new("s3", stampede_core::TargetKind::ObjectStore);

        let outcome = exec.delete(&target, Started::now(), None).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.transferred(), Some(0));
        assert_eq!(outcome.operation(), Some("DELETE"));
    }

    #[tokio::test]
    async fn failed_key_lookup_is_timed_with_the_delete() {
        let mut exec = ObjectStoreExecutor::new(
            "http://127.0.0.1:9",
            ObjectStoreParams::default(),
            Duration::from_secs(1),
        );
        let target = TargetConfig::new("s3", stampede_core::TargetKind::ObjectStore)
            .timeout(Duration::from_secs(2));

        let started = Started::now();
        let key = exec.existing_key(target.timeout, true).await;
        assert!(key.is_none());
        let outcome = exec.delete(&target, started, key).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.started_at(), started.at);
    }
}
