use super::{
    measure, measure_since, object_name, random_payload, worker_rng, ByteSize, Completed,
    Connectable, Started,
    OperationExecutor, WeightedChoice,
};
use crate::error::ExecutorError;
use async_trait::async_trait;
use rand::{rngs::SmallRng, Rng};
use serde::Deserialize;
use serde_with::{serde_as, Map};
use stampede_core::{Outcome, TargetConfig};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOp {
    Write,
    Read,
    Stat,
    Delete,
}

impl FileOp {
    pub fn name(self) -> &'static str {
        match self {
            FileOp::Write => "WRITE",
            FileOp::Read => "READ",
            FileOp::Stat => "STAT",
            FileOp::Delete => "DELETE",
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FilesystemParams {
    pub base_path: PathBuf,
    /// `fsync` every written file before the write counts as complete.
    #[serde(alias = "sync_mode")]
    pub sync: bool,
    /// Remove the files this executor created when it is closed.
    pub cleanup: bool,
    #[serde_as(as = "Option<Map<_, _>>")]
    pub operation_mix: Option<Vec<(FileOp, f64)>>,
    #[serde_as(as = "Option<Map<_, _>>")]
    pub file_sizes: Option<Vec<(ByteSize, f64)>>,
}

impl Default for FilesystemParams {
    fn default() -> Self {
        Self {
            base_path: std::env::temp_dir().join("stampede_storage"),
            sync: false,
            cleanup: true,
            operation_mix: None,
            file_sizes: None,
        }
    }
}

/// Writes, reads, stats and deletes `file_*.bin` files under a base directory.
///
/// Reads and stats with no known file write one instead. Stats report zero bytes.
pub struct FilesystemExecutor {
    base: PathBuf,
    sync: bool,
    cleanup: bool,
    mix: WeightedChoice<FileOp>,
    sizes: WeightedChoice<ByteSize>,
    created: Vec<PathBuf>,
    rng: SmallRng,
}

impl FilesystemExecutor {
    pub fn new(params: FilesystemParams) -> Self {
        let mix = WeightedChoice::new(
            params.operation_mix.unwrap_or_else(|| {
                vec![
                    (FileOp::Write, 0.4),
                    (FileOp::Read, 0.4),
                    (FileOp::Stat, 0.1),
                    (FileOp::Delete, 0.1),
                ]
            }),
            FileOp::Write,
        );
        let sizes = WeightedChoice::new(
            params.file_sizes.unwrap_or_else(|| {
                vec![
                    (ByteSize(ByteSize::KB), 0.2),
                    (ByteSize(10 * ByteSize::KB), 0.2),
                    (ByteSize(100 * ByteSize::KB), 0.2),
                    (ByteSize(ByteSize::MB), 0.2),
                    (ByteSize(10 * ByteSize::MB), 0.1),
                    (ByteSize(100 * ByteSize::MB), 0.1),
                ]
            }),
            ByteSize(ByteSize::KB),
        );

        Self {
            base: params.base_path,
            sync: params.sync,
            cleanup: params.cleanup,
            mix,
            sizes,
            created: Vec::new(),
            rng: worker_rng(),
        }
    }

    async fn write(&mut self, target: &TargetConfig) -> Outcome {
        let path = self
            .base
            .join(format!("file_{}.bin", object_name(&mut self.rng)));
        let size = self.sizes.sample(&mut self.rng).bytes();
        let data = random_payload(&mut self.rng, size);
        let sync = self.sync;

        let outcome = measure(target.timeout, FileOp::Write.name(), async {
            let mut file = tokio::fs::File::create(&path).await?;
            file.write_all(&data).await?;
            if sync {
                file.sync_all().await?;
            } else {
                file.flush().await?;
            }
            Ok(Completed::transferred(size as u64))
        })
        .await;

        if outcome.is_success() {
            self.created.push(path);
        }
        outcome
    }

    async fn read(&mut self, target: &TargetConfig, started: Started, path: PathBuf) -> Outcome {
        measure_since(started, target.timeout, FileOp::Read.name(), async {
            let data = tokio::fs::read(&path).await?;
            Ok(Completed::transferred(data.len() as u64))
        })
        .await
    }

    async fn stat(&mut self, target: &TargetConfig, started: Started, path: PathBuf) -> Outcome {
        measure_since(started, target.timeout, FileOp::Stat.name(), async {
            tokio::fs::metadata(&path).await?;
            Ok(Completed::transferred(0))
        })
        .await
    }

    async fn delete(
        &mut self,
        target: &TargetConfig,
        started: Started,
        path: Option<PathBuf>,
    ) -> Outcome {
        measure_since(started, target.timeout, FileOp::Delete.name(), async {
            if let Some(path) = path {
                tokio::fs::remove_file(&path).await?;
            }
            Ok(Completed::transferred(0))
        })
        .await
    }

    /// A random file created by this executor, or failing that one found in the base directory.
    async fn existing_file(&mut self, take: bool) -> Option<PathBuf> {
        if !self.created.is_empty() {
            let idx = self.rng.gen_range(0..self.created.len());
            return Some(if take {
                self.created.swap_remove(idx)
            } else {
                self.created[idx].clone()
            });
        }

        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("file_") && name.ends_with(".bin") {
                found.push(entry.path());
            }
        }

        if found.is_empty() {
            None
        } else {
            let idx = self.rng.gen_range(0..found.len());
            Some(found.swap_remove(idx))
        }
    }
}

#[async_trait]
impl OperationExecutor for FilesystemExecutor {
    async fn execute(&mut self, target: &TargetConfig) -> Outcome {
        match *self.mix.sample(&mut self.rng) {
            FileOp::Write => self.write(target).await,
            // The lookup of an existing file is timed as part of the operation.
            FileOp::Read => {
                let started = Started::now();
                match self.existing_file(false).await {
                    Some(path) => self.read(target, started, path).await,
                    None => self.write(target).await,
                }
            }
            FileOp::Stat => {
                let started = Started::now();
                match self.existing_file(false).await {
                    Some(path) => self.stat(target, started, path).await,
                    None => self.write(target).await,
                }
            }
            FileOp::Delete => {
                let started = Started::now();
                let path = self.existing_file(true).await;
                self.delete(target, started, path).await
            }
        }
    }

    fn connectable(&mut self) -> Option<&mut dyn Connectable> {
        Some(self)
    }
}

#[async_trait]
impl Connectable for FilesystemExecutor {
    async fn connect(&mut self) -> Result<(), ExecutorError> {
        tokio::fs::create_dir_all(&self.base).await.map_err(|e| {
            ExecutorError::Connect(format!("{}: {e}", self.base.display()))
        })
    }

    async fn close(&mut self) {
        if !self.cleanup {
            return;
        }

        debug!("Removing {} files from {}", self.created.len(), self.base.display());
        for path in self.created.drain(..) {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                warn!("Failed to delete {}: {err}", path.display());
            }
        }
        // Only succeeds once the last worker has emptied the directory.
        let _ = tokio::fs::remove_dir(&self.base).await;
    }
}
