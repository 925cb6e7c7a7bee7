//! In-process preprocessing backend.
//!
//! Runs preprocessors on the tokio blocking pool: batch preprocessors as a
//! single task, map-reduce preprocessors as concurrent map tasks followed by
//! a reduce. Either way the metadata companion is written last.

use crate::{
    errors::{CloudObjectError, Result},
    services::{
        attribute_codec,
        preprocess::{
            BatchPreprocessor, MapReducePreprocessor, MapTask, ObjectHandle,
            PreprocessingMetadata, PreprocessorBackend,
        },
    },
};
use anyhow::Context;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024 * 1024;
pub const DEFAULT_MAX_PARALLELISM: usize = 8;

#[derive(Debug, Clone)]
pub struct LocalBackendConfig {
    /// Target bytes per map task.
    pub chunk_size: u64,
    /// Upper bound on map tasks in flight.
    pub max_parallelism: usize,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_parallelism: DEFAULT_MAX_PARALLELISM,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    config: LocalBackendConfig,
}

impl LocalBackend {
    pub fn new(config: LocalBackendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LocalBackendConfig {
        &self.config
    }

    async fn object_size(&self, object: &ObjectHandle) -> Result<u64> {
        if let Some(size) = object.size() {
            return Ok(size);
        }
        let location = object.location();
        let head = object
            .store()
            .head(location.bucket(), location.key())
            .await?;
        Ok(head.metadata.content_length)
    }

    async fn write_companion(
        &self,
        object: &ObjectHandle,
        output: PreprocessingMetadata,
    ) -> Result<()> {
        let payload = attribute_codec::encode(&output.attributes)?;
        let meta = object.meta_location();
        let written = object
            .store()
            .put(
                meta.bucket(),
                meta.key(),
                output.metadata.unwrap_or_default(),
                Some(payload),
            )
            .await?;
        info!(
            "wrote metadata companion {} ({} attributes, {} bytes)",
            meta,
            output.attributes.len(),
            written.content_length
        );
        Ok(())
    }
}

/// Contiguous ranges covering `0..size`, one per mapper. Earlier mappers take
/// the remainder so range sizes differ by at most one byte.
fn split_ranges(size: u64, num_mappers: usize) -> Vec<MapTask> {
    let n = num_mappers.max(1) as u64;
    let base = size / n;
    let remainder = size % n;

    let mut start = 0;
    (0..n)
        .map(|i| {
            let len = base + u64::from(i < remainder);
            let task = MapTask {
                mapper_id: i as usize,
                num_mappers: n as usize,
                range: start..start + len,
            };
            start += len;
            task
        })
        .collect()
}

#[async_trait]
impl PreprocessorBackend for LocalBackend {
    async fn run_batch(
        &self,
        preprocessor: Box<dyn BatchPreprocessor>,
        object: &ObjectHandle,
    ) -> Result<()> {
        let location = object.location();
        info!("running batch preprocessing for {}", location);

        let data = object
            .store()
            .get_bytes(location.bucket(), location.key())
            .await?;
        let handle = object.clone();
        let output = tokio::task::spawn_blocking(move || {
            preprocessor
                .preprocess(data, &handle)
                .with_context(|| format!("batch preprocessing of {} failed", handle.location()))
        })
        .await
        .context("batch preprocessing task panicked")??;

        self.write_companion(object, output).await
    }

    async fn run_distributed(
        &self,
        preprocessor: Box<dyn MapReducePreprocessor>,
        object: &ObjectHandle,
    ) -> Result<()> {
        let preprocessor: Arc<dyn MapReducePreprocessor> = Arc::from(preprocessor);
        let location = object.location().clone();

        let size = self.object_size(object).await?;
        let num_mappers = preprocessor.num_mappers(size, self.config.chunk_size);
        let tasks = split_ranges(size, num_mappers);
        info!(
            "running map-reduce preprocessing for {} ({} bytes, {} mappers)",
            location,
            size,
            tasks.len()
        );

        let mapped: Vec<PreprocessingMetadata> = stream::iter(tasks)
            .map(|task| {
                let preprocessor = Arc::clone(&preprocessor);
                let store = Arc::clone(object.store());
                let location = location.clone();
                async move {
                    let chunk = store
                        .get_range(location.bucket(), location.key(), task.range.clone())
                        .await?;
                    debug!(
                        "mapper {}/{} read {:?} of {}",
                        task.mapper_id + 1,
                        task.num_mappers,
                        task.range,
                        location
                    );
                    let output = tokio::task::spawn_blocking(move || {
                        preprocessor
                            .map(chunk, &task)
                            .with_context(|| format!("mapper {} failed", task.mapper_id))
                    })
                    .await
                    .context("map task panicked")??;
                    Ok::<_, CloudObjectError>(output)
                }
            })
            .buffered(self.config.max_parallelism.max(1))
            .try_collect()
            .await?;

        debug!("reducing {} map outputs for {}", mapped.len(), location);
        let output = preprocessor
            .reduce(mapped, object)
            .with_context(|| format!("reduce for {location} failed"))?;

        self.write_companion(object, output).await
    }
}
