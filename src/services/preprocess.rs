//! Preprocessor and backend contracts.
//!
//! A preprocessor analyzes a cloud object once and yields the attributes (and
//! optional binary metadata) stored in its metadata companion. Backends decide
//! where and how a preprocessor runs and own the companion write.

use crate::{
    errors::Result,
    models::{attributes::Attributes, location::ObjectLocation},
    services::store::StoreClient,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::{fmt, ops::Range, sync::Arc};

/// Output of a preprocessing pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprocessingMetadata {
    /// Attributes written into the companion payload.
    pub attributes: Attributes,
    /// Optional binary metadata written as the companion body.
    pub metadata: Option<Bytes>,
}

impl PreprocessingMetadata {
    pub fn from_attributes(attributes: Attributes) -> Self {
        Self {
            attributes,
            metadata: None,
        }
    }
}

/// Single-node preprocessor: sees the whole object at once.
pub trait BatchPreprocessor: Send + Sync {
    fn preprocess(
        &self,
        data: Bytes,
        object: &ObjectHandle,
    ) -> anyhow::Result<PreprocessingMetadata>;
}

/// Position of one map task within a map-reduce run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTask {
    pub mapper_id: usize,
    pub num_mappers: usize,
    pub range: Range<u64>,
}

/// Map-reduce preprocessor: maps contiguous byte ranges independently, then
/// reduces the ordered map outputs.
pub trait MapReducePreprocessor: Send + Sync {
    fn map(&self, chunk: Bytes, task: &MapTask) -> anyhow::Result<PreprocessingMetadata>;

    /// `mapped` holds one entry per mapper, in mapper order.
    fn reduce(
        &self,
        mapped: Vec<PreprocessingMetadata>,
        object: &ObjectHandle,
    ) -> anyhow::Result<PreprocessingMetadata>;

    /// Number of mappers for an object of `size` bytes. Defaults to one mapper
    /// per `chunk_size` bytes, and never fewer than one.
    fn num_mappers(&self, size: u64, chunk_size: u64) -> usize {
        usize::try_from(size.div_ceil(chunk_size.max(1)))
            .unwrap_or(usize::MAX)
            .max(1)
    }
}

type BatchFactory =
    Arc<dyn Fn(&Value) -> anyhow::Result<Box<dyn BatchPreprocessor>> + Send + Sync>;
type MapReduceFactory =
    Arc<dyn Fn(&Value) -> anyhow::Result<Box<dyn MapReducePreprocessor>> + Send + Sync>;

/// How a data type constructs its preprocessor from caller parameters.
#[derive(Clone)]
pub enum PreprocessorHandle {
    Batch { name: String, factory: BatchFactory },
    MapReduce { name: String, factory: MapReduceFactory },
    /// Registered but not runnable on any backend.
    Unsupported { name: String },
}

impl PreprocessorHandle {
    pub fn batch<P, F>(name: impl Into<String>, factory: F) -> Self
    where
        P: BatchPreprocessor + 'static,
        F: Fn(&Value) -> anyhow::Result<P> + Send + Sync + 'static,
    {
        Self::Batch {
            name: name.into(),
            factory: Arc::new(move |params| {
                factory(params).map(|p| Box::new(p) as Box<dyn BatchPreprocessor>)
            }),
        }
    }

    pub fn map_reduce<P, F>(name: impl Into<String>, factory: F) -> Self
    where
        P: MapReducePreprocessor + 'static,
        F: Fn(&Value) -> anyhow::Result<P> + Send + Sync + 'static,
    {
        Self::MapReduce {
            name: name.into(),
            factory: Arc::new(move |params| {
                factory(params).map(|p| Box::new(p) as Box<dyn MapReducePreprocessor>)
            }),
        }
    }

    pub fn unsupported(name: impl Into<String>) -> Self {
        Self::Unsupported { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Batch { name, .. }
            | Self::MapReduce { name, .. }
            | Self::Unsupported { name } => name,
        }
    }
}

impl fmt::Debug for PreprocessorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Batch { .. } => "Batch",
            Self::MapReduce { .. } => "MapReduce",
            Self::Unsupported { .. } => "Unsupported",
        };
        f.debug_struct(kind).field("name", &self.name()).finish()
    }
}

/// Owned snapshot of a cloud object reference: where it lives, how to reach
/// the store, and whatever was cached about it when the snapshot was taken.
///
/// Handed to backends and preprocessors, and bound into slices as their owner.
#[derive(Clone)]
pub struct ObjectHandle {
    pub(crate) location: ObjectLocation,
    pub(crate) meta_location: ObjectLocation,
    pub(crate) store: Arc<dyn StoreClient>,
    pub(crate) size: Option<u64>,
    pub(crate) attributes: Attributes,
}

impl ObjectHandle {
    pub fn location(&self) -> &ObjectLocation {
        &self.location
    }

    pub fn meta_location(&self) -> &ObjectLocation {
        &self.meta_location
    }

    pub fn store(&self) -> &Arc<dyn StoreClient> {
        &self.store
    }

    /// Object size, if it had been fetched when the snapshot was taken.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("location", &self.location)
            .field("meta_location", &self.meta_location)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Executes preprocessors and writes the resulting metadata companion.
#[async_trait]
pub trait PreprocessorBackend: Send + Sync {
    async fn run_batch(
        &self,
        preprocessor: Box<dyn BatchPreprocessor>,
        object: &ObjectHandle,
    ) -> Result<()>;

    async fn run_distributed(
        &self,
        preprocessor: Box<dyn MapReducePreprocessor>,
        object: &ObjectHandle,
    ) -> Result<()>;
}
