//! src/services/cloud_object.rs
//!
//! CloudObject: a reference to a blob in the store together with its
//! metadata companion. Caches HEAD results for both, decodes the companion
//! payload into attributes, dispatches preprocessing, and drives partitioning.
//!
//! A reference is a single-task value: every operation that may touch the
//! caches takes `&mut self`.

use crate::{
    errors::{CacheSlot, CloudObjectError, Result},
    models::{
        attributes::Attributes,
        data_type::CloudDataType,
        location::ObjectLocation,
        object::ObjectMetadata,
        slice::CloudObjectSlice,
    },
    services::{
        attribute_codec,
        preprocess::{ObjectHandle, PreprocessorBackend, PreprocessorHandle},
        store::{HeadObject, StoreClient},
    },
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{fmt, path::Path, sync::Arc};
use tracing::{debug, info};

/// Cached outcome of a HEAD lookup.
#[derive(Debug, Clone)]
enum Cached<T> {
    Unknown,
    Present(T),
    Absent,
}

impl<T> Cached<T> {
    fn is_unknown(&self) -> bool {
        matches!(self, Cached::Unknown)
    }

    fn is_absent(&self) -> bool {
        matches!(self, Cached::Absent)
    }

    fn present(&self) -> Option<&T> {
        match self {
            Cached::Present(value) => Some(value),
            _ => None,
        }
    }
}

pub struct CloudObject {
    data_type: Arc<CloudDataType>,
    path: ObjectLocation,
    meta_path: ObjectLocation,
    store: Arc<dyn StoreClient>,
    obj_meta: Cached<ObjectMetadata>,
    meta_meta: Cached<ObjectMetadata>,
    attributes: Attributes,
}

impl CloudObject {
    /// Create a reference to `uri` without touching the store.
    pub fn new(
        data_type: Arc<CloudDataType>,
        uri: &str,
        store: Arc<dyn StoreClient>,
    ) -> Result<Self> {
        let path = ObjectLocation::from_uri(uri)?;
        let meta_path = path.metadata_location();
        debug!("cloud object {} with metadata companion {}", path, meta_path);

        Ok(Self {
            data_type,
            path,
            meta_path,
            store,
            obj_meta: Cached::Unknown,
            meta_meta: Cached::Unknown,
            attributes: Attributes::new(),
        })
    }

    /// Reference an object that should already exist. With `fetch`, both slots
    /// are resolved eagerly and a missing object fails with `NotFound`.
    pub async fn from_existing(
        data_type: Arc<CloudDataType>,
        uri: &str,
        store: Arc<dyn StoreClient>,
        fetch: bool,
    ) -> Result<Self> {
        let mut object = Self::new(data_type, uri, store)?;
        if fetch {
            object.fetch(true, false).await?;
        }
        Ok(object)
    }

    /// Upload `local_path` to `uri` and reference it. Fails with
    /// `AlreadyExists`, without uploading, when `uri` is occupied.
    pub async fn create_from_local(
        data_type: Arc<CloudDataType>,
        local_path: impl AsRef<Path>,
        uri: &str,
        store: Arc<dyn StoreClient>,
    ) -> Result<Self> {
        let mut object = Self::new(data_type, uri, store)?;
        if object.exists().await? {
            return Err(CloudObjectError::AlreadyExists(object.path.clone()));
        }

        let local_path = local_path.as_ref();
        let metadata = object
            .store
            .upload(local_path, object.path.bucket(), object.path.key())
            .await?;
        info!(
            "uploaded {} to {} ({} bytes)",
            local_path.display(),
            object.path,
            metadata.content_length
        );
        object.obj_meta = Cached::Present(metadata);
        Ok(object)
    }

    pub fn path(&self) -> &ObjectLocation {
        &self.path
    }

    pub fn meta_path(&self) -> &ObjectLocation {
        &self.meta_path
    }

    pub fn data_type(&self) -> &Arc<CloudDataType> {
        &self.data_type
    }

    pub fn store(&self) -> &Arc<dyn StoreClient> {
        &self.store
    }

    /// Attributes decoded from the companion. Empty until a fetch has found
    /// the companion.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Resolve every unresolved cache slot with a HEAD lookup and return the
    /// cached `(object, companion)` metadata pair.
    ///
    /// Resolved slots are never looked up again. A slot left absent fails the
    /// call with `NotFound` when its `enforce_*` flag is set.
    pub async fn fetch(
        &mut self,
        enforce_obj: bool,
        enforce_meta: bool,
    ) -> Result<(Option<ObjectMetadata>, Option<ObjectMetadata>)> {
        self.resolve_object().await?;
        if enforce_obj && self.obj_meta.is_absent() {
            return Err(CloudObjectError::NotFound {
                slot: CacheSlot::Object,
                location: self.path.clone(),
            });
        }

        self.resolve_companion().await?;
        if enforce_meta && self.meta_meta.is_absent() {
            return Err(CloudObjectError::NotFound {
                slot: CacheSlot::Companion,
                location: self.meta_path.clone(),
            });
        }

        Ok((
            self.obj_meta.present().cloned(),
            self.meta_meta.present().cloned(),
        ))
    }

    async fn resolve_object(&mut self) -> Result<()> {
        if !self.obj_meta.is_unknown() {
            return Ok(());
        }
        self.obj_meta = match self.head(CacheSlot::Object).await? {
            Some(head) => Cached::Present(head.metadata),
            None => Cached::Absent,
        };
        Ok(())
    }

    async fn resolve_companion(&mut self) -> Result<()> {
        if !self.meta_meta.is_unknown() {
            return Ok(());
        }
        self.meta_meta = match self.head(CacheSlot::Companion).await? {
            Some(head) => {
                // A corrupt payload leaves the slot unresolved and the
                // previous attributes in place.
                self.attributes = attribute_codec::decode(&head.payload)?;
                Cached::Present(head.metadata)
            }
            None => Cached::Absent,
        };
        Ok(())
    }

    /// HEAD one slot's location, translating the store's not-found into `None`.
    async fn head(&self, slot: CacheSlot) -> Result<Option<HeadObject>> {
        let location = match slot {
            CacheSlot::Object => &self.path,
            CacheSlot::Companion => &self.meta_path,
        };
        match self.store.head(location.bucket(), location.key()).await {
            Ok(head) => {
                debug!("HEAD {} -> {} bytes", location, head.metadata.content_length);
                Ok(Some(head))
            }
            Err(err) if err.is_not_found() => {
                debug!("HEAD {} -> not found", location);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Forget both cached slots and the attributes.
    pub fn invalidate(&mut self) {
        self.obj_meta = Cached::Unknown;
        self.meta_meta = Cached::Unknown;
        self.attributes = Attributes::new();
    }

    pub async fn exists(&mut self) -> Result<bool> {
        self.resolve_object().await?;
        Ok(self.obj_meta.present().is_some())
    }

    /// Object size in bytes. Fails with `NotFound` when the object is absent.
    pub async fn size(&mut self) -> Result<u64> {
        self.resolve_object().await?;
        self.obj_meta
            .present()
            .map(|meta| meta.content_length)
            .ok_or_else(|| CloudObjectError::NotFound {
                slot: CacheSlot::Object,
                location: self.path.clone(),
            })
    }

    /// Probe the companion location directly, bypassing the cache.
    pub async fn is_preprocessed(&self) -> Result<bool> {
        Ok(self.head(CacheSlot::Companion).await?.is_some())
    }

    /// Run this object's preprocessor on `backend`.
    ///
    /// Fails with `AlreadyPreprocessed` when the companion already exists,
    /// unless `force` is set. `params` are handed to the preprocessor factory.
    /// On success the companion slot is reset so the next `fetch` picks up the
    /// new attributes.
    pub async fn preprocess(
        &mut self,
        backend: &dyn PreprocessorBackend,
        force: bool,
        params: &Value,
    ) -> Result<()> {
        if self.is_preprocessed().await? && !force {
            return Err(CloudObjectError::AlreadyPreprocessed(self.path.clone()));
        }

        let data_type = Arc::clone(&self.data_type);
        let handle = self.handle();
        match data_type.preprocessor()? {
            PreprocessorHandle::Batch { name, factory } => {
                info!("preprocessing {} with batch preprocessor {}", self.path, name);
                backend.run_batch(factory(params)?, &handle).await?;
            }
            PreprocessorHandle::MapReduce { name, factory } => {
                info!("preprocessing {} with map-reduce preprocessor {}", self.path, name);
                backend.run_distributed(factory(params)?, &handle).await?;
            }
            PreprocessorHandle::Unsupported { .. } => {
                return Err(CloudObjectError::NotPreprocessable(
                    data_type.name().to_string(),
                ));
            }
        }

        self.meta_meta = Cached::Unknown;
        Ok(())
    }

    /// Look up a preprocessed attribute.
    ///
    /// Attributes are only populated after `fetch` has found the companion.
    pub fn get_attribute(&self, name: &str) -> Result<&Value> {
        self.attributes
            .get(name)
            .ok_or_else(|| CloudObjectError::AttributeNotFound(name.to_string()))
    }

    pub fn get_attribute_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        match self.attributes.get_as(name) {
            Some(Ok(value)) => Ok(value),
            Some(Err(source)) => Err(CloudObjectError::AttributeType {
                name: name.to_string(),
                source,
            }),
            None => Err(CloudObjectError::AttributeNotFound(name.to_string())),
        }
    }

    /// Apply a partitioning strategy and bind every slice to this object.
    /// Slice order is whatever the strategy produced.
    pub fn partition<S, F>(&self, strategy: F) -> Result<Vec<S>>
    where
        S: CloudObjectSlice,
        F: FnOnce(&CloudObject) -> Result<Vec<S>>,
    {
        let mut slices = strategy(self)?;
        let owner = self.handle();
        for slice in &mut slices {
            slice.contextualize(owner.clone());
        }
        debug!("partitioned {} into {} slices", self.path, slices.len());
        Ok(slices)
    }

    /// Owned snapshot of this reference for backends and slices.
    pub fn handle(&self) -> ObjectHandle {
        ObjectHandle {
            location: self.path.clone(),
            meta_location: self.meta_path.clone(),
            store: Arc::clone(&self.store),
            size: self.obj_meta.present().map(|meta| meta.content_length),
            attributes: self.attributes.clone(),
        }
    }
}

impl fmt::Debug for CloudObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudObject")
            .field("data_type", &self.data_type.name())
            .field("path", &self.path)
            .field("meta_path", &self.meta_path)
            .field("obj_meta", &self.obj_meta)
            .field("meta_meta", &self.meta_meta)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}
