//! Cloud objects: immutable blobs in an object store paired with a metadata
//! companion holding attributes derived by a one-time preprocessing pass.
//!
//! ```text
//! s3://bucket/key        primary object
//! s3://bucket.meta/key   metadata companion (attributes payload + optional body)
//! ```
//!
//! [`CloudObject`] caches HEAD lookups for both, decodes the companion into
//! [`Attributes`], runs the data type's preprocessor on a
//! [`PreprocessorBackend`] when asked, and binds partitioning output to itself.

pub mod config;
pub mod errors;
pub mod models;
pub mod services;

pub use errors::{CacheSlot, CloudObjectError, Result};
pub use models::{
    attributes::Attributes,
    data_type::{BoundClass, CloudDataType},
    location::{META_BUCKET_SUFFIX, ObjectLocation},
    object::ObjectMetadata,
    slice::{ByteRangeSlice, CloudObjectSlice},
};
pub use services::{
    cloud_object::CloudObject,
    disk_store::DiskStore,
    local_backend::{LocalBackend, LocalBackendConfig},
    preprocess::{
        BatchPreprocessor, MapReducePreprocessor, MapTask, ObjectHandle, PreprocessingMetadata,
        PreprocessorBackend, PreprocessorHandle,
    },
    store::{HeadObject, StoreClient, StoreError, StoreResult},
};
