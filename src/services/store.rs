//! The object-store capability consumed by cloud object references.

use crate::models::object::ObjectMetadata;
use async_trait::async_trait;
use bytes::Bytes;
use std::{io, ops::Range, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("range {start}..{end} out of bounds for object of {size} bytes")]
    InvalidRange { start: u64, end: u64, size: u64 },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    /// True when the addressed object (or its bucket) does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ObjectNotFound { .. } | StoreError::BucketNotFound(_)
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a HEAD lookup: the store-reported fields plus the opaque user
/// metadata payload attached to the object (empty when none was attached).
#[derive(Debug, Clone)]
pub struct HeadObject {
    pub metadata: ObjectMetadata,
    pub payload: Bytes,
}

/// Bucket/key addressed blob storage.
///
/// Implementations own credentials, timeouts and retries; callers treat every
/// method as a single blocking round trip.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn head(&self, bucket: &str, key: &str) -> StoreResult<HeadObject>;

    /// Upload a local file as `bucket/key`, replacing any existing object.
    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
    ) -> StoreResult<ObjectMetadata>;

    async fn get_bytes(&self, bucket: &str, key: &str) -> StoreResult<Bytes>;

    /// Read `range` (end exclusive) of an object.
    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>) -> StoreResult<Bytes>;

    /// Write `body` as `bucket/key`, attaching `payload` as user metadata.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        payload: Option<Bytes>,
    ) -> StoreResult<ObjectMetadata>;

    async fn create_bucket(&self, name: &str) -> StoreResult<()>;
}
