#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use cloud_object::{
    CloudDataType, DiskStore, HeadObject, ObjectMetadata, StoreClient, StoreError, StoreResult,
    config::StoreConfig,
};
use std::{
    collections::{HashMap, HashSet},
    ops::Range,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tempfile::TempDir;

#[derive(Clone)]
struct StoredObject {
    body: Bytes,
    payload: Bytes,
}

/// In-memory store that counts calls, for asserting how often the cache hits
/// the network.
#[derive(Default)]
pub struct CountingStore {
    buckets: Mutex<HashSet<String>>,
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    heads: Mutex<Vec<(String, String)>>,
    uploads: AtomicUsize,
    /// When set, every HEAD fails with this I/O error kind.
    pub fail_heads: Mutex<Option<std::io::ErrorKind>>,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_object(self: Arc<Self>, bucket: &str, key: &str, body: &[u8]) -> Arc<Self> {
        self.insert(bucket, key, Bytes::copy_from_slice(body), Bytes::new());
        self
    }

    pub fn with_companion(self: Arc<Self>, bucket: &str, key: &str, payload: Bytes) -> Arc<Self> {
        self.insert(bucket, key, Bytes::new(), payload);
        self
    }

    fn insert(&self, bucket: &str, key: &str, body: Bytes, payload: Bytes) {
        self.buckets.lock().unwrap().insert(bucket.to_string());
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), StoredObject { body, payload });
    }

    pub fn head_count(&self) -> usize {
        self.heads.lock().unwrap().len()
    }

    pub fn head_count_for(&self, bucket: &str, key: &str) -> usize {
        self.heads
            .lock()
            .unwrap()
            .iter()
            .filter(|(b, k)| b == bucket && k == key)
            .count()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    fn lookup(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn metadata(body: &Bytes) -> ObjectMetadata {
        ObjectMetadata {
            content_length: body.len() as u64,
            content_type: None,
            etag: Some(format!("{:x}", md5::compute(body))),
            last_modified: Utc::now(),
        }
    }
}

#[async_trait]
impl StoreClient for CountingStore {
    async fn head(&self, bucket: &str, key: &str) -> StoreResult<HeadObject> {
        self.heads
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string()));
        if let Some(kind) = *self.fail_heads.lock().unwrap() {
            return Err(StoreError::Io(std::io::Error::new(kind, "injected failure")));
        }
        let object = self.lookup(bucket, key)?;
        Ok(HeadObject {
            metadata: Self::metadata(&object.body),
            payload: object.payload,
        })
    }

    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
    ) -> StoreResult<ObjectMetadata> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let body = Bytes::from(tokio::fs::read(local_path).await?);
        let metadata = Self::metadata(&body);
        self.insert(bucket, key, body, Bytes::new());
        Ok(metadata)
    }

    async fn get_bytes(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        Ok(self.lookup(bucket, key)?.body)
    }

    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>) -> StoreResult<Bytes> {
        let body = self.lookup(bucket, key)?.body;
        let size = body.len() as u64;
        if range.start > range.end || range.end > size {
            return Err(StoreError::InvalidRange {
                start: range.start,
                end: range.end,
                size,
            });
        }
        Ok(body.slice(range.start as usize..range.end as usize))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        payload: Option<Bytes>,
    ) -> StoreResult<ObjectMetadata> {
        let metadata = Self::metadata(&body);
        self.insert(bucket, key, body, payload.unwrap_or_default());
        Ok(metadata)
    }

    async fn create_bucket(&self, name: &str) -> StoreResult<()> {
        if !self.buckets.lock().unwrap().insert(name.to_string()) {
            return Err(StoreError::BucketAlreadyExists(name.to_string()));
        }
        Ok(())
    }
}

pub fn generic_type() -> Arc<CloudDataType> {
    Arc::new(CloudDataType::new("generic"))
}

/// Disk store rooted in a fresh temp directory, with `bucket1` and its
/// companion bucket created.
pub async fn disk_store() -> (TempDir, Arc<DiskStore>) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        storage_dir: dir.path().join("objects").display().to_string(),
        database_url: format!("sqlite://{}", dir.path().join("meta/store.db").display()),
    };
    let store = DiskStore::connect(&config).await.unwrap();
    store.create_bucket("bucket1").await.unwrap();
    store.create_bucket("bucket1.meta").await.unwrap();
    (dir, Arc::new(store))
}
