//! src/services/disk_store.rs
//!
//! DiskStore: a `StoreClient` backed by SQLite for bucket/object metadata and
//! local disk for object payloads sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`.

use crate::{
    config::StoreConfig,
    models::{
        bucket::Bucket,
        object::{Object, ObjectMetadata},
    },
    services::store::{HeadObject, StoreClient, StoreError, StoreResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut, stream};
use md5::Context;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    io::{self, ErrorKind, SeekFrom},
    ops::Range,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");
const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// DiskStore provides the object-store operations cloud objects rely on:
/// - HEAD (metadata row plus attached user metadata)
/// - upload from a local file or an in-memory body
/// - whole-object and ranged reads
/// - bucket creation
#[derive(Clone)]
pub struct DiskStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl DiskStore {
    /// Create a new DiskStore backed by the provided SQLite pool and using
    /// `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Open the database named by `config` (creating it if missing), make sure
    /// the storage directory exists, and apply the schema.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        fs::create_dir_all(&config.storage_dir).await?;

        let options =
            SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        debug!("Connecting to {}", config.database_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::new(Arc::new(pool), &config.storage_dir);
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the embedded schema. Statements are idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = MIGRATION_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects keys that begin with `/` or have a `..` path segment.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StoreError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
            return Err(StoreError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StoreError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Read-side key check: a key that could never have been written is
    /// reported as missing.
    fn ensure_key_readable(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.ensure_key_safe(key).map_err(|_| StoreError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    pub fn validate_bucket_name(name: &str) -> StoreResult<()> {
        let invalid = |reason: &str| StoreError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        };

        if name.len() < BUCKET_NAME_MIN_LEN || name.len() > BUCKET_NAME_MAX_LEN {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }

        if name.starts_with('.')
            || name.ends_with('.')
            || name.starts_with('-')
            || name.ends_with('-')
        {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }

        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }

        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard identifiers for an object key: the first two bytes of
    /// MD5(bucket/key) as lowercase hex.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Combines base_path/bucket/{shard}/{shard}/{key}.
    /// Parent directories may not exist yet.
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Look up a bucket row. A name that could never have been created is
    /// reported as missing.
    async fn fetch_bucket(&self, bucket: &str) -> StoreResult<Bucket> {
        if Self::validate_bucket_name(bucket).is_err() {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }
        sqlx::query_as::<_, Bucket>("SELECT id, name, created_at FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StoreError::BucketNotFound(bucket.to_string()),
                other => StoreError::Sqlx(other),
            })
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StoreResult<Object> {
        sqlx::query_as::<_, Object>(
            "SELECT id, bucket_id, key, content_type, size_bytes, etag,
                    last_modified, user_metadata
             FROM objects
             WHERE key = ? AND bucket_id = ?",
        )
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StoreError::Sqlx(other),
        })
    }

    /// Stream-upload an object to disk and update metadata.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5/etag and size while streaming.
    /// - Atomically renames into final location.
    /// - Upserts the metadata row (overwrite semantics), replacing any user
    ///   metadata with `user_metadata`.
    pub async fn upload_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        user_metadata: Option<Bytes>,
        stream: S,
    ) -> StoreResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        let last_modified = Utc::now();
        let etag = format!("{:x}", digest.compute());

        let insert_result = sqlx::query_as::<_, Object>(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes,
                etag, last_modified, user_metadata
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified,
                user_metadata = excluded.user_metadata
            RETURNING id, bucket_id, key, content_type, size_bytes,
                      etag, last_modified, user_metadata
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(last_modified)
        .bind(user_metadata.map(|m| m.to_vec()))
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => {
                debug!("stored {}/{} ({} bytes, etag {})", bucket, key, size_bytes, etag);
                Ok(obj)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    /// Fetch an object for reading.
    ///
    /// Returns metadata and an opened File handle. Returns ObjectNotFound if
    /// metadata exists but the physical file is missing.
    pub async fn get_object_reader(&self, bucket: &str, key: &str) -> StoreResult<(Object, File)> {
        self.ensure_key_readable(bucket, key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StoreError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    /// Fetch only object metadata.
    pub async fn get_object_metadata(&self, bucket: &str, key: &str) -> StoreResult<Object> {
        self.ensure_key_readable(bucket, key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        self.fetch_object(&bucket_rec, key).await
    }

    /// Create a bucket and initialize its directory.
    ///
    /// Returns BucketAlreadyExists if name conflict occurs.
    pub async fn create_bucket(&self, name: &str) -> StoreResult<Bucket> {
        Self::validate_bucket_name(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;

        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        match sqlx::query("INSERT INTO buckets (id, name, created_at) VALUES (?, ?, ?)")
            .bind(bucket.id)
            .bind(&bucket.name)
            .bind(bucket.created_at)
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(bucket),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }
}

#[async_trait]
impl StoreClient for DiskStore {
    async fn head(&self, bucket: &str, key: &str) -> StoreResult<HeadObject> {
        let object = self.get_object_metadata(bucket, key).await?;
        Ok(HeadObject {
            metadata: ObjectMetadata::from(&object),
            payload: object.user_metadata.map(Bytes::from).unwrap_or_default(),
        })
    }

    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
    ) -> StoreResult<ObjectMetadata> {
        let file = File::open(local_path).await?;
        let object = self
            .upload_object_stream(bucket, key, None, None, ReaderStream::new(file))
            .await?;
        Ok(ObjectMetadata::from(&object))
    }

    async fn get_bytes(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        let (object, mut file) = self.get_object_reader(bucket, key).await?;
        let mut buf = Vec::with_capacity(usize::try_from(object.size_bytes).unwrap_or_default());
        file.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>) -> StoreResult<Bytes> {
        let (object, mut file) = self.get_object_reader(bucket, key).await?;
        let size = u64::try_from(object.size_bytes).unwrap_or_default();
        if range.start > range.end || range.end > size {
            return Err(StoreError::InvalidRange {
                start: range.start,
                end: range.end,
                size,
            });
        }

        let len = usize::try_from(range.end - range.start).map_err(io::Error::other)?;
        let mut buf = vec![0u8; len];
        file.seek(SeekFrom::Start(range.start)).await?;
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        payload: Option<Bytes>,
    ) -> StoreResult<ObjectMetadata> {
        let body = stream::once(async move { Ok::<_, io::Error>(body) });
        let object = self
            .upload_object_stream(bucket, key, None, payload, body)
            .await?;
        Ok(ObjectMetadata::from(&object))
    }

    async fn create_bucket(&self, name: &str) -> StoreResult<()> {
        DiskStore::create_bucket(self, name).await.map(|_| ())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|segment| {
        !segment.is_empty()
            && segment.len() <= 3
            && segment.chars().all(|c| c.is_ascii_digit())
            && segment.parse::<u8>().is_ok()
    })
}
