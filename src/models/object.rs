//! Represents an object (blob) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A stored object row as persisted by the disk store.
///
/// Holds metadata only; payload bytes live on disk.
#[derive(Clone, FromRow, Debug)]
pub struct Object {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload, hex encoded.
    pub etag: Option<String>,

    /// Timestamp when object was last modified.
    pub last_modified: DateTime<Utc>,

    /// Opaque user metadata carried alongside the object and returned by HEAD.
    pub user_metadata: Option<Vec<u8>>,
}

/// Store-reported fields for an object, as returned by a HEAD lookup.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_length: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl From<&Object> for ObjectMetadata {
    fn from(obj: &Object) -> Self {
        Self {
            content_length: u64::try_from(obj.size_bytes).unwrap_or_default(),
            content_type: obj.content_type.clone(),
            etag: obj.etag.clone(),
            last_modified: obj.last_modified,
        }
    }
}
