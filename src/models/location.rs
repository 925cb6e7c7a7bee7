//! Addresses an object and its metadata companion in the store.

use crate::errors::{CloudObjectError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix appended to a bucket name to form its metadata companion bucket.
pub const META_BUCKET_SUFFIX: &str = ".meta";

/// Scheme used when rendering a location back into a URI.
pub const DEFAULT_SCHEME: &str = "s3";

/// A `{bucket, key}` pair. Immutable once constructed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    bucket: String,
    key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `scheme://bucket/key`.
    ///
    /// The bucket is the first path segment and the key is the remainder, which
    /// may itself contain `/`. Both must be non-empty.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let malformed = || CloudObjectError::MalformedUri(uri.to_string());

        let (scheme, rest) = uri.split_once("://").ok_or_else(malformed)?;
        if !is_valid_scheme(scheme) {
            return Err(malformed());
        }

        let (bucket, key) = rest.split_once('/').ok_or_else(malformed)?;
        if bucket.is_empty() || key.is_empty() {
            return Err(malformed());
        }

        Ok(Self::new(bucket, key))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Location of the metadata companion: same key, suffixed bucket.
    pub fn metadata_location(&self) -> Self {
        Self::new(format!("{}{}", self.bucket, META_BUCKET_SUFFIX), &self.key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", DEFAULT_SCHEME, self.bucket, self.key)
    }
}

/// RFC 3986 scheme: a letter followed by letters, digits, `+`, `-` or `.`.
fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
