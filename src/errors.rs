//! Error taxonomy for cloud object references.
//!
//! Every failure is surfaced to the immediate caller with a specific kind.
//! Store transport errors pass through untouched; only the store's not-found
//! signal is translated into cache state by the reference itself.

use crate::{models::location::ObjectLocation, services::store::StoreError};
use std::fmt;
use thiserror::Error;

/// Which cache slot of a reference a lookup was resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSlot {
    /// The primary object.
    Object,
    /// The metadata companion object.
    Companion,
}

impl fmt::Display for CacheSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheSlot::Object => write!(f, "object"),
            CacheSlot::Companion => write!(f, "metadata companion"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CloudObjectError {
    #[error("malformed object URI `{0}`, expected scheme://bucket/key")]
    MalformedUri(String),
    #[error("{slot} `{location}` not found")]
    NotFound {
        slot: CacheSlot,
        location: ObjectLocation,
    },
    #[error("object `{0}` already exists")]
    AlreadyExists(ObjectLocation),
    #[error("object `{0}` is already preprocessed")]
    AlreadyPreprocessed(ObjectLocation),
    #[error("data type `{0}` cannot be preprocessed")]
    NotPreprocessable(String),
    #[error("no preprocessor configured for data type `{0}`")]
    NoPreprocessor(String),
    #[error("data type `{data_type}` is already bound to `{bound}`")]
    ClassAlreadyBound { data_type: String, bound: String },
    #[error("corrupt attributes payload: {0}")]
    CorruptAttributes(String),
    #[error("attribute `{0}` not found")]
    AttributeNotFound(String),
    #[error("attribute `{name}` has an unexpected type: {source}")]
    AttributeType {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("slice is not bound to a cloud object")]
    SliceNotContextualized,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Preprocessing(#[from] anyhow::Error),
}

impl CloudObjectError {
    /// True for the enforced-fetch absence signal of either slot.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudObjectError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, CloudObjectError>;
