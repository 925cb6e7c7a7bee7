//! Partitions of a cloud object.

use crate::{
    errors::{CloudObjectError, Result},
    services::preprocess::ObjectHandle,
};
use bytes::Bytes;

/// A partition produced by a partitioning strategy.
///
/// Slices are descriptors only until `contextualize` binds them to the object
/// they were cut from; `CloudObject::partition` does this before handing them
/// out.
pub trait CloudObjectSlice {
    fn contextualize(&mut self, owner: ObjectHandle);

    fn owner(&self) -> Option<&ObjectHandle>;
}

/// A `[range_0, range_1)` byte range of the owning object.
#[derive(Debug, Clone)]
pub struct ByteRangeSlice {
    pub range_0: u64,
    pub range_1: u64,
    owner: Option<ObjectHandle>,
}

impl ByteRangeSlice {
    pub fn new(range_0: u64, range_1: u64) -> Self {
        Self {
            range_0,
            range_1,
            owner: None,
        }
    }

    pub fn len(&self) -> u64 {
        self.range_1.saturating_sub(self.range_0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read this slice's bytes through the owner's store.
    pub async fn get(&self) -> Result<Bytes> {
        let owner = self
            .owner
            .as_ref()
            .ok_or(CloudObjectError::SliceNotContextualized)?;
        let location = owner.location();
        let bytes = owner
            .store()
            .get_range(location.bucket(), location.key(), self.range_0..self.range_1)
            .await?;
        Ok(bytes)
    }
}

impl CloudObjectSlice for ByteRangeSlice {
    fn contextualize(&mut self, owner: ObjectHandle) {
        self.owner = Some(owner);
    }

    fn owner(&self) -> Option<&ObjectHandle> {
        self.owner.as_ref()
    }
}
