//! Logical data types and preprocessor resolution.
//!
//! A `CloudDataType` names a kind of data (CSV, FASTA, ...) and carries the
//! preprocessor used to analyze it. Types form a chain through `parent`, so a
//! specialized type can reuse the preprocessor of the type it derives from.

use crate::{
    errors::{CloudObjectError, Result},
    services::preprocess::PreprocessorHandle,
};
use std::{any::TypeId, fmt, sync::Arc, sync::OnceLock};

/// Handle to the Rust type a data type has been bound to.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BoundClass {
    type_id: TypeId,
    name: &'static str,
}

impl BoundClass {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Debug for BoundClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub struct CloudDataType {
    name: String,
    bound_class: OnceLock<BoundClass>,
    preprocessor: Option<PreprocessorHandle>,
    parent: Option<Arc<CloudDataType>>,
}

impl CloudDataType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound_class: OnceLock::new(),
            preprocessor: None,
            parent: None,
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: PreprocessorHandle) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn inherit_from(mut self, parent: Arc<CloudDataType>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<CloudDataType>> {
        self.parent.as_ref()
    }

    /// Bind `T` as the type implementing this data type.
    ///
    /// A data type can be bound at most once; later attempts fail with
    /// `ClassAlreadyBound`, including attempts to bind the same `T` again.
    pub fn bind<T: 'static>(&self) -> Result<()> {
        let class = BoundClass::of::<T>();
        self.bound_class
            .set(class)
            .map_err(|_| CloudObjectError::ClassAlreadyBound {
                data_type: self.name.clone(),
                bound: self
                    .bound_class
                    .get()
                    .map(|c| c.name().to_string())
                    .unwrap_or_default(),
            })
    }

    pub fn bound_class(&self) -> Option<BoundClass> {
        self.bound_class.get().copied()
    }

    /// Resolve the preprocessor: own first, then up the parent chain.
    pub fn preprocessor(&self) -> Result<&PreprocessorHandle> {
        let mut current = self;
        loop {
            if let Some(preprocessor) = &current.preprocessor {
                return Ok(preprocessor);
            }
            match &current.parent {
                Some(parent) => current = parent.as_ref(),
                None => return Err(CloudObjectError::NoPreprocessor(self.name.clone())),
            }
        }
    }
}

impl fmt::Debug for CloudDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudDataType")
            .field("name", &self.name)
            .field("bound_class", &self.bound_class.get())
            .field("preprocessor", &self.preprocessor)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .finish()
    }
}
