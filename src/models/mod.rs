//! Core data models for cloud objects.
//!
//! Row types (`Bucket`, `Object`) map to database tables via `sqlx::FromRow`;
//! the rest describe how a cloud object is addressed, typed, and partitioned.

pub mod attributes;
pub mod bucket;
pub mod data_type;
pub mod location;
pub mod object;
pub mod slice;
