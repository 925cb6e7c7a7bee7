//! Services: the store capability and its disk implementation, the attribute
//! codec, preprocessing contracts and backends, and the cloud object façade.

pub mod attribute_codec;
pub mod cloud_object;
pub mod disk_store;
pub mod local_backend;
pub mod preprocess;
pub mod store;
