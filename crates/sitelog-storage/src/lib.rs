//! Sitelog Storage Library
//!
//! This crate provides the [`ObjectStoreClient`] used to attach documents to
//! records, and the [`Storage`] trait its backends implement (S3 and an
//! in-process store for development and tests).
//!
//! # Object key format
//!
//! - First upload: `{owner_record_id}/{filename}`
//! - Replacement: `{owner_record_id}/{stem}~{revision}.{ext}`
//!
//! Owner ids and filenames are sanitized before use. Key generation lives in the
//! `keys` module so every code path derives keys the same way.

pub mod client;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-memory")]
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod signing;
pub mod traits;

// Re-export commonly used types
pub use client::{DocumentLimits, ObjectStoreClient};
pub use factory::create_storage;
#[cfg(feature = "storage-memory")]
pub use memory::{MemoryStorage, StorageFault};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use signing::{GrantRejection, GrantSigner};
pub use sitelog_core::StorageBackend;
pub use traits::{ObjectInfo, Storage, StorageError, StorageResult};
