//! Arforge Storage Library
//!
//! Object-storage abstraction and implementations for the arforge pipeline,
//! plus the capability provisioning layer built on top of them.
//!
//! # Storage key format
//!
//! Keys are owner-and-submission scoped. All backends use the same layout:
//!
//! - `{owner}/{submission_id}/{asset}.{ext}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized
//! in the `keys` module so all backends and the pipeline stay consistent.
//! A key always denotes a location; time-limited read/write capabilities are
//! derived from it on demand by the [`Provisioner`] and never persisted.

pub mod factory;
pub mod keys;
pub mod local;
pub mod provision;
pub mod s3;
pub mod traits;

pub use arforge_core::StorageBackend;
pub use factory::create_storage;
pub use keys::asset_key;
pub use local::LocalStorage;
pub use provision::{ProvisionError, Provisioner, RetryPolicy};
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
