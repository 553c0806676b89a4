//! Bucket Transfer Library
//!
//! Client-side chunked uploads and downloads for object store buckets that
//! cap the size of a single call.
//!
//! # Modules
//!
//! - `transfer`: chunking, hashing, retry, upload/download flows and cache
//! - `store`: the `BucketStore` interface plus in-memory and HTTP buckets
//! - `config`: environment-driven settings
//! - `error`: store and transfer error types

pub mod config;
pub mod error;
pub mod store;
pub mod transfer;

pub use config::{BucketConfig, Config, TransferConfig};
pub use error::{Result, StoreError, TransferError};
pub use store::{BucketStore, HttpBucketStore, MemoryBucketStore};
pub use transfer::{FileStoreService, FileUpload, ReconstructedFile, UploadReceipt};
