//! Bucket access
//!
//! The bucket is the remote object store files are chunked into. Everything
//! the transfer layer needs from it goes through `BucketStore`.

pub mod http;
pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::transfer::types::{BatchArg, BatchId, FileInfo, GetChunkResponse, GetFileResponse};

pub use http::HttpBucketStore;
pub use memory::{MemoryBucketStore, StoreCall};

/// Operations exposed by a file store bucket
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Open a batch for a new file. Returns the batch handle chunks are pushed to.
    async fn create_batch(&self, arg: BatchArg) -> Result<BatchId, StoreError>;

    /// Push the next chunk of a batch. Chunks must be sent in index order.
    async fn upload_chunk(&self, batch_id: BatchId, chunk: &[u8]) -> Result<(), StoreError>;

    /// Fetch chunk 0 of a file along with its metadata
    async fn get(&self, file_name: &str) -> Result<GetFileResponse, StoreError>;

    /// Fetch a later chunk of a file (`index` >= 1)
    async fn get_chunk(&self, file_name: &str, index: u64) -> Result<GetChunkResponse, StoreError>;

    /// List every stored file
    async fn list(&self) -> Result<Vec<FileInfo>, StoreError>;

    /// Whether the current caller may upload
    async fn is_user_registered(&self) -> Result<bool, StoreError>;
}
