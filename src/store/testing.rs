//! Fault injection around a bucket, for unit tests

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BucketStore, MemoryBucketStore};
use crate::error::StoreError;
use crate::transfer::types::{BatchArg, BatchId, FileInfo, GetChunkResponse, GetFileResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateBatch,
    UploadChunk,
    Get,
    GetChunk,
    List,
    IsUserRegistered,
}

/// Wraps a `MemoryBucketStore`, failing the next N calls of chosen operations
pub struct FlakyStore {
    pub inner: MemoryBucketStore,
    failures: Mutex<HashMap<Op, (u32, StoreError)>>,
    attempts: Mutex<HashMap<Op, u32>>,
    delay: Option<Duration>,
}

impl FlakyStore {
    pub fn new(inner: MemoryBucketStore) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            delay: None,
        }
    }

    /// Delay every call, so it really suspends
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `count` calls of `op` with a transport error
    pub fn fail_next(&self, op: Op, count: u32) {
        self.fail_next_with(op, count, StoreError::Transport("injected failure".to_string()));
    }

    pub fn fail_next_with(&self, op: Op, count: u32, error: StoreError) {
        self.failures.lock().insert(op, (count, error));
    }

    /// Calls made to `op`, failed ones included
    pub fn attempts(&self, op: Op) -> u32 {
        self.attempts.lock().get(&op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: Op) -> Result<(), StoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        *self.attempts.lock().entry(op).or_insert(0) += 1;

        let mut failures = self.failures.lock();
        if let Some((remaining, error)) = failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(error.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BucketStore for FlakyStore {
    async fn create_batch(&self, arg: BatchArg) -> Result<BatchId, StoreError> {
        self.enter(Op::CreateBatch).await?;
        self.inner.create_batch(arg).await
    }

    async fn upload_chunk(&self, batch_id: BatchId, chunk: &[u8]) -> Result<(), StoreError> {
        self.enter(Op::UploadChunk).await?;
        self.inner.upload_chunk(batch_id, chunk).await
    }

    async fn get(&self, file_name: &str) -> Result<GetFileResponse, StoreError> {
        self.enter(Op::Get).await?;
        self.inner.get(file_name).await
    }

    async fn get_chunk(&self, file_name: &str, index: u64) -> Result<GetChunkResponse, StoreError> {
        self.enter(Op::GetChunk).await?;
        self.inner.get_chunk(file_name, index).await
    }

    async fn list(&self) -> Result<Vec<FileInfo>, StoreError> {
        self.enter(Op::List).await?;
        self.inner.list().await
    }

    async fn is_user_registered(&self) -> Result<bool, StoreError> {
        self.enter(Op::IsUserRegistered).await?;
        self.inner.is_user_registered().await
    }
}
