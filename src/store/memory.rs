//! In-process bucket
//!
//! Holds files in memory and enforces the same batch protocol a remote
//! bucket does: bounded payloads, chunks pushed in declared order with
//! matching hashes, and files published only once every chunk has arrived.
//! Every call is recorded so callers can inspect what was sent.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::BucketStore;
use crate::error::StoreError;
use crate::transfer::hasher::compute_hash;
use crate::transfer::types::{
    BatchArg, BatchId, Digest, FileInfo, GetChunkResponse, GetFileResponse, MAX_PAYLOAD_SIZE,
};

/// A call received by the bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateBatch { name: String, chunk_count: usize },
    UploadChunk { batch_id: BatchId, len: usize },
    Get { file_name: String },
    GetChunk { file_name: String, index: u64 },
    List,
    IsUserRegistered,
}

#[derive(Debug, Clone)]
struct StoredFile {
    content_type: String,
    sha256: Option<Digest>,
    chunks: Vec<Vec<u8>>,
    modified: u64,
}

impl StoredFile {
    fn size(&self) -> u64 {
        self.chunks.iter().map(|c| c.len() as u64).sum()
    }
}

#[derive(Debug)]
struct PendingBatch {
    arg: BatchArg,
    chunks: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct MemoryState {
    files: BTreeMap<String, StoredFile>,
    batches: HashMap<BatchId, PendingBatch>,
    next_batch_id: BatchId,
    registered: bool,
    calls: Vec<StoreCall>,
}

/// In-memory bucket implementation
#[derive(Clone)]
pub struct MemoryBucketStore {
    inner: Arc<Mutex<MemoryState>>,
    max_payload: usize,
}

impl Default for MemoryBucketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBucketStore {
    /// Create an empty bucket with the caller registered
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    /// Create an empty bucket with a custom per-call payload ceiling
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryState {
                files: BTreeMap::new(),
                batches: HashMap::new(),
                next_batch_id: 1,
                registered: true,
                calls: Vec::new(),
            })),
            max_payload,
        }
    }

    pub fn set_registered(&self, registered: bool) {
        self.inner.lock().registered = registered;
    }

    /// Calls received so far, oldest first
    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Batches created but not yet complete
    pub fn open_batches(&self) -> usize {
        self.inner.lock().batches.len()
    }

    /// Complete contents of a stored file
    pub fn file_bytes(&self, file_name: &str) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .files
            .get(file_name)
            .map(|file| file.chunks.concat())
    }

    /// Store a file directly, split into `chunk_size` pieces
    pub fn insert_file(
        &self,
        file_name: &str,
        content_type: &str,
        data: &[u8],
        chunk_size: usize,
    ) {
        let chunks: Vec<Vec<u8>> = if data.is_empty() || chunk_size == 0 {
            vec![data.to_vec()]
        } else {
            data.chunks(chunk_size).map(<[u8]>::to_vec).collect()
        };

        let file = StoredFile {
            content_type: content_type.to_string(),
            sha256: Some(compute_hash(data)),
            chunks,
            modified: now_nanos(),
        };
        self.inner.lock().files.insert(file_name.to_string(), file);
    }

    fn missing(file_name: &str) -> StoreError {
        StoreError::NotFound(format!("file {}", file_name))
    }
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn create_batch(&self, arg: BatchArg) -> Result<BatchId, StoreError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::CreateBatch {
            name: arg.name.clone(),
            chunk_count: arg.chunks_sha256.len(),
        });

        if arg.name.is_empty() {
            return Err(StoreError::Rejected("file name must not be empty".to_string()));
        }
        if arg.chunks_sha256.is_empty() {
            return Err(StoreError::Rejected("batch must declare at least one chunk".to_string()));
        }

        let id = state.next_batch_id;
        state.next_batch_id += 1;
        state.batches.insert(
            id,
            PendingBatch {
                arg,
                chunks: Vec::new(),
            },
        );

        Ok(id)
    }

    async fn upload_chunk(&self, batch_id: BatchId, chunk: &[u8]) -> Result<(), StoreError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::UploadChunk {
            batch_id,
            len: chunk.len(),
        });

        if chunk.len() > self.max_payload {
            return Err(StoreError::PayloadTooLarge {
                size: chunk.len(),
                max: self.max_payload,
            });
        }

        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| StoreError::Rejected(format!("unknown batch {}", batch_id)))?;

        let index = batch.chunks.len();
        let expected = batch.arg.chunks_sha256.get(index).ok_or_else(|| {
            StoreError::Rejected(format!("batch {} already has all its chunks", batch_id))
        })?;

        if compute_hash(chunk) != *expected {
            return Err(StoreError::Rejected(format!(
                "chunk {} of batch {} does not match its declared hash",
                index, batch_id
            )));
        }

        batch.chunks.push(chunk.to_vec());

        if batch.chunks.len() == batch.arg.chunks_sha256.len() {
            if let Some(done) = state.batches.remove(&batch_id) {
                let name = done.arg.name.clone();
                state.files.insert(
                    name,
                    StoredFile {
                        content_type: done.arg.content_type,
                        sha256: done.arg.sha256,
                        chunks: done.chunks,
                        modified: now_nanos(),
                    },
                );
            }
        }

        Ok(())
    }

    async fn get(&self, file_name: &str) -> Result<GetFileResponse, StoreError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::Get {
            file_name: file_name.to_string(),
        });

        let file = state
            .files
            .get(file_name)
            .ok_or_else(|| Self::missing(file_name))?;

        Ok(GetFileResponse {
            content: file.chunks.first().cloned().unwrap_or_default(),
            content_type: file.content_type.clone(),
            sha256: file.sha256,
            chunks_left: file.chunks.len().saturating_sub(1) as u64,
            modified: file.modified,
        })
    }

    async fn get_chunk(&self, file_name: &str, index: u64) -> Result<GetChunkResponse, StoreError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::GetChunk {
            file_name: file_name.to_string(),
            index,
        });

        let file = state
            .files
            .get(file_name)
            .ok_or_else(|| Self::missing(file_name))?;

        let content = file
            .chunks
            .get(index as usize)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("chunk {} of {}", index, file_name)))?;

        Ok(GetChunkResponse { content })
    }

    async fn list(&self) -> Result<Vec<FileInfo>, StoreError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::List);

        Ok(state
            .files
            .iter()
            .map(|(name, file)| FileInfo {
                file_name: name.clone(),
                content_type: file.content_type.clone(),
                size: file.size(),
                modified: file.modified,
                sha256: file.sha256,
                nos_chunks: file.chunks.len() as u64,
            })
            .collect())
    }

    async fn is_user_registered(&self) -> Result<bool, StoreError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::IsUserRegistered);
        Ok(state.registered)
    }
}

fn now_nanos() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .map(|n| n.max(0) as u64)
        .unwrap_or_default()
}
