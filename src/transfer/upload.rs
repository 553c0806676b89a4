//! Upload coordinator
//!
//! Drives one upload through
//! `Idle -> Validating -> Hashing -> BatchCreating -> ChunkUploading -> Complete`,
//! dropping to `Failed` on the first unrecoverable error. Batch creation and
//! each chunk push are retried on their own; chunks go out strictly in index
//! order. A failed upload leaves its batch behind for the bucket to deal with.

use std::path::Path;
use std::sync::Arc;

use super::chunker::{read_chunks, split_into_chunks};
use super::hasher::{hash_chunked_file, hash_file_and_chunks};
use super::registration::RegistrationGate;
use super::retry::{retry_if, RetryPolicy};
use super::types::{
    progress_percent, Batch, BatchArg, ChunkDescriptor, FileDescriptor, FileUpload,
    ProgressCallback, UploadReceipt, UploadState, DEFAULT_CHUNK_SIZE,
};
use crate::error::{Result, StoreError, TransferError};
use crate::store::BucketStore;

/// Uploads files to a bucket in chunks
#[derive(Clone)]
pub struct UploadCoordinator {
    store: Arc<dyn BucketStore>,
    gate: RegistrationGate,
    chunk_size: usize,
    retry: RetryPolicy,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        let gate = RegistrationGate::new(store.clone());
        Self {
            store,
            gate,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Upload a file held in memory
    pub async fn upload(
        &self,
        file: FileUpload,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<UploadReceipt> {
        let FileUpload {
            name,
            content_type,
            data,
        } = file;
        self.execute(name, content_type, UploadSource::Memory(data), on_progress)
            .await
    }

    /// Upload a file from disk, reading it chunk by chunk
    ///
    /// `name` defaults to the file's own name and `content_type` is guessed
    /// from its extension when not given.
    pub async fn upload_path(
        &self,
        path: &Path,
        name: Option<&str>,
        content_type: Option<&str>,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<UploadReceipt> {
        let (name, content_type, file) = open_upload(path, name, content_type).await?;
        self.execute(name, content_type, UploadSource::File(file), on_progress)
            .await
    }

    async fn execute(
        &self,
        name: String,
        content_type: String,
        source: UploadSource,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<UploadReceipt> {
        let mut run = UploadRun::new(&name);
        let result = self
            .drive(&mut run, name, content_type, source, on_progress)
            .await;

        match &result {
            Ok(receipt) => {
                tracing::info!(
                    file_name = %receipt.name,
                    batch_id = receipt.batch_id,
                    chunks = receipt.chunk_count,
                    size = receipt.size,
                    "Upload complete"
                );
            }
            Err(e) => {
                tracing::warn!(
                    file_name = %run.file_name,
                    failed_in = ?run.state,
                    error = %e,
                    "Upload failed"
                );
                run.advance(UploadState::Failed);
            }
        }

        result
    }

    async fn drive(
        &self,
        run: &mut UploadRun,
        name: String,
        content_type: String,
        source: UploadSource,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<UploadReceipt> {
        run.advance(UploadState::Validating);
        if name.trim().is_empty() {
            return Err(TransferError::InvalidFile(
                "file name must not be empty".to_string(),
            ));
        }
        if !self.gate.is_registered().await {
            return Err(TransferError::UserNotRegistered);
        }

        run.advance(UploadState::Hashing);
        let (file_hash, chunks) = match source {
            UploadSource::Memory(data) => {
                let chunks = split_into_chunks(&data, self.chunk_size)?;
                hash_file_and_chunks(Arc::new(data), chunks).await?
            }
            UploadSource::File(file) => {
                let chunks = read_chunks(file, self.chunk_size).await?;
                hash_chunked_file(chunks).await?
            }
        };

        let descriptor = FileDescriptor {
            name,
            content_type,
            whole_file_hash: Some(file_hash),
            size: chunks.iter().map(|c| c.bytes.len() as u64).sum(),
        };

        run.advance(UploadState::BatchCreating);
        let total_steps = 1 + chunks.len();
        let mut completed = 0;

        let arg = BatchArg {
            sha256: descriptor.whole_file_hash,
            content_type: descriptor.content_type.clone(),
            chunks_sha256: chunks.iter().map(|c| c.hash).collect(),
            name: descriptor.name.clone(),
        };
        let batch_id = retry_if(
            &self.retry,
            "Failed to create batch",
            || self.store.create_batch(arg.clone()),
            StoreError::is_transient,
        )
        .await
        .map_err(TransferError::UploadFailed)?;

        let mut batch = Batch::new(batch_id, arg.chunks_sha256);
        completed += 1;
        report(on_progress, completed, total_steps);

        tracing::debug!(
            file_name = %descriptor.name,
            batch_id,
            chunks = batch.expected_chunk_count,
            "Created upload batch"
        );

        run.advance(UploadState::ChunkUploading);
        self.push_chunks(&mut batch, &chunks, |pushed| {
            report(on_progress, completed + pushed, total_steps);
        })
        .await?;

        if !batch.is_complete() {
            return Err(TransferError::ProtocolViolation(format!(
                "batch {} accepted {} of {} chunks",
                batch.id,
                batch.pushed(),
                batch.expected_chunk_count
            )));
        }

        run.advance(UploadState::Complete);
        Ok(UploadReceipt {
            name: descriptor.name,
            batch_id,
            chunk_count: batch.expected_chunk_count,
            size: descriptor.size,
            sha256: descriptor.whole_file_hash,
        })
    }

    async fn push_chunks<F>(
        &self,
        batch: &mut Batch,
        chunks: &[ChunkDescriptor],
        mut on_pushed: F,
    ) -> Result<()>
    where
        F: FnMut(usize),
    {
        for chunk in chunks {
            let expected = batch.chunk_hashes.get(chunk.index);
            if chunk.index != batch.next_index() || expected != Some(&chunk.hash) {
                return Err(TransferError::ProtocolViolation(format!(
                    "chunk {} does not match what batch {} declared next",
                    chunk.index, batch.id
                )));
            }

            let batch_id = batch.id;
            retry_if(
                &self.retry,
                "Failed to upload chunk",
                || self.store.upload_chunk(batch_id, &chunk.bytes),
                StoreError::is_transient,
            )
            .await
            .map_err(TransferError::UploadFailed)?;

            batch
                .record_push(chunk.index)
                .map_err(TransferError::ProtocolViolation)?;

            tracing::debug!(
                batch_id,
                chunk_index = chunk.index,
                size = chunk.bytes.len(),
                "Uploaded chunk"
            );
            on_pushed(batch.pushed());
        }

        Ok(())
    }
}

/// State of one upload in flight
struct UploadRun {
    file_name: String,
    state: UploadState,
}

impl UploadRun {
    fn new(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            state: UploadState::Idle,
        }
    }

    fn advance(&mut self, next: UploadState) {
        if !self.state.can_transition_to(next) {
            debug_assert!(false, "illegal upload transition {:?} -> {:?}", self.state, next);
            tracing::error!(
                file_name = %self.file_name,
                from = ?self.state,
                to = ?next,
                "Ignoring illegal upload transition"
            );
            return;
        }
        tracing::trace!(
            file_name = %self.file_name,
            from = ?self.state,
            to = ?next,
            "Upload state"
        );
        self.state = next;
    }
}

fn report(on_progress: Option<ProgressCallback<'_>>, done: usize, total: usize) {
    if let Some(callback) = on_progress {
        callback(progress_percent(done, total));
    }
}

/// Where the bytes of an upload come from
enum UploadSource {
    Memory(Vec<u8>),
    File(tokio::fs::File),
}

/// Open a file for upload, resolving its stored name and content type
async fn open_upload(
    path: &Path,
    name: Option<&str>,
    content_type: Option<&str>,
) -> Result<(String, String, tokio::fs::File)> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| TransferError::InvalidFile(format!("{}: {}", path.display(), e)))?;
    if !metadata.is_file() {
        return Err(TransferError::InvalidFile(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    let name = match name {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TransferError::InvalidFile(format!("{} has no file name", path.display()))
            })?,
    };

    let content_type = content_type.map(str::to_string).unwrap_or_else(|| {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });

    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| TransferError::ChunkingFailed(format!("{}: {}", path.display(), e)))?;

    Ok((name, content_type, file))
}

// ============================================================================
// Tests
// ============================================================================
