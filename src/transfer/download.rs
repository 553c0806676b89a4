//! Download reconstruction
//!
//! `get` returns chunk 0 with the file's metadata and how many chunks are
//! left; the rest are fetched one by one as `get_chunk(name, 1..=chunks_left)`
//! and appended in that order.

use std::sync::Arc;

use super::hasher::compute_hash;
use super::retry::{retry_if, RetryPolicy};
use super::types::{progress_percent, ProgressCallback, ReconstructedFile};
use crate::error::{Result, StoreError, TransferError};
use crate::store::BucketStore;

/// Fetches files from a bucket and reassembles them
#[derive(Clone)]
pub struct DownloadReconstructor {
    store: Arc<dyn BucketStore>,
    retry: RetryPolicy,
    verify: bool,
}

impl DownloadReconstructor {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            verify: true,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check reassembled bytes against the whole-file hash the bucket reports
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub async fn download(
        &self,
        file_name: &str,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<ReconstructedFile> {
        let first = retry_if(
            &self.retry,
            "Failed to get file info",
            || self.store.get(file_name),
            StoreError::is_transient,
        )
        .await
        .map_err(|e| download_error(file_name, e))?;

        let chunks_left = first.chunks_left;
        let total_chunks = chunks_left
            .checked_add(1)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                TransferError::ProtocolViolation(format!(
                    "bucket reported {} chunks left for {}",
                    chunks_left, file_name
                ))
            })?;
        let mut fetched = 1;
        report(on_progress, fetched, total_chunks);

        let mut data = first.content;
        for index in 1..=chunks_left {
            let label = format!("Failed to get chunk {}", index);
            let chunk = retry_if(
                &self.retry,
                &label,
                || self.store.get_chunk(file_name, index),
                StoreError::is_transient,
            )
            .await
            .map_err(|e| download_error(file_name, e))?;

            tracing::debug!(
                file_name = %file_name,
                chunk_index = index,
                size = chunk.content.len(),
                "Fetched chunk"
            );

            data.extend_from_slice(&chunk.content);
            fetched += 1;
            report(on_progress, fetched, total_chunks);
        }

        if self.verify {
            if let Some(expected) = first.sha256 {
                let actual = compute_hash(&data);
                if actual != expected {
                    return Err(TransferError::IntegrityMismatch {
                        file_name: file_name.to_string(),
                        expected: expected.to_hex(),
                        actual: actual.to_hex(),
                    });
                }
            }
        }

        tracing::info!(
            file_name = %file_name,
            chunks = total_chunks,
            size = data.len(),
            "Download complete"
        );

        Ok(ReconstructedFile {
            name: file_name.to_string(),
            content_type: first.content_type,
            data,
            sha256: first.sha256,
            modified: first.modified,
        })
    }
}

fn download_error(file_name: &str, err: super::retry::RetryError<StoreError>) -> TransferError {
    if err.source.is_not_found() {
        TransferError::FileNotFound(file_name.to_string())
    } else {
        TransferError::DownloadFailed(err)
    }
}

fn report(on_progress: Option<ProgressCallback<'_>>, done: usize, total: usize) {
    if let Some(callback) = on_progress {
        callback(progress_percent(done, total));
    }
}

// ============================================================================
// Tests
// ============================================================================
