//! File store service
//!
//! Entry point for callers: owns the bucket handle, the download cache and
//! the transfer settings, and exposes upload, download, inventory and cache
//! management on top of them.

use std::path::Path;
use std::sync::Arc;

use super::cache::{CacheStats, FileCache};
use super::download::DownloadReconstructor;
use super::registration::RegistrationGate;
use super::retry::{retry, RetryPolicy};
use super::types::{FileInfo, FileUpload, ProgressCallback, ReconstructedFile, UploadReceipt};
use super::upload::UploadCoordinator;
use crate::config::TransferConfig;
use crate::error::{Result, TransferError};
use crate::store::BucketStore;

/// Chunked file transfers against one bucket
#[derive(Clone)]
pub struct FileStoreService {
    inner: Arc<FileStoreServiceInner>,
}

struct FileStoreServiceInner {
    store: Arc<dyn BucketStore>,
    uploader: UploadCoordinator,
    downloader: DownloadReconstructor,
    gate: RegistrationGate,
    cache: FileCache,
    retry: RetryPolicy,
}

impl FileStoreService {
    /// Create a service with default settings
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self::build(store, &TransferConfig::default())
    }

    /// Create a service from validated settings
    pub fn with_config(store: Arc<dyn BucketStore>, config: &TransferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(store, config))
    }

    fn build(store: Arc<dyn BucketStore>, config: &TransferConfig) -> Self {
        let retry = config.retry_policy();
        Self {
            inner: Arc::new(FileStoreServiceInner {
                uploader: UploadCoordinator::new(store.clone())
                    .with_chunk_size(config.chunk_size)
                    .with_retry_policy(retry),
                downloader: DownloadReconstructor::new(store.clone())
                    .with_retry_policy(retry)
                    .with_verification(config.verify_downloads),
                gate: RegistrationGate::new(store.clone()),
                cache: FileCache::new(config.cache_capacity),
                store,
                retry,
            }),
        }
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Upload a file held in memory
    pub async fn upload_file(
        &self,
        file: FileUpload,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<UploadReceipt> {
        self.inner.uploader.upload(file, on_progress).await
    }

    /// Upload a file from disk
    pub async fn upload_path(
        &self,
        path: &Path,
        name: Option<&str>,
        content_type: Option<&str>,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<UploadReceipt> {
        self.inner
            .uploader
            .upload_path(path, name, content_type, on_progress)
            .await
    }

    /// Download a file, serving it from the cache when possible
    pub async fn download_file(
        &self,
        file_name: &str,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<Arc<ReconstructedFile>> {
        if let Some(file) = self.inner.cache.get(file_name) {
            tracing::debug!(file_name = %file_name, "Serving download from cache");
            if let Some(callback) = on_progress {
                callback(100);
            }
            return Ok(file);
        }

        let file = self.inner.downloader.download(file_name, on_progress).await?;
        Ok(self.inner.cache.set(file_name, file))
    }

    // ========================================================================
    // Inventory
    // ========================================================================

    /// Metadata of one stored file, without downloading it
    pub async fn file_info(&self, file_name: &str) -> Result<FileInfo> {
        self.list_files()
            .await?
            .into_iter()
            .find(|info| info.file_name == file_name)
            .ok_or_else(|| TransferError::FileNotFound(file_name.to_string()))
    }

    /// Metadata of every stored file
    pub async fn list_files(&self) -> Result<Vec<FileInfo>> {
        retry(&self.inner.retry, "Failed to list files", || self.inner.store.list())
            .await
            .map_err(TransferError::ListFailed)
    }

    /// Whether the current caller may upload
    pub async fn check_user_registration(&self) -> bool {
        self.inner.gate.is_registered().await
    }

    // ========================================================================
    // Cache Management
    // ========================================================================

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Drop one file from the cache. Returns whether it was cached.
    pub fn remove_from_cache(&self, file_name: &str) -> bool {
        self.inner.cache.delete(file_name)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }
}

// ============================================================================
// Tests
// ============================================================================
