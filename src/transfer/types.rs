//! Transfer types for chunked bucket uploads and downloads

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Hard per-call payload ceiling of the bucket: 2MB
pub const MAX_PAYLOAD_SIZE: usize = 2 * 1024 * 1024;

/// Default chunk size: 1.9MB, kept below `MAX_PAYLOAD_SIZE` with some margin
pub const DEFAULT_CHUNK_SIZE: usize = 1_992_294;

/// Default number of attempts per remote operation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff, in milliseconds
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 100;

/// Default number of downloaded files kept in memory
pub const DEFAULT_CACHE_CAPACITY: usize = 20;

/// Length of a SHA-256 digest
pub const DIGEST_LEN: usize = 32;

// ============================================================================
// Digest
// ============================================================================

/// SHA-256 digest of a file or chunk
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64 character hex string
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        Self::from_slice(&bytes)
    }

    /// Build a digest from raw bytes, which must be exactly 32 long
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; DIGEST_LEN] = bytes.try_into().ok()?;
        Some(Self(array))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ============================================================================
// Upload Types
// ============================================================================

/// A file handed to the uploader
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Name the file will be stored under
    pub name: String,

    /// MIME type reported to the bucket
    pub content_type: String,

    /// Complete file contents
    pub data: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }
}

/// Description of a file at upload start. Fixed once its batch exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub content_type: String,
    pub whole_file_hash: Option<Digest>,
    pub size: u64,
}

/// One bounded slice of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// 0-based position in the file
    pub index: usize,
    pub bytes: Vec<u8>,
    pub hash: Digest,
}

/// Batch creation arguments, as sent to the bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchArg {
    /// Whole-file hash
    pub sha256: Option<Digest>,
    pub content_type: String,
    /// Per-chunk hashes, in chunk order
    pub chunks_sha256: Vec<Digest>,
    pub name: String,
}

/// Opaque batch handle returned by the bucket
pub type BatchId = u64;

/// Local view of a batch being filled
///
/// The bucket finalizes a batch on its own once `expected_chunk_count` chunks
/// have arrived, so the uploader keeps its own count to know when that is.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    pub expected_chunk_count: usize,
    pub chunk_hashes: Vec<Digest>,
    pushed: usize,
}

impl Batch {
    pub fn new(id: BatchId, chunk_hashes: Vec<Digest>) -> Self {
        Self {
            id,
            expected_chunk_count: chunk_hashes.len(),
            chunk_hashes,
            pushed: 0,
        }
    }

    /// Index of the next chunk the bucket expects
    pub fn next_index(&self) -> usize {
        self.pushed
    }

    pub fn pushed(&self) -> usize {
        self.pushed
    }

    /// Whether every declared chunk has been accepted
    pub fn is_complete(&self) -> bool {
        self.pushed == self.expected_chunk_count
    }

    /// Record an accepted chunk. Chunks must arrive as 0, 1, 2, ...
    pub fn record_push(&mut self, index: usize) -> Result<(), String> {
        if self.is_complete() {
            return Err(format!(
                "batch {} already received all {} chunks",
                self.id, self.expected_chunk_count
            ));
        }
        if index != self.pushed {
            return Err(format!(
                "batch {} expected chunk {}, got {}",
                self.id, self.pushed, index
            ));
        }
        self.pushed += 1;
        Ok(())
    }
}

/// Upload state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    Validating,
    Hashing,
    BatchCreating,
    ChunkUploading,
    Complete,
    Failed,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Validating)
            | (Validating, Hashing)
            | (Hashing, BatchCreating)
            | (BatchCreating, ChunkUploading)
            | (ChunkUploading, Complete) => true,
            _ => false,
        }
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Name the file was stored under
    pub name: String,
    pub batch_id: BatchId,
    pub chunk_count: usize,
    pub size: u64,
    pub sha256: Option<Digest>,
}

// ============================================================================
// Download Types
// ============================================================================

/// First response of a download: chunk 0 plus file info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetFileResponse {
    pub content: Vec<u8>,
    pub content_type: String,
    pub sha256: Option<Digest>,
    /// Chunks remaining after this one
    pub chunks_left: u64,
    /// Last modification, nanoseconds since the Unix epoch
    pub modified: u64,
}

/// Response for chunks after the first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetChunkResponse {
    pub content: Vec<u8>,
}

/// A downloaded file, reassembled from its chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructedFile {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub sha256: Option<Digest>,
    pub modified: u64,
}

impl ReconstructedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        nanos_to_datetime(self.modified)
    }
}

// ============================================================================
// Inventory Types
// ============================================================================

/// Metadata of a stored file, as reported by `list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    /// Last modification, nanoseconds since the Unix epoch
    pub modified: u64,
    pub sha256: Option<Digest>,
    pub nos_chunks: u64,
}

impl FileInfo {
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        nanos_to_datetime(self.modified)
    }
}

/// Progress callback, receives a percentage in 0..=100
pub type ProgressCallback<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// `round(done / total * 100)`, clamped to 100
pub fn progress_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (done as f64 / total as f64 * 100.0).round();
    pct.min(100.0) as u8
}

fn nanos_to_datetime(nanos: u64) -> Option<DateTime<Utc>> {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    DateTime::from_timestamp(secs, subsec)
}

// ============================================================================
// Tests
// ============================================================================
