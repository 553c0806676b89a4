//! Chunked Transfer Module
//!
//! Moves files of any size through a bucket that only accepts bounded
//! payloads per call:
//! - Fixed-size chunking with SHA-256 hashes per chunk and per file
//! - Batch upload with chunks pushed strictly in order
//! - Sequential download and reassembly with integrity check
//! - Bounded retry with exponential backoff around every remote call
//! - LRU cache of downloaded files
//!
//! Upload Flow:
//! 1. Check the caller is registered with the bucket
//! 2. Split the file into chunks and hash file and chunks
//! 3. Create a batch declaring the chunk hashes
//! 4. Push chunks 0..n; the bucket completes the file after the last one
//!
//! Download Flow:
//! 1. Serve from cache if present
//! 2. `get` returns chunk 0 and the number of chunks left
//! 3. `get_chunk` 1..=chunks_left, in order
//! 4. Reassemble, verify, cache

pub mod cache;
pub mod chunker;
pub mod download;
pub mod hasher;
pub mod registration;
pub mod retry;
pub mod service;
pub mod types;
pub mod upload;

pub use cache::{CacheStats, FileCache};
pub use chunker::{chunk_count, read_chunks, split_into_chunks};
pub use download::DownloadReconstructor;
pub use hasher::{compute_hash, verify_hash};
pub use registration::RegistrationGate;
pub use retry::{retry, retry_if, RetryError, RetryPolicy};
pub use service::FileStoreService;
pub use types::*;
pub use upload::UploadCoordinator;
