//! SHA-256 hashing for whole files and chunks

use std::sync::Arc;

use futures::future::try_join_all;
use sha2::{Digest as _, Sha256};

use super::types::{ChunkDescriptor, Digest, DIGEST_LEN};
use crate::error::{Result, TransferError};

/// Compute the SHA-256 digest of a buffer
pub fn compute_hash(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    finish(hasher)
}

fn finish(hasher: Sha256) -> Digest {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    Digest(out)
}

/// Verify that a buffer hashes to `expected`
pub fn verify_hash(data: &[u8], expected: &Digest) -> bool {
    compute_hash(data) == *expected
}

/// Hash a whole file on the blocking pool
pub async fn hash_file(data: Arc<Vec<u8>>) -> Result<Digest> {
    tokio::task::spawn_blocking(move || compute_hash(&data))
        .await
        .map_err(|e| TransferError::HashCalculationFailed(e.to_string()))
}

/// Hash every chunk concurrently, keeping each hash with its chunk index
pub async fn hash_chunks(chunks: Vec<Vec<u8>>) -> Result<Vec<ChunkDescriptor>> {
    let tasks = chunks.into_iter().enumerate().map(|(index, bytes)| async move {
        tokio::task::spawn_blocking(move || {
            let hash = compute_hash(&bytes);
            ChunkDescriptor { index, bytes, hash }
        })
        .await
        .map_err(|e| TransferError::HashCalculationFailed(format!("chunk {}: {}", index, e)))
    });

    // try_join_all yields results in input order, whatever order tasks finish in
    try_join_all(tasks).await
}

/// Hash the whole file and its chunks at the same time
pub async fn hash_file_and_chunks(
    data: Arc<Vec<u8>>,
    chunks: Vec<Vec<u8>>,
) -> Result<(Digest, Vec<ChunkDescriptor>)> {
    futures::try_join!(hash_file(data), hash_chunks(chunks))
}

/// Hash chunks read from a stream, then the whole file over them in order
pub async fn hash_chunked_file(chunks: Vec<Vec<u8>>) -> Result<(Digest, Vec<ChunkDescriptor>)> {
    let described = hash_chunks(chunks).await?;

    tokio::task::spawn_blocking(move || {
        let mut hasher = Sha256::new();
        for chunk in &described {
            hasher.update(&chunk.bytes);
        }
        (finish(hasher), described)
    })
    .await
    .map_err(|e| TransferError::HashCalculationFailed(e.to_string()))
}
