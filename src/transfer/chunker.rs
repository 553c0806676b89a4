//! Fixed-size chunking
//!
//! Every chunk except the last is exactly `chunk_size` bytes. A file no
//! larger than `chunk_size` is one chunk, and an empty file is one empty
//! chunk, so every upload declares at least one chunk to the bucket.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Result, TransferError};

/// Number of chunks a file of `size` bytes is split into
pub fn chunk_count(size: u64, chunk_size: usize) -> usize {
    if size == 0 || chunk_size == 0 {
        return 1;
    }
    size.div_ceil(chunk_size as u64) as usize
}

/// Split an in-memory buffer into owned chunks
pub fn split_into_chunks(data: &[u8], chunk_size: usize) -> Result<Vec<Vec<u8>>> {
    check_chunk_size(chunk_size)?;

    if data.len() <= chunk_size {
        return Ok(vec![data.to_vec()]);
    }

    Ok(data.chunks(chunk_size).map(<[u8]>::to_vec).collect())
}

/// Read a source to the end, splitting it into chunks as it goes
pub async fn read_chunks<R>(mut reader: R, chunk_size: usize) -> Result<Vec<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    check_chunk_size(chunk_size)?;

    let mut chunks = Vec::new();
    loop {
        let mut chunk = Vec::with_capacity(chunk_size);
        let mut limited = (&mut reader).take(chunk_size as u64);
        let read = limited
            .read_to_end(&mut chunk)
            .await
            .map_err(|e| TransferError::ChunkingFailed(e.to_string()))?;

        if read == 0 {
            break;
        }
        let full = read == chunk_size;
        chunks.push(chunk);
        if !full {
            break;
        }
    }

    if chunks.is_empty() {
        chunks.push(Vec::new());
    }

    Ok(chunks)
}

fn check_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(TransferError::ChunkingFailed(
            "chunk size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
