//! Outbound chunker: slices a logical byte stream into fixed-size chunks.

use std::fs;
use std::path::{Path, PathBuf};

use crate::ChunkError;

/// One staged chunk, materialised as two files in the work directory.
///
/// The raw artifact is what gets hashed and published to local destinations;
/// the gzip artifact is what remote CDNs serve. Both files are overwritten by
/// the next pull, so callers consume a staged chunk before pulling again.
#[derive(Clone, Debug)]
pub struct StagedChunk {
    /// Path of the raw chunk payload.
    pub uncompressed: PathBuf,
    /// Path of the gzip-compressed counterpart.
    pub compressed: PathBuf,
    /// Raw payload length in bytes.
    pub uncompressed_len: u64,
    /// Compressed payload length in bytes.
    pub compressed_len: u64,
}

/// Accumulates pushed resource bytes and emits fixed-size chunk payloads.
///
/// Pulling with `clear_cache = false` yields `None` once fewer than a full
/// chunk remains; pulling with `clear_cache = true` drains the remainder as
/// one short tail chunk.
#[derive(Debug)]
pub struct ChunkStreamOut {
    chunk_size: usize,
    work_dir: PathBuf,
    cache: Vec<u8>,
}

impl ChunkStreamOut {
    /// Creates a chunker staging its artifacts inside `work_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::InvalidChunkSize`] for a zero chunk size and
    /// propagates failures while creating the work directory.
    pub fn new(chunk_size: u64, work_dir: &Path) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidChunkSize);
        }
        fs::create_dir_all(work_dir)?;
        let chunk_size =
            usize::try_from(chunk_size).map_err(|_| ChunkError::InvalidChunkSize)?;
        Ok(Self {
            chunk_size,
            work_dir: work_dir.to_path_buf(),
            cache: Vec::new(),
        })
    }

    /// Chunk size this stream was configured with.
    #[must_use]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size as u64
    }

    /// Number of bytes currently cached.
    #[must_use]
    pub fn cached(&self) -> u64 {
        self.cache.len() as u64
    }

    /// Appends resource bytes to the logical stream.
    pub fn push(&mut self, data: &[u8]) {
        self.cache.extend_from_slice(data);
    }

    /// Emits the next chunk, staging both artifacts in the work directory.
    ///
    /// With `clear_cache = false` only full chunks are emitted; `Ok(None)`
    /// signals that the caller should push more data. With
    /// `clear_cache = true` the remaining cache is emitted as a short tail
    /// chunk, and `Ok(None)` signals that the stream is fully drained.
    ///
    /// # Errors
    ///
    /// Propagates staging I/O failures.
    pub fn pull(&mut self, clear_cache: bool) -> Result<Option<StagedChunk>, ChunkError> {
        let len = if self.cache.len() >= self.chunk_size {
            self.chunk_size
        } else if clear_cache && !self.cache.is_empty() {
            self.cache.len()
        } else {
            return Ok(None);
        };

        let payload: Vec<u8> = self.cache.drain(..len).collect();
        let uncompressed = self.work_dir.join("staged.chunk");
        let compressed = self.work_dir.join("staged.chunk.gz");
        fs::write(&uncompressed, &payload)?;
        let gz = compress::compress_to_vec(&payload)?;
        fs::write(&compressed, &gz)?;
        tracing::trace!(len, compressed = gz.len(), "staged chunk");

        Ok(Some(StagedChunk {
            uncompressed,
            compressed,
            uncompressed_len: payload.len() as u64,
            compressed_len: gz.len() as u64,
        }))
    }
}
