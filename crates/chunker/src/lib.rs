#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Chunking primitives for the bundle and patch pipelines.
//!
//! Bundling concatenates every resource payload of a group into one logical
//! stream and slices it into fixed-size chunks, the unit of CDN distribution.
//! [`ChunkStreamOut`] performs the slicing and stages each chunk twice (raw
//! and gzip-compressed) so the caller can publish whichever artifact the
//! destination type requires. [`ChunkStreamIn`] is the inverse: chunk
//! payloads go in, exact-length resource payloads come out.
//!
//! Patching needs to know where a window of the new file occurs inside the
//! old one. [`ChunkIndex`] fingerprints the old file in non-overlapping
//! windows, keeps the offset lists on disk sharded by fingerprint prefix, and
//! answers lookups with byte-verified offsets. [`count_matching_chunks`]
//! extends a confirmed match into a run of consecutive equal windows.

mod index;
mod stream_in;
mod stream_out;

use std::io;

use thiserror::Error;

pub use index::{count_matching_chunks, ChunkIndex};
pub use stream_in::ChunkStreamIn;
pub use stream_out::{ChunkStreamOut, StagedChunk};

/// Errors produced by the chunking primitives.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Chunk size must be non-zero.
    #[error("invalid chunk size")]
    InvalidChunkSize,
    /// More data was requested than the remaining chunks can supply.
    #[error("unexpected end of chunks")]
    UnexpectedEndOfChunks,
    /// Internal inconsistency while assembling chunk data.
    #[error("failed to retrieve chunk data")]
    FailedToRetrieveChunkData,
    /// Staging or index I/O failed.
    #[error("chunk I/O failed")]
    Io(#[from] io::Error),
}
