#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Storage access for manifest resources. Every resource is reachable through
//! one of three addressing schemes:
//!
//! - `LOCAL_RELATIVE` — a plain file at `base ⌿ relativePath`;
//! - `LOCAL_CDN` — an uncompressed file at `base ⌿ shard ⌿ location`;
//! - `REMOTE_CDN` — a gzip-encoded object at `base / shard / location`,
//!   fetched through a pluggable [`Fetch`] implementation with
//!   exponential-backoff retries.
//!
//! The `shard` is the first two characters of the [`Location`] content
//! address, which itself is derived from the prefixed relative path and the
//! content checksum. Reads can demand an expected checksum; the repository
//! verifies it after any transit decompression and rejects mismatches.

mod fetch;
mod location;
mod store;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use fetch::{fetch_with_retry, Fetch};
pub use location::{manifest_path, Location};
pub use store::{
    destination_path, get_data, get_data_stream, open_reader, open_writer, put_data,
    source_path, GetParams, ResourceDestination, ResourceSource, ResourceStream,
};

/// Errors produced by repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The addressed file does not exist.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was probed.
        path: PathBuf,
    },
    /// The addressed file exists but could not be opened or read.
    #[error("failed to open file: {path}")]
    FailedToOpenFile {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Writing the destination file failed.
    #[error("failed to save file: {path}")]
    FailedToSaveFile {
        /// Path that failed to persist.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Retrieved content does not hash to the expected checksum.
    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        /// Checksum the caller demanded.
        expected: String,
        /// Checksum of the bytes actually retrieved.
        computed: String,
    },
    /// Gzip transit coding failed.
    #[error("failed to compress data")]
    FailedToCompress(#[source] io::Error),
    /// The remote fetch failed after exhausting retries.
    #[error("fetch failed for {url}")]
    Fetch {
        /// URL that was requested.
        url: String,
        /// Final fetch error.
        #[source]
        source: io::Error,
    },
    /// A stream-backed transfer failed.
    #[error(transparent)]
    Stream(#[from] streams::StreamError),
}
