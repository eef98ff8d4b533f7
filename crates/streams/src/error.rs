//! Error values shared by the stream implementations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by file-backed data streams.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Opening the backing file failed.
    #[error("failed to open file stream for {path}")]
    FailedToOpen {
        /// Path that could not be opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Reading from the stream failed.
    #[error("failed to read from stream")]
    FailedToRead(#[source] io::Error),
    /// Writing to the stream failed.
    #[error("failed to save to stream")]
    FailedToSave(#[source] io::Error),
    /// The gzip encoder rejected data or failed to finalise.
    #[error("failed to compress data")]
    FailedToCompress(#[source] io::Error),
}
