#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Bounded-buffer sequential streams over files. Resource payloads can exceed
//! available memory, so every long operation in the engine moves bytes through
//! the two capabilities defined here instead of materialising files:
//!
//! - [`DataReader`] pulls byte chunks no larger than the configured buffer
//!   size and exposes `size`/`position`/`seek`/`restart` so the patch engine
//!   can walk a file in windows and revisit earlier regions.
//! - [`DataWriter`] pushes byte chunks and requires an explicit `finish`;
//!   the compressed variant buffers a gzip member, and skipping `finish`
//!   would lose the trailer.
//!
//! [`FileStreamIn`], [`FileStreamOut`], and [`CompressedFileStreamOut`] are
//! the file-backed implementations used throughout the workspace.

mod error;
mod file_in;
mod file_out;

pub use error::StreamError;
pub use file_in::FileStreamIn;
pub use file_out::{CompressedFileStreamOut, FileStreamOut};

/// Capability for pulling bounded byte chunks from a sequential source.
pub trait DataReader {
    /// Pulls the next chunk, or `None` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::FailedToRead`] when the underlying source
    /// fails.
    fn pull(&mut self) -> Result<Option<Vec<u8>>, StreamError>;

    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// Current read position in bytes.
    fn position(&self) -> u64;

    /// Moves the read position to `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::FailedToRead`] when the seek fails.
    fn seek(&mut self, offset: u64) -> Result<(), StreamError>;

    /// Rewinds the stream to the beginning.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::FailedToRead`] when the rewind fails.
    fn restart(&mut self) -> Result<(), StreamError>;

    /// Reports whether the read position has reached the end of the source.
    fn is_finished(&self) -> bool;
}

/// Capability for pushing byte chunks into a sequential sink.
pub trait DataWriter {
    /// Appends `data` to the sink.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::FailedToSave`] or
    /// [`StreamError::FailedToCompress`] when the sink fails.
    fn push(&mut self, data: &[u8]) -> Result<(), StreamError>;

    /// Flushes the sink, including any buffered trailer bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::FailedToSave`] or
    /// [`StreamError::FailedToCompress`] when flushing fails.
    fn finish(&mut self) -> Result<(), StreamError>;
}
