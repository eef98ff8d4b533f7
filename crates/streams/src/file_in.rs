//! Bounded-buffer sequential file reader.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::{DataReader, StreamError};

/// Sequential reader over a file that yields chunks of at most the configured
/// buffer size.
///
/// The reader remembers its path so callers can rebuild an index over the same
/// file or restart the stream after exhausting it, which the patch engine does
/// when a chunk match moves the read point backwards.
#[derive(Debug)]
pub struct FileStreamIn {
    path: PathBuf,
    file: File,
    size: u64,
    position: u64,
    buffer_size: usize,
}

impl FileStreamIn {
    /// Opens `path` for sequential reading with the given buffer size.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::FailedToOpen`] when the file cannot be opened
    /// or its length cannot be determined.
    pub fn open(path: &Path, buffer_size: usize) -> Result<Self, StreamError> {
        let open_error = |source| StreamError::FailedToOpen {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(open_error)?;
        let size = file.metadata().map_err(open_error)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
            position: 0,
            buffer_size: buffer_size.max(1),
        })
    }

    /// Returns the path backing this stream.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads exactly `len` bytes starting at `offset`, clamped to the file
    /// end, without disturbing the sequential position.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::FailedToRead`] when the positioned read fails.
    pub fn read_window(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, StreamError> {
        if offset >= self.size {
            return Ok(Vec::new());
        }
        let available = usize::try_from((self.size - offset).min(len as u64))
            .map_err(|_| StreamError::FailedToRead(overflow_error()))?;
        let sequential = self.position;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(StreamError::FailedToRead)?;
        let mut window = vec![0u8; available];
        let result = self.file.read_exact(&mut window);
        self.file
            .seek(SeekFrom::Start(sequential))
            .map_err(StreamError::FailedToRead)?;
        result.map_err(StreamError::FailedToRead)?;
        Ok(window)
    }
}

fn overflow_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, "window length overflow")
}

impl DataReader for FileStreamIn {
    fn pull(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        if self.is_finished() {
            return Ok(None);
        }
        let remaining = self.size - self.position;
        let len = usize::try_from(remaining.min(self.buffer_size as u64))
            .map_err(|_| StreamError::FailedToRead(overflow_error()))?;
        let mut chunk = vec![0u8; len];
        self.file
            .read_exact(&mut chunk)
            .map_err(StreamError::FailedToRead)?;
        self.position += len as u64;
        Ok(Some(chunk))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, offset: u64) -> Result<(), StreamError> {
        let clamped = offset.min(self.size);
        self.file
            .seek(SeekFrom::Start(clamped))
            .map_err(StreamError::FailedToRead)?;
        self.position = clamped;
        Ok(())
    }

    fn restart(&mut self) -> Result<(), StreamError> {
        self.seek(0)
    }

    fn is_finished(&self) -> bool {
        self.position >= self.size
    }
}
