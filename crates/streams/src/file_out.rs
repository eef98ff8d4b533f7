//! File-backed write streams.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use compress::GzipStreamOut;

use crate::{DataWriter, StreamError};

/// Buffered sequential writer over a file.
#[derive(Debug)]
pub struct FileStreamOut {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl FileStreamOut {
    /// Creates (or truncates) `path` for writing.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::FailedToOpen`] when the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, StreamError> {
        let file = File::create(path).map_err(|source| StreamError::FailedToOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    /// Returns the path backing this stream.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of uncompressed bytes pushed so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl DataWriter for FileStreamOut {
    fn push(&mut self, data: &[u8]) -> Result<(), StreamError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| StreamError::FailedToSave(closed_error()))?;
        writer.write_all(data).map_err(StreamError::FailedToSave)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StreamError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(StreamError::FailedToSave)?;
        }
        Ok(())
    }
}

impl Drop for FileStreamOut {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

/// Transparent gzip wrapper over [`FileStreamOut`].
///
/// Pushed bytes are compressed before reaching the file; `finish` must run or
/// the trailing compressed bytes are lost and the member is undecodable.
pub struct CompressedFileStreamOut {
    path: PathBuf,
    encoder: Option<GzipStreamOut<BufWriter<File>>>,
    written: u64,
    compressed: u64,
}

impl CompressedFileStreamOut {
    /// Creates (or truncates) `path` and starts a gzip member in it.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::FailedToOpen`] when the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, StreamError> {
        let file = File::create(path).map_err(|source| StreamError::FailedToOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            encoder: Some(GzipStreamOut::new(BufWriter::new(file))),
            written: 0,
            compressed: 0,
        })
    }

    /// Returns the path backing this stream.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of uncompressed bytes pushed so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Number of compressed bytes emitted; only final after `finish`.
    #[must_use]
    pub fn compressed(&self) -> u64 {
        self.compressed
    }
}

impl DataWriter for CompressedFileStreamOut {
    fn push(&mut self, data: &[u8]) -> Result<(), StreamError> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| StreamError::FailedToCompress(closed_error()))?;
        encoder.push(data).map_err(StreamError::FailedToCompress)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StreamError> {
        if let Some(mut encoder) = self.encoder.take() {
            let (mut writer, compressed) =
                encoder.finish().map_err(StreamError::FailedToCompress)?;
            writer.flush().map_err(StreamError::FailedToSave)?;
            self.compressed = compressed;
        }
        Ok(())
    }
}

fn closed_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stream already finished")
}
