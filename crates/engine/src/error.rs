//! Common error values for the engine crate.
//!
//! Engine errors carry a machine-matchable [`ErrorKind`] plus optional
//! free-form context. Leaf-crate errors convert into engine errors with their
//! kind mapped one-to-one, so callers observe a single flat kind set no
//! matter where inside the pipeline a failure originated.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Observable failure kinds.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Unclassified failure.
    Fail,
    /// The addressed file does not exist.
    FileNotFound,
    /// The addressed file exists but could not be opened.
    FailedToOpenFile,
    /// A file stream could not be opened.
    FailedToOpenFileStream,
    /// Reading from a data stream failed.
    FailedToReadFromStream,
    /// Writing to a data stream failed.
    FailedToSaveToStream,
    /// Persisting a file failed.
    FailedToSaveFile,
    /// Gzip coding failed.
    FailedToCompressData,
    /// A checksum could not be produced or did not match.
    FailedToGenerateChecksum,
    /// Chunk reassembly hit an internal inconsistency.
    FailedToRetrieveChunkData,
    /// The chunk stream ended before a payload was complete.
    UnexpectedEndOfChunks,
    /// A rebuilt payload hashed to the wrong checksum.
    UnexpectedChunkChecksumResult,
    /// The scan directory does not exist.
    InputDirectoryDoesntExist,
    /// The file format or format/version combination is not supported.
    UnsupportedFileFormat,
    /// The document violates the resource-group schema.
    MalformedResourceGroup,
    /// A legacy CSV row could not be parsed.
    MalformedResourceInput,
    /// The document is not valid YAML.
    FailedToParseYaml,
    /// The document's group type does not match the importing group.
    FileTypeMismatch,
    /// The document version cannot be handled by this engine.
    DocumentVersionUnsupported,
    /// Chunk sizes must be non-zero.
    InvalidChunkSize,
    /// A resource addressed by relative path is not in the group.
    ResourceNotFound,
    /// The resource list parameter was not supplied.
    ResourceListNotSet,
    /// The resource group parameter was not supplied.
    ResourceGroupNotSet,
    /// A required operation parameter was not supplied.
    RequiredInputParameterNotSet,
    /// The two groups being patched are of different types.
    PatchResourceListMismatch,
    /// The subtraction arrays are inconsistent.
    UnexpectedPatchDiffEncountered,
    /// The binary diff codec failed.
    FailedToCreatePatch,
}

impl ErrorKind {
    fn describe(self) -> &'static str {
        match self {
            Self::Fail => "operation failed",
            Self::FileNotFound => "file not found",
            Self::FailedToOpenFile => "failed to open file",
            Self::FailedToOpenFileStream => "failed to open file stream",
            Self::FailedToReadFromStream => "failed to read from stream",
            Self::FailedToSaveToStream => "failed to save to stream",
            Self::FailedToSaveFile => "failed to save file",
            Self::FailedToCompressData => "failed to compress data",
            Self::FailedToGenerateChecksum => "failed to generate checksum",
            Self::FailedToRetrieveChunkData => "failed to retrieve chunk data",
            Self::UnexpectedEndOfChunks => "unexpected end of chunks",
            Self::UnexpectedChunkChecksumResult => "unexpected chunk checksum result",
            Self::InputDirectoryDoesntExist => "input directory doesn't exist",
            Self::UnsupportedFileFormat => "unsupported file format",
            Self::MalformedResourceGroup => "malformed resource group",
            Self::MalformedResourceInput => "malformed resource input",
            Self::FailedToParseYaml => "failed to parse yaml",
            Self::FileTypeMismatch => "file type mismatch",
            Self::DocumentVersionUnsupported => "document version unsupported",
            Self::InvalidChunkSize => "invalid chunk size",
            Self::ResourceNotFound => "resource not found",
            Self::ResourceListNotSet => "resource list not set",
            Self::ResourceGroupNotSet => "resource group not set",
            Self::RequiredInputParameterNotSet => "required input parameter not set",
            Self::PatchResourceListMismatch => "patch resource list mismatch",
            Self::UnexpectedPatchDiffEncountered => "unexpected patch diff encountered",
            Self::FailedToCreatePatch => "failed to create patch",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// Error value carried out of every engine operation.
#[derive(Debug, Error)]
#[error("{}", self.render())]
pub struct Error {
    kind: ErrorKind,
    info: Option<String>,
}

impl Error {
    /// Creates an error of the given kind without extra context.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, info: None }
    }

    /// Creates an error of the given kind carrying free-form context.
    #[must_use]
    pub fn with_info(kind: ErrorKind, info: impl Into<String>) -> Self {
        Self {
            kind,
            info: Some(info.into()),
        }
    }

    /// Returns the machine-matchable failure kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the free-form context, when present.
    #[must_use]
    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    fn render(&self) -> String {
        match &self.info {
            Some(info) => format!("{}: {info}", self.kind),
            None => self.kind.to_string(),
        }
    }
}

impl From<checksums::ChecksumError> for Error {
    fn from(error: checksums::ChecksumError) -> Self {
        Self::with_info(ErrorKind::FailedToGenerateChecksum, error.to_string())
    }
}

impl From<streams::StreamError> for Error {
    fn from(error: streams::StreamError) -> Self {
        use streams::StreamError;

        let kind = match &error {
            StreamError::FailedToOpen { .. } => ErrorKind::FailedToOpenFileStream,
            StreamError::FailedToRead(_) => ErrorKind::FailedToReadFromStream,
            StreamError::FailedToSave(_) => ErrorKind::FailedToSaveToStream,
            StreamError::FailedToCompress(_) => ErrorKind::FailedToCompressData,
        };
        Self::with_info(kind, error.to_string())
    }
}

impl From<chunker::ChunkError> for Error {
    fn from(error: chunker::ChunkError) -> Self {
        use chunker::ChunkError;

        let kind = match &error {
            ChunkError::InvalidChunkSize => ErrorKind::InvalidChunkSize,
            ChunkError::UnexpectedEndOfChunks => ErrorKind::UnexpectedEndOfChunks,
            ChunkError::FailedToRetrieveChunkData | ChunkError::Io(_) => {
                ErrorKind::FailedToRetrieveChunkData
            }
        };
        Self::with_info(kind, error.to_string())
    }
}

impl From<repository::RepositoryError> for Error {
    fn from(error: repository::RepositoryError) -> Self {
        use repository::RepositoryError;

        match error {
            RepositoryError::FileNotFound { .. } => {
                Self::with_info(ErrorKind::FileNotFound, error.to_string())
            }
            RepositoryError::FailedToOpenFile { .. } | RepositoryError::Fetch { .. } => {
                Self::with_info(ErrorKind::FailedToOpenFile, error.to_string())
            }
            RepositoryError::FailedToSaveFile { .. } => {
                Self::with_info(ErrorKind::FailedToSaveFile, error.to_string())
            }
            RepositoryError::ChecksumMismatch { .. } => {
                Self::with_info(ErrorKind::FailedToGenerateChecksum, error.to_string())
            }
            RepositoryError::FailedToCompress(_) => {
                Self::with_info(ErrorKind::FailedToCompressData, error.to_string())
            }
            RepositoryError::Stream(stream) => stream.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_is_appended_to_the_rendered_message() {
        let error = Error::with_info(ErrorKind::ResourceNotFound, "a/foo.txt");
        assert_eq!(error.kind(), ErrorKind::ResourceNotFound);
        assert_eq!(error.to_string(), "resource not found: a/foo.txt");
    }

    #[test]
    fn stream_errors_map_onto_engine_kinds() {
        let error: Error = streams::StreamError::FailedToRead(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk",
        ))
        .into();
        assert_eq!(error.kind(), ErrorKind::FailedToReadFromStream);
    }

    #[test]
    fn checksum_gate_maps_onto_generate_checksum() {
        let error: Error = repository::RepositoryError::ChecksumMismatch {
            expected: "aa".into(),
            computed: "bb".into(),
        }
        .into();
        assert_eq!(error.kind(), ErrorKind::FailedToGenerateChecksum);
    }
}
