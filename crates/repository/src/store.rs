//! Byte movement between manifests and the three storage kinds.

use std::fs;
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use checksums::md5_hex;
use compress::{compress_to_vec, decompress_to_vec};
use streams::{CompressedFileStreamOut, DataReader, DataWriter, FileStreamIn, FileStreamOut};

use crate::fetch::{fetch_with_retry, Fetch};
use crate::location::Location;
use crate::RepositoryError;

/// Where resource bytes are read from.
#[derive(Clone)]
pub enum ResourceSource {
    /// Plain files under a base directory, addressed by relative path.
    LocalRelative {
        /// Base directory of the tree.
        base: PathBuf,
    },
    /// Uncompressed content-addressed files under `base/shard/location`.
    LocalCdn {
        /// Base directory of the CDN layout.
        base: PathBuf,
    },
    /// Gzip-encoded objects served from `base_url/shard/location`.
    RemoteCdn {
        /// Base URL of the CDN.
        base_url: String,
        /// Transport used to download objects.
        fetcher: Rc<dyn Fetch>,
    },
}

impl std::fmt::Debug for ResourceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalRelative { base } => {
                f.debug_struct("LocalRelative").field("base", base).finish()
            }
            Self::LocalCdn { base } => f.debug_struct("LocalCdn").field("base", base).finish(),
            Self::RemoteCdn { base_url, .. } => f
                .debug_struct("RemoteCdn")
                .field("base_url", base_url)
                .finish_non_exhaustive(),
        }
    }
}

/// Where resource bytes are written to.
///
/// The remote kind mirrors the source addressing but targets a local staging
/// tree: objects destined for a remote CDN are written gzip-encoded under
/// `base/shard/location`, ready for upload.
#[derive(Clone, Debug)]
pub enum ResourceDestination {
    /// Plain files under a base directory, addressed by relative path.
    LocalRelative {
        /// Base directory of the tree.
        base: PathBuf,
    },
    /// Uncompressed content-addressed files under `base/shard/location`.
    LocalCdn {
        /// Base directory of the CDN layout.
        base: PathBuf,
    },
    /// Gzip-encoded content-addressed files under `base/shard/location`.
    RemoteCdn {
        /// Base directory of the staging tree.
        base: PathBuf,
    },
}

/// Parameters of a repository read.
#[derive(Debug)]
pub struct GetParams<'a> {
    /// Addressing scheme and its base.
    pub source: &'a ResourceSource,
    /// Relative path of the resource within its group.
    pub relative_path: &'a Path,
    /// Content address of the resource payload.
    pub location: &'a Location,
    /// Checksum the retrieved bytes must hash to, when known.
    pub expected_checksum: Option<&'a str>,
    /// Retry budget for remote fetches, in seconds.
    pub download_retry_secs: u64,
}

/// Resolves the filesystem path of a locally addressed resource.
///
/// Remote sources have no filesystem path and yield `None`.
#[must_use]
pub fn source_path(
    source: &ResourceSource,
    relative_path: &Path,
    location: &Location,
) -> Option<PathBuf> {
    match source {
        ResourceSource::LocalRelative { base } => Some(base.join(relative_path)),
        ResourceSource::LocalCdn { base } => {
            Some(base.join(location.shard()).join(location.as_str()))
        }
        ResourceSource::RemoteCdn { .. } => None,
    }
}

/// Resolves the filesystem path a destination write lands at.
#[must_use]
pub fn destination_path(
    destination: &ResourceDestination,
    relative_path: &Path,
    location: &Location,
) -> PathBuf {
    match destination {
        ResourceDestination::LocalRelative { base } => base.join(relative_path),
        ResourceDestination::LocalCdn { base } | ResourceDestination::RemoteCdn { base } => {
            base.join(location.shard()).join(location.as_str())
        }
    }
}

fn remote_url(base_url: &str, location: &Location) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        location.shard(),
        location.as_str()
    )
}

fn read_local(path: &Path) -> Result<Vec<u8>, RepositoryError> {
    fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            RepositoryError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            RepositoryError::FailedToOpenFile {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

fn verify_checksum(data: &[u8], expected: Option<&str>) -> Result<(), RepositoryError> {
    let Some(expected) = expected.filter(|checksum| !checksum.is_empty()) else {
        return Ok(());
    };
    let computed = md5_hex(data);
    if computed == expected {
        Ok(())
    } else {
        Err(RepositoryError::ChecksumMismatch {
            expected: expected.to_owned(),
            computed,
        })
    }
}

/// Reads a resource payload into memory.
///
/// Remote payloads are decompressed after download. When an expected checksum
/// is supplied the bytes are verified after any decompression.
///
/// # Errors
///
/// Returns the addressing, transport, codec, or checksum failure encountered.
pub fn get_data(params: &GetParams<'_>) -> Result<Vec<u8>, RepositoryError> {
    let data = match params.source {
        ResourceSource::LocalRelative { .. } | ResourceSource::LocalCdn { .. } => {
            let path = source_path(params.source, params.relative_path, params.location)
                .expect("local sources always resolve to a path");
            read_local(&path)?
        }
        ResourceSource::RemoteCdn { base_url, fetcher } => {
            let url = remote_url(base_url, params.location);
            let body = fetch_with_retry(fetcher.as_ref(), &url, params.download_retry_secs)
                .map_err(|source| RepositoryError::Fetch { url, source })?;
            decompress_to_vec(&body).map_err(RepositoryError::FailedToCompress)?
        }
    };
    verify_checksum(&data, params.expected_checksum)?;
    Ok(data)
}

/// Writes a resource payload to its destination path, creating shard
/// directories as needed. Remote-bound payloads are gzip-compressed.
///
/// # Errors
///
/// Returns [`RepositoryError::FailedToSaveFile`] or
/// [`RepositoryError::FailedToCompress`] on failure.
pub fn put_data(
    destination: &ResourceDestination,
    relative_path: &Path,
    location: &Location,
    data: &[u8],
) -> Result<PathBuf, RepositoryError> {
    let path = destination_path(destination, relative_path, location);
    let save_error = |source| RepositoryError::FailedToSaveFile {
        path: path.clone(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(save_error)?;
    }
    match destination {
        ResourceDestination::RemoteCdn { .. } => {
            let compressed = compress_to_vec(data).map_err(RepositoryError::FailedToCompress)?;
            fs::write(&path, compressed).map_err(save_error)?;
        }
        _ => fs::write(&path, data).map_err(save_error)?,
    }
    tracing::debug!(path = %path.display(), bytes = data.len(), "stored resource");
    Ok(path)
}

/// A seekable reader over a resource, spilled through a temp file when the
/// source is remote.
pub struct ResourceStream {
    stream: FileStreamIn,
    _spill: Option<tempfile::TempPath>,
}

impl Deref for ResourceStream {
    type Target = FileStreamIn;

    fn deref(&self) -> &Self::Target {
        &self.stream
    }
}

impl DerefMut for ResourceStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.stream
    }
}

/// Opens a bounded-buffer reader over a resource payload.
///
/// Local sources stream straight from the addressed file. Remote sources are
/// downloaded, checksum-verified, and spilled to a temporary file so the
/// caller can seek and restart like any local stream.
///
/// # Errors
///
/// Returns the addressing, transport, codec, or checksum failure encountered.
pub fn open_reader(
    params: &GetParams<'_>,
    buffer_size: usize,
) -> Result<ResourceStream, RepositoryError> {
    match params.source {
        ResourceSource::LocalRelative { .. } | ResourceSource::LocalCdn { .. } => {
            let path = source_path(params.source, params.relative_path, params.location)
                .expect("local sources always resolve to a path");
            if !path.exists() {
                return Err(RepositoryError::FileNotFound { path });
            }
            Ok(ResourceStream {
                stream: FileStreamIn::open(&path, buffer_size)?,
                _spill: None,
            })
        }
        ResourceSource::RemoteCdn { .. } => {
            let data = get_data(params)?;
            let mut spill = tempfile::NamedTempFile::new().map_err(|source| {
                RepositoryError::FailedToSaveFile {
                    path: std::env::temp_dir(),
                    source,
                }
            })?;
            spill
                .write_all(&data)
                .map_err(|source| RepositoryError::FailedToSaveFile {
                    path: spill.path().to_path_buf(),
                    source,
                })?;
            let spill = spill.into_temp_path();
            let stream = FileStreamIn::open(&spill, buffer_size)?;
            Ok(ResourceStream {
                stream,
                _spill: Some(spill),
            })
        }
    }
}

/// Opens a destination-appropriate write stream for a resource payload.
///
/// Remote-bound destinations compress transparently; the caller pushes
/// uncompressed bytes either way and must call `finish`.
///
/// # Errors
///
/// Returns [`RepositoryError::FailedToSaveFile`] when the destination file
/// cannot be created.
pub fn open_writer(
    destination: &ResourceDestination,
    relative_path: &Path,
    location: &Location,
) -> Result<Box<dyn DataWriter>, RepositoryError> {
    let path = destination_path(destination, relative_path, location);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| RepositoryError::FailedToSaveFile {
            path: path.clone(),
            source,
        })?;
    }
    let writer: Box<dyn DataWriter> = match destination {
        ResourceDestination::RemoteCdn { .. } => {
            Box::new(CompressedFileStreamOut::create(&path)?)
        }
        _ => Box::new(FileStreamOut::create(&path)?),
    };
    Ok(writer)
}

/// Streams a resource payload into a caller-supplied writer without
/// materialising it, verifying the checksum along the way.
///
/// The writer is finished on success.
///
/// # Errors
///
/// Returns the read, checksum, or write failure encountered.
pub fn get_data_stream(
    params: &GetParams<'_>,
    writer: &mut dyn DataWriter,
) -> Result<(), RepositoryError> {
    let mut reader = open_reader(params, 64 * 1024)?;
    let mut hasher = checksums::Md5Stream::new();
    while let Some(chunk) = reader.pull()? {
        hasher
            .push(&chunk)
            .expect("hasher is only finalised after the stream ends");
        writer.push(&chunk)?;
    }
    let computed = hasher
        .finish_and_retrieve()
        .expect("hasher finalised exactly once");
    if let Some(expected) = params.expected_checksum.filter(|checksum| !checksum.is_empty()) {
        if computed != expected {
            return Err(RepositoryError::ChecksumMismatch {
                expected: expected.to_owned(),
                computed,
            });
        }
    }
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location_for(data: &[u8], path: &Path) -> Location {
        Location::from_path_and_checksum("res", path, &md5_hex(data))
    }

    #[test]
    fn local_relative_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let destination = ResourceDestination::LocalRelative {
            base: dir.path().to_path_buf(),
        };
        let rel = Path::new("sub/file.bin");
        let location = location_for(b"payload", rel);
        put_data(&destination, rel, &location, b"payload").expect("put");

        let source = ResourceSource::LocalRelative {
            base: dir.path().to_path_buf(),
        };
        let data = get_data(&GetParams {
            source: &source,
            relative_path: rel,
            location: &location,
            expected_checksum: Some(&md5_hex(b"payload")),
            download_retry_secs: 0,
        })
        .expect("get");
        assert_eq!(data, b"payload");
    }

    #[test]
    fn cdn_destination_shards_by_location_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let destination = ResourceDestination::LocalCdn {
            base: dir.path().to_path_buf(),
        };
        let rel = Path::new("file.bin");
        let location = location_for(b"abc", rel);
        let path = put_data(&destination, rel, &location, b"abc").expect("put");
        assert_eq!(
            path,
            dir.path().join(location.shard()).join(location.as_str())
        );
        assert_eq!(fs::read(path).expect("read"), b"abc");
    }

    #[test]
    fn remote_destination_stages_gzip_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let destination = ResourceDestination::RemoteCdn {
            base: dir.path().to_path_buf(),
        };
        let rel = Path::new("file.bin");
        let location = location_for(b"remote payload", rel);
        let path = put_data(&destination, rel, &location, b"remote payload").expect("put");
        let staged = fs::read(path).expect("read");
        assert_eq!(
            decompress_to_vec(&staged).expect("decompress"),
            b"remote payload"
        );
    }

    #[test]
    fn remote_source_decompresses_and_verifies() {
        let rel = Path::new("movie.bin");
        let payload = b"remote movie bytes".to_vec();
        let location = location_for(&payload, rel);
        let body = compress_to_vec(&payload).expect("compress");
        let expected_url = format!("http://cdn/{}/{}", location.shard(), location.as_str());

        let fetcher = move |url: &str| -> io::Result<Vec<u8>> {
            assert_eq!(url, expected_url);
            Ok(body.clone())
        };
        let source = ResourceSource::RemoteCdn {
            base_url: "http://cdn/".to_owned(),
            fetcher: Rc::new(fetcher),
        };
        let checksum = md5_hex(&payload);
        let data = get_data(&GetParams {
            source: &source,
            relative_path: rel,
            location: &location,
            expected_checksum: Some(&checksum),
            download_retry_secs: 0,
        })
        .expect("get");
        assert_eq!(data, payload);
    }

    #[test]
    fn checksum_gate_rejects_corrupted_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let destination = ResourceDestination::LocalCdn {
            base: dir.path().to_path_buf(),
        };
        let rel = Path::new("file.bin");
        let location = location_for(b"original", rel);
        let path = put_data(&destination, rel, &location, b"original").expect("put");
        fs::write(path, b"corrupted").expect("corrupt");

        let source = ResourceSource::LocalCdn {
            base: dir.path().to_path_buf(),
        };
        let checksum = md5_hex(b"original");
        let error = get_data(&GetParams {
            source: &source,
            relative_path: rel,
            location: &location,
            expected_checksum: Some(&checksum),
            download_retry_secs: 0,
        })
        .expect_err("mismatch");
        assert!(matches!(error, RepositoryError::ChecksumMismatch { .. }));
    }

    #[test]
    fn missing_local_file_reports_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = ResourceSource::LocalRelative {
            base: dir.path().to_path_buf(),
        };
        let error = get_data(&GetParams {
            source: &source,
            relative_path: Path::new("absent.bin"),
            location: &Location::default(),
            expected_checksum: None,
            download_retry_secs: 0,
        })
        .expect_err("missing");
        assert!(matches!(error, RepositoryError::FileNotFound { .. }));
    }

    #[test]
    fn streamed_get_writes_through_the_supplied_writer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rel = Path::new("streamed.bin");
        let payload = vec![42u8; 200_000];
        let location = location_for(&payload, rel);
        let destination = ResourceDestination::LocalCdn {
            base: dir.path().to_path_buf(),
        };
        put_data(&destination, rel, &location, &payload).expect("put");

        let source = ResourceSource::LocalCdn {
            base: dir.path().to_path_buf(),
        };
        let out_path = dir.path().join("copy.bin");
        let mut writer = FileStreamOut::create(&out_path).expect("create");
        let checksum = md5_hex(&payload);
        get_data_stream(
            &GetParams {
                source: &source,
                relative_path: rel,
                location: &location,
                expected_checksum: Some(&checksum),
                download_retry_secs: 0,
            },
            &mut writer,
        )
        .expect("stream");
        assert_eq!(fs::read(out_path).expect("read"), payload);
    }
}
