//! Content-defined chunk index over a "previous" file.
//!
//! The index answers "where in PREVIOUS does this window of NEXT occur?" in
//! expected constant time. PREVIOUS is fingerprinted in non-overlapping
//! windows of the chunk size; each fingerprint maps to the list of offsets it
//! was seen at. Offset lists live on disk under the index folder, sharded by
//! the first two hex digits of the fingerprint, which keeps resident memory
//! independent of file size. A filter built from NEXT's fingerprints prunes
//! entries that can never match before they are written.
//!
//! Lookups are verified: a fingerprint hit only becomes a match once the
//! candidate window in PREVIOUS byte-equals the probe.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use checksums::fnv1a_64;

use crate::ChunkError;

/// Fingerprint index over non-overlapping windows of a previous file.
pub struct ChunkIndex {
    previous: PathBuf,
    chunk_size: usize,
    folder: PathBuf,
    filter: Option<HashSet<u64>>,
    generated: bool,
}

impl ChunkIndex {
    /// Creates an index for `previous` using windows of `chunk_size` bytes,
    /// storing its shards under `folder`.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::InvalidChunkSize`] for a zero chunk size.
    pub fn new(previous: &Path, chunk_size: u64, folder: &Path) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidChunkSize);
        }
        let chunk_size =
            usize::try_from(chunk_size).map_err(|_| ChunkError::InvalidChunkSize)?;
        Ok(Self {
            previous: previous.to_path_buf(),
            chunk_size,
            folder: folder.to_path_buf(),
            filter: None,
            generated: false,
        })
    }

    /// Scans `next` and records which fingerprints can occur in lookups.
    ///
    /// Only fingerprints present in NEXT are retained during
    /// [`generate`](Self::generate), bounding the index size by the data that
    /// will actually be probed.
    ///
    /// # Errors
    ///
    /// Propagates read failures on `next`.
    pub fn generate_checksum_filter(&mut self, next: &Path) -> Result<(), ChunkError> {
        let mut filter = HashSet::new();
        for_each_window(next, self.chunk_size, |_, window| {
            filter.insert(fnv1a_64(window));
            Ok(())
        })?;
        tracing::debug!(fingerprints = filter.len(), "built chunk filter");
        self.filter = Some(filter);
        Ok(())
    }

    /// Builds the on-disk index over the previous file.
    ///
    /// The index owns its folder exclusively while it exists: any stale
    /// content is removed before shards are written. Removing the folder
    /// after patching is the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures while reading the previous file or writing
    /// shards.
    pub fn generate(&mut self) -> Result<(), ChunkError> {
        if self.folder.exists() {
            fs::remove_dir_all(&self.folder)?;
        }
        fs::create_dir_all(&self.folder)?;

        let filter = self.filter.as_ref();
        let folder = self.folder.clone();
        let mut indexed = 0u64;
        for_each_window(&self.previous, self.chunk_size, |offset, window| {
            let fingerprint = fnv1a_64(window);
            if let Some(filter) = filter {
                if !filter.contains(&fingerprint) {
                    return Ok(());
                }
            }
            append_offset(&folder, fingerprint, offset)?;
            indexed += 1;
            Ok(())
        })?;
        tracing::debug!(indexed, previous = %self.previous.display(), "chunk index built");
        self.generated = true;
        Ok(())
    }

    /// Reports whether [`generate`](Self::generate) has completed.
    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Looks up `window` and returns the first previous offset whose bytes
    /// equal it.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures while reading shards or verifying candidates.
    pub fn find_matching_chunk(&self, window: &[u8]) -> Result<Option<u64>, ChunkError> {
        if window.is_empty() {
            return Ok(None);
        }
        let shard = shard_path(&self.folder, fnv1a_64(window));
        let offsets = match fs::read(&shard) {
            Ok(bytes) => decode_offsets(&bytes)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let mut previous = File::open(&self.previous)?;
        let mut candidate = vec![0u8; window.len()];
        for offset in offsets {
            previous.seek(SeekFrom::Start(offset))?;
            match previous.read_exact(&mut candidate) {
                Ok(()) => {
                    if candidate == window {
                        return Ok(Some(offset));
                    }
                }
                // A short window hashed from the previous tail cannot satisfy
                // a full-size probe; skip it.
                Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => {}
                Err(error) => return Err(error.into()),
            }
        }
        Ok(None)
    }
}

/// Counts consecutive equal windows forward from `(next_offset, prev_offset)`.
///
/// Windows are compared `chunk_size` bytes at a time; the run stops at the
/// first difference or when either file runs out of a comparable window.
///
/// # Errors
///
/// Propagates read failures on either file.
pub fn count_matching_chunks(
    next: &Path,
    next_offset: u64,
    prev: &Path,
    prev_offset: u64,
    chunk_size: u64,
) -> Result<u64, ChunkError> {
    if chunk_size == 0 {
        return Err(ChunkError::InvalidChunkSize);
    }
    let mut next_file = File::open(next)?;
    let mut prev_file = File::open(prev)?;
    let next_len = next_file.metadata()?.len();
    let prev_len = prev_file.metadata()?.len();

    let chunk = usize::try_from(chunk_size).map_err(|_| ChunkError::InvalidChunkSize)?;
    let mut next_buf = vec![0u8; chunk];
    let mut prev_buf = vec![0u8; chunk];
    let mut runs = 0u64;
    let mut next_at = next_offset;
    let mut prev_at = prev_offset;

    loop {
        let next_take = window_len(next_len, next_at, chunk);
        let prev_take = window_len(prev_len, prev_at, chunk);
        if next_take == 0 || next_take != prev_take {
            return Ok(runs);
        }
        next_file.seek(SeekFrom::Start(next_at))?;
        next_file.read_exact(&mut next_buf[..next_take])?;
        prev_file.seek(SeekFrom::Start(prev_at))?;
        prev_file.read_exact(&mut prev_buf[..prev_take])?;
        if next_buf[..next_take] != prev_buf[..prev_take] {
            return Ok(runs);
        }
        runs += 1;
        next_at += next_take as u64;
        prev_at += prev_take as u64;
    }
}

fn window_len(file_len: u64, offset: u64, chunk: usize) -> usize {
    if offset >= file_len {
        return 0;
    }
    usize::try_from((file_len - offset).min(chunk as u64)).unwrap_or(0)
}

fn for_each_window(
    path: &Path,
    chunk_size: usize,
    mut visit: impl FnMut(u64, &[u8]) -> Result<(), ChunkError>,
) -> Result<(), ChunkError> {
    let mut file = File::open(path)?;
    let mut buffer = vec![0u8; chunk_size];
    let mut offset = 0u64;
    loop {
        let read = read_up_to(&mut file, &mut buffer)?;
        if read == 0 {
            return Ok(());
        }
        visit(offset, &buffer[..read])?;
        offset += read as u64;
    }
}

fn read_up_to(file: &mut File, buffer: &mut [u8]) -> Result<usize, ChunkError> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = file.read(&mut buffer[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

fn shard_path(folder: &Path, fingerprint: u64) -> PathBuf {
    let name = format!("{fingerprint:016x}");
    folder.join(&name[..2]).join(name)
}

fn append_offset(folder: &Path, fingerprint: u64, offset: u64) -> Result<(), ChunkError> {
    let shard = shard_path(folder, fingerprint);
    if let Some(parent) = shard.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(shard)?;
    file.write_all(&offset.to_le_bytes())?;
    Ok(())
}

fn decode_offsets(bytes: &[u8]) -> Result<Vec<u64>, ChunkError> {
    if bytes.len() % 8 != 0 {
        return Err(ChunkError::FailedToRetrieveChunkData);
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|raw| u64::from_le_bytes(raw.try_into().expect("chunks_exact yields 8 bytes")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        previous: PathBuf,
        next: PathBuf,
        index_dir: PathBuf,
    }

    fn fixture(previous: &[u8], next: &[u8]) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let prev_path = dir.path().join("previous.bin");
        let next_path = dir.path().join("next.bin");
        std::fs::write(&prev_path, previous).expect("write previous");
        std::fs::write(&next_path, next).expect("write next");
        let index_dir = dir.path().join("index");
        Fixture {
            previous: prev_path,
            next: next_path,
            index_dir,
            _dir: dir,
        }
    }

    fn built_index(fixture: &Fixture, chunk_size: u64) -> ChunkIndex {
        let mut index =
            ChunkIndex::new(&fixture.previous, chunk_size, &fixture.index_dir).expect("new");
        index
            .generate_checksum_filter(&fixture.next)
            .expect("filter");
        index.generate().expect("generate");
        index
    }

    #[test]
    fn matching_window_is_found_at_its_offset() {
        let previous: Vec<u8> = (0u16..512).map(|v| (v % 251) as u8).collect();
        let fixture = fixture(&previous, &previous);
        let index = built_index(&fixture, 64);

        for offset in (0..512).step_by(64) {
            let window = &previous[offset..offset + 64];
            assert_eq!(
                index.find_matching_chunk(window).expect("lookup"),
                Some(offset as u64)
            );
        }
    }

    #[test]
    fn shifted_content_is_still_located() {
        let previous: Vec<u8> = (0u16..512).map(|v| (v % 241) as u8).collect();
        // Insert 64 bytes of new data in front, shifting everything.
        let mut next = vec![0xAAu8; 64];
        next.extend_from_slice(&previous);
        let fixture = fixture(&previous, &next);
        let index = built_index(&fixture, 64);

        let probe = &next[64..128];
        assert_eq!(index.find_matching_chunk(probe).expect("lookup"), Some(0));
    }

    #[test]
    fn absent_window_misses() {
        let fixture = fixture(&[1u8; 256], &[2u8; 256]);
        let index = built_index(&fixture, 64);
        assert_eq!(index.find_matching_chunk(&[2u8; 64]).expect("lookup"), None);
    }

    #[test]
    fn filter_prunes_unprobed_fingerprints() {
        let previous = [vec![1u8; 64], vec![2u8; 64]].concat();
        let next = vec![2u8; 64];
        let fixture = fixture(&previous, &next);
        let index = built_index(&fixture, 64);

        // The filtered-out window no longer resolves even though it exists in
        // the previous file.
        assert_eq!(index.find_matching_chunk(&[1u8; 64]).expect("lookup"), None);
        assert_eq!(
            index.find_matching_chunk(&[2u8; 64]).expect("lookup"),
            Some(64)
        );
    }

    #[test]
    fn run_extension_counts_consecutive_equal_windows() {
        let shared: Vec<u8> = (0u16..320).map(|v| (v % 199) as u8).collect();
        let mut next = shared.clone();
        next[300] ^= 0xFF;
        let fixture = fixture(&shared, &next);

        let matched = count_matching_chunks(&fixture.next, 0, &fixture.previous, 0, 64)
            .expect("count");
        // Windows 0..4 are identical, the fifth differs.
        assert_eq!(matched, 4);
    }

    #[test]
    fn regenerating_clears_stale_shards() {
        let fixture = fixture(&[7u8; 128], &[7u8; 128]);
        let mut index = built_index(&fixture, 64);
        index.generate().expect("regenerate");
        assert_eq!(
            index.find_matching_chunk(&[7u8; 64]).expect("lookup"),
            Some(0)
        );
    }
}
