//! Streaming MD5 digests.

use md5::{Digest, Md5};
use thiserror::Error;

use crate::to_hex;

/// Errors produced by [`Md5Stream`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum ChecksumError {
    /// The stream was already finalised; no further input is accepted.
    #[error("checksum stream already finalised")]
    Finalised,
}

/// Incremental MD5 digest over a byte stream.
///
/// Content checksums are computed while resource bytes flow through the
/// pipeline, so files never need to be materialised just to be hashed. Once
/// [`finish_and_retrieve`](Self::finish_and_retrieve) has been called the
/// stream rejects further pushes.
///
/// # Examples
///
/// ```
/// use checksums::Md5Stream;
///
/// let mut stream = Md5Stream::new();
/// stream.push(b"Dum").unwrap();
/// stream.push(b"my").unwrap();
/// let digest = stream.finish_and_retrieve().unwrap();
/// assert_eq!(digest, "bcf036b6f33e182d4705f4f5b1af13ac");
/// ```
#[derive(Clone, Debug, Default)]
pub struct Md5Stream {
    hasher: Option<Md5>,
}

impl Md5Stream {
    /// Creates a stream with an empty digest state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hasher: Some(Md5::new()),
        }
    }

    /// Feeds `data` into the digest.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Finalised`] when the stream has already been
    /// finalised.
    pub fn push(&mut self, data: &[u8]) -> Result<(), ChecksumError> {
        match self.hasher.as_mut() {
            Some(hasher) => {
                hasher.update(data);
                Ok(())
            }
            None => Err(ChecksumError::Finalised),
        }
    }

    /// Finalises the digest and returns it as a 32-digit hex string.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Finalised`] when called a second time.
    pub fn finish_and_retrieve(&mut self) -> Result<String, ChecksumError> {
        let hasher = self.hasher.take().ok_or(ChecksumError::Finalised)?;
        Ok(to_hex(&hasher.finalize()))
    }

    /// Reports whether the stream has been finalised.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.hasher.is_none()
    }
}

/// Computes the MD5 digest of `data` in one shot, rendered as hex.
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    to_hex(&Md5::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_digest_matches_known_value() {
        assert_eq!(md5_hex(b"Dummy"), "bcf036b6f33e182d4705f4f5b1af13ac");
    }

    #[test]
    fn streaming_digest_matches_one_shot() {
        let payload = b"The quick brown fox jumps over the lazy dog".repeat(7);
        let mut stream = Md5Stream::new();
        for chunk in payload.chunks(13) {
            stream.push(chunk).expect("push chunk");
        }
        let streamed = stream.finish_and_retrieve().expect("finalise");
        assert_eq!(streamed, md5_hex(&payload));
    }

    #[test]
    fn empty_stream_digests_empty_input() {
        let mut stream = Md5Stream::new();
        let digest = stream.finish_and_retrieve().expect("finalise");
        assert_eq!(digest, md5_hex(b""));
    }

    #[test]
    fn push_after_finalise_is_rejected() {
        let mut stream = Md5Stream::new();
        stream.push(b"data").expect("push");
        stream.finish_and_retrieve().expect("finalise");
        assert!(stream.is_finished());
        assert_eq!(stream.push(b"more"), Err(ChecksumError::Finalised));
        assert_eq!(
            stream.finish_and_retrieve(),
            Err(ChecksumError::Finalised)
        );
    }
}
