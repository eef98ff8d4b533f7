use std::io::{self, Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::common::{CountingSink, CountingWriter};

/// Streaming gzip encoder that forwards output into a caller-provided sink.
///
/// The encoder buffers internally; [`finish`](Self::finish) must be called to
/// flush the gzip trailer, otherwise the compressed stream is truncated and
/// undecodable. After `finish` the encoder rejects further input.
pub struct GzipStreamOut<W: Write> {
    inner: Option<GzEncoder<CountingWriter<W>>>,
}

impl<W: Write> GzipStreamOut<W> {
    /// Creates an encoder writing gzip members into `sink`.
    #[must_use]
    pub fn new(sink: W) -> Self {
        Self {
            inner: Some(GzEncoder::new(
                CountingWriter::new(sink),
                Compression::best(),
            )),
        }
    }

    /// Appends `data` to the compression stream.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the sink; returns
    /// [`io::ErrorKind::BrokenPipe`] when the stream was already finished.
    pub fn push(&mut self, data: &[u8]) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(encoder) => encoder.write_all(data),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "gzip stream already finished",
            )),
        }
    }

    /// Flushes the gzip trailer and returns the sink with the compressed length.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors raised while finalising the stream.
    pub fn finish(&mut self) -> io::Result<(W, u64)> {
        let encoder = self.inner.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "gzip stream already finished")
        })?;
        let writer = encoder.finish()?;
        Ok(writer.into_parts())
    }

    /// Reports whether the stream has been finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.is_none()
    }
}

/// Streaming gzip encoder that only records the compressed length.
///
/// Manifests track compressed sizes without keeping the payload around, so
/// the default sink discards every byte after counting it.
pub struct CountingGzipEncoder {
    inner: GzipStreamOut<CountingSink>,
}

impl CountingGzipEncoder {
    /// Creates an encoder that counts compressed output.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: GzipStreamOut::new(CountingSink),
        }
    }

    /// Appends data to the compression stream.
    ///
    /// # Errors
    ///
    /// Propagates errors from the underlying encoder.
    pub fn push(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.push(data)
    }

    /// Completes the stream and returns the total compressed length.
    ///
    /// # Errors
    ///
    /// Propagates errors raised while finalising the stream.
    pub fn finish(&mut self) -> io::Result<u64> {
        let (_sink, bytes) = self.inner.finish()?;
        Ok(bytes)
    }
}

impl Default for CountingGzipEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoding reader over a gzip member.
pub struct GzipStreamIn<R> {
    inner: GzDecoder<R>,
}

impl<R: Read> GzipStreamIn<R> {
    /// Wraps `reader`, yielding decompressed bytes through [`Read`].
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            inner: GzDecoder::new(reader),
        }
    }

    /// Consumes the decoder and returns the wrapped reader.
    #[must_use]
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R: Read> Read for GzipStreamIn<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Compresses `input` into a gzip member held in a new [`Vec`].
///
/// # Errors
///
/// Propagates I/O errors from the encoder.
pub fn compress_to_vec(input: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(input)?;
    encoder.finish()
}

/// Decompresses a gzip member into a new [`Vec`].
///
/// # Errors
///
/// Propagates I/O errors, including malformed gzip input.
pub fn decompress_to_vec(input: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(input);
    let mut output = Vec::new();
    decoder.read_to_end(&mut output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn compressed_output_carries_gzip_magic() {
        let compressed = compress_to_vec(b"SomeData").expect("compress");
        assert_eq!(&compressed[..4], &[0x1f, 0x8b, 0x08, 0x00]);
    }

    #[test]
    fn empty_payload_round_trips() {
        let compressed = compress_to_vec(b"").expect("compress");
        assert_eq!(decompress_to_vec(&compressed).expect("decompress"), b"");
    }

    #[test]
    fn stream_encoder_matches_one_shot_output() {
        let payload = b"resource payload that compresses".repeat(9);
        let mut encoder = GzipStreamOut::new(Vec::new());
        for chunk in payload.chunks(17) {
            encoder.push(chunk).expect("push chunk");
        }
        let (sink, bytes) = encoder.finish().expect("finish stream");
        assert_eq!(bytes as usize, sink.len());
        assert_eq!(decompress_to_vec(&sink).expect("decompress"), payload);
    }

    #[test]
    fn unfinished_stream_is_not_decodable() {
        let mut encoder = GzipStreamOut::new(Vec::new());
        encoder.push(b"lost tail").expect("push");
        // Without finish() the trailer never reaches the sink.
        assert!(!encoder.is_finished());
    }

    #[test]
    fn push_after_finish_is_rejected() {
        let mut encoder = GzipStreamOut::new(Vec::new());
        encoder.push(b"payload").expect("push");
        encoder.finish().expect("finish");
        let error = encoder.push(b"more").expect_err("stream closed");
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn counting_encoder_matches_buffered_length() {
        let payload = b"counted payload".repeat(21);
        let mut counter = CountingGzipEncoder::new();
        counter.push(&payload).expect("push");
        let counted = counter.finish().expect("finish");
        let buffered = compress_to_vec(&payload).expect("compress");
        assert_eq!(counted as usize, buffered.len());
    }

    #[test]
    fn decoding_reader_yields_original_bytes() {
        let payload = b"reader payload".repeat(5);
        let compressed = compress_to_vec(&payload).expect("compress");
        let mut reader = GzipStreamIn::new(compressed.as_slice());
        let mut decoded = Vec::new();
        reader.read_to_end(&mut decoded).expect("read");
        assert_eq!(decoded, payload);
    }

    proptest! {
        #[test]
        fn round_trip_preserves_arbitrary_payloads(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let compressed = compress_to_vec(&payload).expect("compress");
            let decoded = decompress_to_vec(&compressed).expect("decompress");
            prop_assert_eq!(decoded, payload);
        }
    }
}
