#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Gzip helpers shared across the workspace. Resource payloads travel
//! gzip-encoded whenever a remote CDN is involved, and compressed sizes are
//! recorded in every manifest, so the codec surfaces three shapes:
//!
//! - [`GzipStreamOut`] forwards compressed bytes into a caller-provided sink
//!   and must be finished explicitly or trailing compressed bytes are lost.
//! - [`CountingGzipEncoder`] discards the compressed payload while tracking
//!   its length, for manifests that only need the size.
//! - [`compress_to_vec`] / [`decompress_to_vec`] handle small in-memory
//!   payloads in one shot.
//!
//! # Examples
//!
//! ```
//! use compress::{compress_to_vec, decompress_to_vec};
//!
//! let compressed = compress_to_vec(b"SomeData").unwrap();
//! assert_eq!(&compressed[..4], &[0x1f, 0x8b, 0x08, 0x00]);
//! assert_eq!(decompress_to_vec(&compressed).unwrap(), b"SomeData");
//! ```

mod common;
mod gzip;

pub use common::CountingSink;
pub use gzip::{
    compress_to_vec, decompress_to_vec, CountingGzipEncoder, GzipStreamIn, GzipStreamOut,
};
