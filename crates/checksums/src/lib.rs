#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Checksum primitives for the resource toolchain.
//!
//! The crate exposes the streaming MD5 digest used for resource content
//! checksums together with the one-shot FNV-1a 64 hash used to derive
//! path-based storage keys. Higher layers combine the two into content
//! addresses of the form `<fnv_path>_<md5_content>`.

mod fnv;
mod md5_stream;

pub use fnv::{fnv1a_64, fnv1a_64_hex};
pub use md5_stream::{md5_hex, ChecksumError, Md5Stream};

/// Renders `bytes` as a lower-case hexadecimal string.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    bytes.iter().fold(
        String::with_capacity(bytes.len() * 2),
        |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        },
    )
}

#[cfg(test)]
mod tests {
    use super::to_hex;

    #[test]
    fn hex_rendering_is_lower_case_and_padded() {
        assert_eq!(to_hex(&[0x00, 0x0f, 0xa9, 0xff]), "000fa9ff");
        assert_eq!(to_hex(&[]), "");
    }
}
