//! One-shot Fowler-Noll-Vo hashing.
//!
//! Storage locations hash the prefixed relative path with FNV-1a 64 so that
//! the same logical path always shards to the same CDN directory. Only the
//! one-shot form is needed; there is no streaming variant.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Computes the FNV-1a 64 hash of `data`.
#[must_use]
pub fn fnv1a_64(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Computes the FNV-1a 64 hash of `data` rendered as 16 hex digits.
#[must_use]
pub fn fnv1a_64_hex(data: &[u8]) -> String {
    format!("{:016x}", fnv1a_64(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_offset_basis() {
        assert_eq!(fnv1a_64(b""), FNV_OFFSET_BASIS);
    }

    #[test]
    fn prefixed_path_matches_known_digest() {
        assert_eq!(fnv1a_64_hex(b"res:/intromovie.txt"), "a9d1721dd5cc6d54");
    }

    #[test]
    fn hex_form_is_zero_padded_to_sixteen_digits() {
        let rendered = fnv1a_64_hex(b"a");
        assert_eq!(rendered.len(), 16);
    }
}
