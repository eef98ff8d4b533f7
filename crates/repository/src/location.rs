//! Content-derived storage locations.

use std::path::Path;

use checksums::fnv1a_64_hex;

/// Deterministic content address of a resource payload.
///
/// The address combines a hash of the prefixed relative path with the MD5 of
/// the content: `fnv1a64_hex(prefix + ":/" + relativePath) + "_" + checksum`.
/// Its first two characters name the shard directory under a CDN base.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use repository::Location;
///
/// let location = Location::from_path_and_checksum(
///     "res",
///     Path::new("intromovie.txt"),
///     "bcf036b6f33e182d4705f4f5b1af13ac",
/// );
/// assert!(location.as_str().starts_with("a9d1721dd5cc6d54_"));
/// assert_eq!(location.shard(), "a9");
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Location(String);

impl Location {
    /// Derives the location for `relative_path` content hashing to `checksum`.
    #[must_use]
    pub fn from_path_and_checksum(prefix: &str, relative_path: &Path, checksum: &str) -> Self {
        let prefixed = format!("{prefix}:/{}", manifest_path(relative_path));
        Self(format!(
            "{}_{}",
            fnv1a_64_hex(prefixed.as_bytes()),
            checksum
        ))
    }

    /// Wraps an already-rendered location string, e.g. from a manifest.
    #[must_use]
    pub fn from_string(location: String) -> Self {
        Self(location)
    }

    /// Returns the location as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the two-character shard directory name.
    ///
    /// Empty locations (dummy manifest rows) shard to the empty string.
    #[must_use]
    pub fn shard(&self) -> &str {
        self.0.get(..2).unwrap_or("")
    }

    /// Reports whether this is the empty location of a dummy row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Renders a relative path with forward slashes for manifests and hashing.
#[must_use]
pub fn manifest_path(path: &Path) -> String {
    let rendered = path.to_string_lossy();
    if rendered.contains('\\') {
        rendered.replace('\\', "/")
    } else {
        rendered.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_combines_path_hash_and_checksum() {
        let location = Location::from_path_and_checksum(
            "res",
            Path::new("intromovie.txt"),
            "bcf036b6f33e182d4705f4f5b1af13ac",
        );
        assert_eq!(
            location.as_str(),
            "a9d1721dd5cc6d54_bcf036b6f33e182d4705f4f5b1af13ac"
        );
    }

    #[test]
    fn nested_paths_use_forward_slashes() {
        let a = Location::from_path_and_checksum("res", Path::new("a/b.bin"), "00");
        let b = Location::from_path_and_checksum("res", Path::new("a/b.bin"), "00");
        assert_eq!(a, b);
        assert_eq!(a.shard().len(), 2);
    }

    #[test]
    fn empty_location_has_empty_shard() {
        let location = Location::from_string(String::new());
        assert!(location.is_empty());
        assert_eq!(location.shard(), "");
    }
}
