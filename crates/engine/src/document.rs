//! Versioned document schema.
//!
//! Every scalar field of the on-disk format carries an `(introducedIn,
//! retiredIn)` window. Importers read a tag only when the document version
//! falls inside the window; exporters emit a tag only when the requested
//! output version does. Tags outside the known set are a schema violation.

use serde_yaml::{Mapping, Value};

use crate::error::{Error, ErrorKind, Result};
use crate::version::Version;

pub(crate) mod tags {
    pub const VERSION: &str = "Version";
    pub const TYPE: &str = "Type";
    pub const NUMBER_OF_RESOURCES: &str = "NumberOfResources";
    pub const TOTAL_UNCOMPRESSED: &str = "TotalResourceSizeUncompressed";
    pub const TOTAL_COMPRESSED: &str = "TotalResourceSizeCompressed";
    pub const RESOURCES: &str = "Resources";
    pub const RESOURCE_GROUP: &str = "ResourceGroup";
    pub const CHUNK_SIZE: &str = "ChunkSize";
    pub const REMOVED_RESOURCES: &str = "RemovedResources";

    pub const RELATIVE_PATH: &str = "RelativePath";
    pub const PREFIX: &str = "Prefix";
    pub const LOCATION: &str = "Location";
    pub const CHECKSUM: &str = "Checksum";
    pub const UNCOMPRESSED_SIZE: &str = "UncompressedSize";
    pub const COMPRESSED_SIZE: &str = "CompressedSize";
    pub const BINARY_OPERATION: &str = "BinaryOperation";
    pub const TARGET_RELATIVE_PATH: &str = "TargetRelativePath";
    pub const DATA_OFFSET: &str = "DataOffset";
    pub const SOURCE_OFFSET: &str = "SourceOffset";
    pub const MATCH_LENGTH: &str = "MatchLength";
}

/// Version window of a document field.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldWindow {
    pub introduced: Version,
    pub retired: Option<Version>,
}

impl FieldWindow {
    const fn from(introduced: Version) -> Self {
        Self {
            introduced,
            retired: None,
        }
    }

    /// Reports whether a document of `version` carries this field.
    pub fn contains(self, version: Version) -> bool {
        version >= self.introduced && self.retired.map_or(true, |retired| version < retired)
    }
}

const V0_0_0: Version = Version::new(0, 0, 0);
const V0_1_0: Version = Version::new(0, 1, 0);
const V0_2_0: Version = Version::new(0, 2, 0);

/// Returns the version window of a known tag.
pub(crate) fn window(tag: &str) -> FieldWindow {
    match tag {
        tags::VERSION => FieldWindow::from(V0_0_0),
        tags::PREFIX | tags::BINARY_OPERATION => FieldWindow::from(V0_2_0),
        _ => FieldWindow::from(V0_1_0),
    }
}

pub(crate) fn key(tag: &str) -> Value {
    Value::String(tag.to_owned())
}

pub(crate) fn get<'a>(map: &'a Mapping, tag: &str) -> Option<&'a Value> {
    map.get(&key(tag))
}

pub(crate) fn malformed(tag: &str) -> Error {
    Error::with_info(ErrorKind::MalformedResourceGroup, tag)
}

/// Reads a required string field that is inside the document window.
pub(crate) fn required_str<'a>(map: &'a Mapping, tag: &str) -> Result<&'a str> {
    get(map, tag)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(tag))
}

/// Reads a required unsigned field that is inside the document window.
pub(crate) fn required_u64(map: &Mapping, tag: &str) -> Result<u64> {
    get(map, tag)
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed(tag))
}

/// Reads an optional unsigned field; a present-but-non-numeric value is a
/// schema violation.
pub(crate) fn optional_u64(map: &Mapping, tag: &str) -> Result<Option<u64>> {
    match get(map, tag) {
        None => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| malformed(tag)),
    }
}

/// Rejects any key of `map` outside `allowed`.
pub(crate) fn reject_unknown_tags(map: &Mapping, allowed: &[&str]) -> Result<()> {
    for (tag, _value) in map {
        let known = tag
            .as_str()
            .is_some_and(|name| allowed.contains(&name));
        if !known {
            return Err(Error::with_info(
                ErrorKind::MalformedResourceGroup,
                format!("unknown tag {tag:?}"),
            ));
        }
    }
    Ok(())
}

/// Inserts `tag: value` when the tag's window covers `version`.
pub(crate) fn emit(map: &mut Mapping, tag: &str, version: Version, value: Value) {
    if window(tag).contains(version) {
        map.insert(key(tag), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_follow_the_schema_table() {
        assert!(window(tags::VERSION).contains(Version::ZERO));
        assert!(!window(tags::RESOURCES).contains(Version::ZERO));
        assert!(window(tags::RESOURCES).contains(V0_1_0));
        assert!(!window(tags::PREFIX).contains(V0_1_0));
        assert!(window(tags::PREFIX).contains(V0_2_0));
    }

    #[test]
    fn emit_respects_the_output_window() {
        let mut map = Mapping::new();
        emit(&mut map, tags::PREFIX, V0_1_0, Value::String("res".into()));
        assert!(map.is_empty());
        emit(&mut map, tags::PREFIX, V0_2_0, Value::String("res".into()));
        assert_eq!(required_str(&map, tags::PREFIX).unwrap(), "res");
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let mut map = Mapping::new();
        map.insert(key("Surprise"), Value::Null);
        let error = reject_unknown_tags(&map, &[tags::VERSION]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MalformedResourceGroup);
    }

    #[test]
    fn optional_u64_distinguishes_absent_from_malformed() {
        let mut map = Mapping::new();
        assert_eq!(optional_u64(&map, tags::TOTAL_COMPRESSED).unwrap(), None);
        map.insert(key(tags::TOTAL_COMPRESSED), Value::String("no".into()));
        assert!(optional_u64(&map, tags::TOTAL_COMPRESSED).is_err());
    }
}
