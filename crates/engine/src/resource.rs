//! Manifest rows.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use checksums::md5_hex;
use repository::{manifest_path, Location};

use crate::document::{self, tags};
use crate::error::{Error, ErrorKind, Result};
use crate::version::Version;

/// Discriminant of a manifest row.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    /// An ordinary file of a delivery.
    Plain,
    /// A fixed-size slice of a bundle's concatenated payload stream.
    Chunk,
    /// One copy or delta record of a patch.
    Patch(PatchRecord),
    /// A serialized group manifest embedded as a resource.
    GroupEmbedded,
}

/// Extension fields carried by patch records.
///
/// A record with a `match_length` is a pure copy: `match_length` bytes of the
/// previous file at `source_offset` land at `data_offset` of the rebuilt
/// target, and no payload exists. A record without one carries a binary-diff
/// payload computed against the previous window at `source_offset`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PatchRecord {
    /// File of the next group this record rebuilds.
    pub target_relative_path: PathBuf,
    /// Offset into the rebuilt target file.
    pub data_offset: u64,
    /// Offset into the previous file.
    pub source_offset: u64,
    /// Length of a pure copy; absent for delta records.
    pub match_length: Option<u64>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ResourceTypeTag {
    Plain,
    Chunk,
    Patch,
    GroupEmbedded,
}

impl ResourceTypeTag {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "Plain",
            Self::Chunk => "Chunk",
            Self::Patch => "Patch",
            Self::GroupEmbedded => "GroupEmbedded",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "Plain" => Some(Self::Plain),
            "Chunk" => Some(Self::Chunk),
            "Patch" => Some(Self::Patch),
            "GroupEmbedded" => Some(Self::GroupEmbedded),
            _ => None,
        }
    }
}

/// One row of a group manifest.
///
/// A row with an empty location (and therefore an empty checksum and zero
/// size) is a *dummy*: a padding entry that aligns the previous/next arrays
/// produced by subtraction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceInfo {
    pub(crate) relative_path: PathBuf,
    pub(crate) prefix: String,
    pub(crate) location: Location,
    pub(crate) checksum: String,
    pub(crate) uncompressed_size: u64,
    pub(crate) compressed_size: u64,
    pub(crate) binary_operation: u32,
    pub(crate) kind: ResourceKind,
}

impl ResourceInfo {
    /// Creates an empty plain row for `relative_path`.
    #[must_use]
    pub fn new(relative_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
            prefix: String::new(),
            location: Location::default(),
            checksum: String::new(),
            uncompressed_size: 0,
            compressed_size: 0,
            binary_operation: 0,
            kind: ResourceKind::Plain,
        }
    }

    /// Creates a dummy padding row for `relative_path`.
    #[must_use]
    pub fn dummy(relative_path: impl Into<PathBuf>) -> Self {
        Self::new(relative_path)
    }

    /// Sets the logical namespace prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the row discriminant.
    #[must_use]
    pub fn with_kind(mut self, kind: ResourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Relative path of the resource within its group.
    #[must_use]
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Relative path rendered the way manifests spell it.
    #[must_use]
    pub fn path_string(&self) -> String {
        manifest_path(&self.relative_path)
    }

    /// Logical namespace prefix, e.g. `res`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Content-derived storage location; empty for dummy rows.
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// MD5 of the uncompressed payload; empty for dummy rows.
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Exact payload length in bytes.
    #[must_use]
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Gzip-compressed payload length; zero when never computed.
    #[must_use]
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Opaque per-extension tag preserved through documents.
    #[must_use]
    pub fn binary_operation(&self) -> u32 {
        self.binary_operation
    }

    /// Row discriminant.
    #[must_use]
    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Patch record fields, when this row is a patch record.
    #[must_use]
    pub fn patch_record(&self) -> Option<&PatchRecord> {
        match &self.kind {
            ResourceKind::Patch(record) => Some(record),
            _ => None,
        }
    }

    /// Reports whether this is a padding row.
    #[must_use]
    pub fn is_dummy(&self) -> bool {
        self.location.is_empty()
    }

    /// Fills checksum, sizes, and location from the payload bytes.
    ///
    /// The compressed size is only computed when `calculate_compressions` is
    /// set; otherwise it is recorded as unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::FailedToCompressData`] when size accounting of
    /// the gzip stream fails.
    pub fn set_parameters_from_data(
        &mut self,
        data: &[u8],
        calculate_compressions: bool,
    ) -> Result<()> {
        self.checksum = md5_hex(data);
        self.uncompressed_size = data.len() as u64;
        self.compressed_size = if calculate_compressions {
            let mut counter = compress::CountingGzipEncoder::new();
            counter
                .push(data)
                .and_then(|()| counter.finish())
                .map_err(|error| {
                    Error::with_info(ErrorKind::FailedToCompressData, error.to_string())
                })?
        } else {
            0
        };
        self.assign_location();
        Ok(())
    }

    /// Recomputes the location from the current prefix, path, and checksum.
    pub(crate) fn assign_location(&mut self) {
        self.location =
            Location::from_path_and_checksum(&self.prefix, &self.relative_path, &self.checksum);
    }

    pub(crate) fn type_tag(&self) -> ResourceTypeTag {
        match &self.kind {
            ResourceKind::Plain => ResourceTypeTag::Plain,
            ResourceKind::Chunk => ResourceTypeTag::Chunk,
            ResourceKind::Patch(_) => ResourceTypeTag::Patch,
            ResourceKind::GroupEmbedded => ResourceTypeTag::GroupEmbedded,
        }
    }

    /// Set-operation ordering key: `(relativePath, checksum)` ascending.
    pub(crate) fn sort_key(&self) -> (String, String) {
        (self.path_string(), self.checksum.clone())
    }

    /// Identity under set semantics.
    pub(crate) fn same_identity(&self, other: &Self) -> bool {
        self.relative_path == other.relative_path && self.checksum == other.checksum
    }

    const BASE_TAGS: &'static [&'static str] = &[
        tags::RELATIVE_PATH,
        tags::PREFIX,
        tags::LOCATION,
        tags::CHECKSUM,
        tags::UNCOMPRESSED_SIZE,
        tags::COMPRESSED_SIZE,
        tags::BINARY_OPERATION,
        tags::TYPE,
    ];

    const PATCH_TAGS: &'static [&'static str] = &[
        tags::TARGET_RELATIVE_PATH,
        tags::DATA_OFFSET,
        tags::SOURCE_OFFSET,
        tags::MATCH_LENGTH,
    ];

    /// Renders this row as a YAML mapping for a document of `version`.
    pub(crate) fn export_yaml(&self, version: Version) -> Mapping {
        let mut map = Mapping::new();
        document::emit(
            &mut map,
            tags::RELATIVE_PATH,
            version,
            Value::String(self.path_string()),
        );
        document::emit(
            &mut map,
            tags::PREFIX,
            version,
            Value::String(self.prefix.clone()),
        );
        document::emit(
            &mut map,
            tags::LOCATION,
            version,
            Value::String(self.location.as_str().to_owned()),
        );
        document::emit(
            &mut map,
            tags::CHECKSUM,
            version,
            Value::String(self.checksum.clone()),
        );
        document::emit(
            &mut map,
            tags::UNCOMPRESSED_SIZE,
            version,
            Value::from(self.uncompressed_size),
        );
        document::emit(
            &mut map,
            tags::COMPRESSED_SIZE,
            version,
            Value::from(self.compressed_size),
        );
        document::emit(
            &mut map,
            tags::BINARY_OPERATION,
            version,
            Value::from(u64::from(self.binary_operation)),
        );
        document::emit(
            &mut map,
            tags::TYPE,
            version,
            Value::String(self.type_tag().as_str().to_owned()),
        );
        if let ResourceKind::Patch(record) = &self.kind {
            document::emit(
                &mut map,
                tags::TARGET_RELATIVE_PATH,
                version,
                Value::String(manifest_path(&record.target_relative_path)),
            );
            document::emit(
                &mut map,
                tags::DATA_OFFSET,
                version,
                Value::from(record.data_offset),
            );
            document::emit(
                &mut map,
                tags::SOURCE_OFFSET,
                version,
                Value::from(record.source_offset),
            );
            if let Some(match_length) = record.match_length {
                document::emit(
                    &mut map,
                    tags::MATCH_LENGTH,
                    version,
                    Value::from(match_length),
                );
            }
        }
        map
    }

    /// Parses one row of a document of `version`.
    ///
    /// `default_type` supplies the discriminant for documents predating the
    /// per-resource `Type` tag.
    pub(crate) fn import_yaml(
        map: &Mapping,
        version: Version,
        default_type: ResourceTypeTag,
    ) -> Result<Self> {
        let type_tag = if document::window(tags::TYPE).contains(version) {
            let text = document::required_str(map, tags::TYPE)?;
            ResourceTypeTag::parse(text)
                .ok_or_else(|| Error::with_info(ErrorKind::MalformedResourceGroup, text))?
        } else {
            default_type
        };

        let allowed: Vec<&str> = if type_tag == ResourceTypeTag::Patch {
            Self::BASE_TAGS
                .iter()
                .chain(Self::PATCH_TAGS)
                .copied()
                .collect()
        } else {
            Self::BASE_TAGS.to_vec()
        };
        document::reject_unknown_tags(map, &allowed)?;

        let mut resource = Self::new(PathBuf::from(document::required_str(
            map,
            tags::RELATIVE_PATH,
        )?));
        if document::window(tags::PREFIX).contains(version) {
            if let Some(prefix) = document::get(map, tags::PREFIX) {
                resource.prefix = prefix
                    .as_str()
                    .ok_or_else(|| document::malformed(tags::PREFIX))?
                    .to_owned();
            }
        }
        resource.location =
            Location::from_string(document::required_str(map, tags::LOCATION)?.to_owned());
        resource.checksum = document::required_str(map, tags::CHECKSUM)?.to_owned();
        resource.uncompressed_size = document::required_u64(map, tags::UNCOMPRESSED_SIZE)?;
        resource.compressed_size = document::required_u64(map, tags::COMPRESSED_SIZE)?;
        if document::window(tags::BINARY_OPERATION).contains(version) {
            if let Some(value) = document::optional_u64(map, tags::BINARY_OPERATION)? {
                resource.binary_operation = u32::try_from(value)
                    .map_err(|_| document::malformed(tags::BINARY_OPERATION))?;
            }
        }

        resource.kind = match type_tag {
            ResourceTypeTag::Plain => ResourceKind::Plain,
            ResourceTypeTag::Chunk => ResourceKind::Chunk,
            ResourceTypeTag::GroupEmbedded => ResourceKind::GroupEmbedded,
            ResourceTypeTag::Patch => ResourceKind::Patch(PatchRecord {
                target_relative_path: PathBuf::from(document::required_str(
                    map,
                    tags::TARGET_RELATIVE_PATH,
                )?),
                data_offset: document::required_u64(map, tags::DATA_OFFSET)?,
                source_offset: document::required_u64(map, tags::SOURCE_OFFSET)?,
                match_length: document::optional_u64(map, tags::MATCH_LENGTH)?,
            }),
        };
        Ok(resource)
    }

    /// Renders this row as a legacy CSV line.
    pub(crate) fn export_csv_line(&self) -> String {
        format!(
            "{}:/{},{},{},{},{},{}",
            self.prefix,
            self.path_string(),
            self.location.as_str(),
            self.checksum,
            self.uncompressed_size,
            self.compressed_size,
            self.binary_operation
        )
    }

    /// Parses one legacy CSV line.
    pub(crate) fn import_csv_line(line: &str) -> Result<Self> {
        let malformed = || Error::with_info(ErrorKind::MalformedResourceInput, line);

        let mut fields = line.split(',');
        let prefixed_path = fields.next().ok_or_else(malformed)?;
        let (prefix, path) = prefixed_path.split_once(":/").ok_or_else(malformed)?;

        let location = fields.next().ok_or_else(malformed)?;
        let checksum = fields.next().ok_or_else(malformed)?;
        let uncompressed: u64 = fields
            .next()
            .and_then(|value| value.parse().ok())
            .ok_or_else(malformed)?;
        let compressed: u64 = fields
            .next()
            .and_then(|value| value.parse().ok())
            .ok_or_else(malformed)?;
        let binary_operation = match fields.next() {
            None => 0,
            Some(value) => value.parse::<u32>().map_err(|_| malformed())?,
        };
        if fields.next().is_some() {
            return Err(malformed());
        }

        let mut resource = Self::new(PathBuf::from(path)).with_prefix(prefix);
        resource.location = Location::from_string(location.to_owned());
        resource.checksum = checksum.to_owned();
        resource.uncompressed_size = uncompressed;
        resource.compressed_size = compressed;
        resource.binary_operation = binary_operation;
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::CURRENT_VERSION;

    fn sample() -> ResourceInfo {
        let mut resource = ResourceInfo::new("a/foo.txt").with_prefix("res");
        resource
            .set_parameters_from_data(b"hello", true)
            .expect("parameters");
        resource.binary_operation = 7;
        resource
    }

    #[test]
    fn parameters_from_data_fill_checksum_sizes_and_location() {
        let resource = sample();
        assert_eq!(resource.checksum(), md5_hex(b"hello"));
        assert_eq!(resource.uncompressed_size(), 5);
        assert!(resource.compressed_size() > 0);
        assert!(resource
            .location()
            .as_str()
            .ends_with(&md5_hex(b"hello")));
        assert!(!resource.is_dummy());
    }

    #[test]
    fn skipping_compression_records_an_unknown_size() {
        let mut resource = ResourceInfo::new("bar.bin");
        resource
            .set_parameters_from_data(b"payload", false)
            .expect("parameters");
        assert_eq!(resource.compressed_size(), 0);
    }

    #[test]
    fn dummy_rows_have_empty_location_checksum_and_size() {
        let dummy = ResourceInfo::dummy("gone.txt");
        assert!(dummy.is_dummy());
        assert!(dummy.checksum().is_empty());
        assert_eq!(dummy.uncompressed_size(), 0);
    }

    #[test]
    fn yaml_round_trip_preserves_every_current_field() {
        let resource = sample();
        let map = resource.export_yaml(CURRENT_VERSION);
        let parsed =
            ResourceInfo::import_yaml(&map, CURRENT_VERSION, ResourceTypeTag::Plain)
                .expect("import");
        assert_eq!(parsed, resource);
    }

    #[test]
    fn yaml_export_drops_fields_newer_than_the_document() {
        let resource = sample();
        let map = resource.export_yaml(Version::new(0, 1, 0));
        assert!(document::get(&map, tags::PREFIX).is_none());
        assert!(document::get(&map, tags::BINARY_OPERATION).is_none());
        assert!(document::get(&map, tags::RELATIVE_PATH).is_some());
    }

    #[test]
    fn patch_records_round_trip_with_their_extension_fields() {
        let mut resource = ResourceInfo::new("patches/p.0").with_kind(ResourceKind::Patch(
            PatchRecord {
                target_relative_path: PathBuf::from("bar.bin"),
                data_offset: 128,
                source_offset: 64,
                match_length: Some(192),
            },
        ));
        resource.checksum = md5_hex(b"delta");
        resource.uncompressed_size = 5;
        resource.assign_location();

        let map = resource.export_yaml(CURRENT_VERSION);
        let parsed =
            ResourceInfo::import_yaml(&map, CURRENT_VERSION, ResourceTypeTag::Patch)
                .expect("import");
        assert_eq!(parsed.patch_record(), resource.patch_record());
    }

    #[test]
    fn delta_records_omit_match_length() {
        let resource = ResourceInfo::new("patches/p.1").with_kind(ResourceKind::Patch(
            PatchRecord::default(),
        ));
        let map = resource.export_yaml(CURRENT_VERSION);
        assert!(document::get(&map, tags::MATCH_LENGTH).is_none());
        let parsed =
            ResourceInfo::import_yaml(&map, CURRENT_VERSION, ResourceTypeTag::Patch)
                .expect("import");
        assert_eq!(parsed.patch_record().expect("record").match_length, None);
    }

    #[test]
    fn unknown_resource_type_is_malformed() {
        let mut map = sample().export_yaml(CURRENT_VERSION);
        map.insert(
            document::key(tags::TYPE),
            Value::String("Binary".to_owned()),
        );
        let error = ResourceInfo::import_yaml(&map, CURRENT_VERSION, ResourceTypeTag::Plain)
            .expect_err("unknown type");
        assert_eq!(error.kind(), ErrorKind::MalformedResourceGroup);
    }

    #[test]
    fn unknown_resource_tag_is_malformed() {
        let mut map = sample().export_yaml(CURRENT_VERSION);
        map.insert(document::key("Extra"), Value::Null);
        let error = ResourceInfo::import_yaml(&map, CURRENT_VERSION, ResourceTypeTag::Plain)
            .expect_err("unknown tag");
        assert_eq!(error.kind(), ErrorKind::MalformedResourceGroup);
    }

    #[test]
    fn csv_line_round_trips() {
        let resource = sample();
        let line = resource.export_csv_line();
        let parsed = ResourceInfo::import_csv_line(&line).expect("parse");
        assert_eq!(parsed, resource);
    }

    #[test]
    fn csv_line_without_binary_operation_defaults_it() {
        let parsed = ResourceInfo::import_csv_line("res:/a.txt,aa_bb,bb,5,3").expect("parse");
        assert_eq!(parsed.binary_operation(), 0);
        assert_eq!(parsed.prefix(), "res");
        assert_eq!(parsed.uncompressed_size(), 5);
    }

    #[test]
    fn csv_parse_failures_report_malformed_input() {
        for line in [
            "no-prefix-delimiter,loc,sum,1,2",
            "res:/a.txt,loc,sum,notanumber,2",
            "res:/a.txt,loc,sum,1,2,3,4",
            "res:/a.txt,loc",
        ] {
            let error = ResourceInfo::import_csv_line(line).expect_err("malformed");
            assert_eq!(error.kind(), ErrorKind::MalformedResourceInput, "{line}");
        }
    }
}
