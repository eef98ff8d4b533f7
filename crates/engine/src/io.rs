//! Group import and export: versioned YAML plus the legacy CSV format.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;

use serde_yaml::{Mapping, Value};

use crate::document::{self, tags};
use crate::error::{Error, ErrorKind, Result};
use crate::group::{GroupType, ResourceGroup};
use crate::params::{ExportToFileParams, ImportFromFileParams};
use crate::progress::{CallbackSettings, ProgressKind, StatusScope};
use crate::resource::{ResourceInfo, ResourceTypeTag};
use crate::version::{Version, CURRENT_VERSION};

const GROUP_BASE_TAGS: &[&str] = &[
    tags::VERSION,
    tags::TYPE,
    tags::NUMBER_OF_RESOURCES,
    tags::TOTAL_COMPRESSED,
    tags::TOTAL_UNCOMPRESSED,
    tags::RESOURCES,
];

impl ResourceGroup {
    fn allowed_group_tags(&self) -> Vec<&'static str> {
        let mut allowed = GROUP_BASE_TAGS.to_vec();
        match self.group_type() {
            GroupType::Plain => {}
            GroupType::Bundle => {
                allowed.extend([tags::RESOURCE_GROUP, tags::CHUNK_SIZE]);
            }
            GroupType::Patch => {
                allowed.extend([
                    tags::RESOURCE_GROUP,
                    tags::CHUNK_SIZE,
                    tags::REMOVED_RESOURCES,
                ]);
            }
        }
        allowed
    }

    fn default_resource_type(&self) -> ResourceTypeTag {
        match self.group_type() {
            GroupType::Plain => ResourceTypeTag::Plain,
            GroupType::Bundle => ResourceTypeTag::Chunk,
            GroupType::Patch => ResourceTypeTag::Patch,
        }
    }

    /// Imports a document from a file, dispatching on the extension.
    ///
    /// `.txt` selects the legacy CSV reader; `.yml`, `.yaml`, and
    /// extension-less files select YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::FileNotFound`], [`ErrorKind::FailedToOpenFile`],
    /// [`ErrorKind::UnsupportedFileFormat`], or any document parse error.
    pub fn import_from_file(&mut self, params: &ImportFromFileParams) -> Result<()> {
        let scope = StatusScope::root(params.callbacks.clone());
        scope.update(
            ProgressKind::Percentage,
            0.0,
            20.0,
            "Importing resource group from file",
        );

        if params.filename.as_os_str().is_empty() {
            return Err(Error::new(ErrorKind::FileNotFound));
        }
        let data = fs::read_to_string(&params.filename).map_err(|error| {
            let kind = if error.kind() == IoErrorKind::NotFound {
                ErrorKind::FileNotFound
            } else {
                ErrorKind::FailedToOpenFile
            };
            Error::with_info(kind, params.filename.display().to_string())
        })?;

        let nested = scope.child(20.0, 80.0, "Importing resource group from file");
        match params.filename.extension().and_then(|ext| ext.to_str()) {
            Some("txt") => self.import_csv(&data, &nested),
            Some("yml" | "yaml") | None => self.import_yaml_str(&data, &nested),
            Some(_) => Err(Error::new(ErrorKind::UnsupportedFileFormat)),
        }
    }

    /// Imports a YAML document from a string.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::FailedToParseYaml`] or any schema violation.
    pub fn import_from_data(&mut self, data: &str, callbacks: &CallbackSettings) -> Result<()> {
        let scope = StatusScope::root(callbacks.clone());
        self.import_yaml_str(data, &scope)
    }

    fn import_csv(&mut self, data: &str, scope: &StatusScope<'_>) -> Result<()> {
        scope.update(
            ProgressKind::Percentage,
            0.0,
            10.0,
            "Importing resource group from CSV file",
        );
        let nested = scope.child(10.0, 90.0, "Importing resource group from CSV file");
        for line in data.lines() {
            if line.is_empty() {
                continue;
            }
            let resource = ResourceInfo::import_csv_line(line)?;
            if nested.requires_updates() {
                nested.update(
                    ProgressKind::Unbounded,
                    0.0,
                    0.0,
                    &format!("Imported resource: {}", resource.path_string()),
                );
            }
            self.add_resource(resource);
        }
        // Reading the legacy format upgrades the document to the first
        // YAML-capable version.
        self.version = Version::new(0, 1, 0);
        Ok(())
    }

    pub(crate) fn import_yaml_str(
        &mut self,
        data: &str,
        scope: &StatusScope<'_>,
    ) -> Result<()> {
        let value: Value = serde_yaml::from_str(data)
            .map_err(|error| Error::with_info(ErrorKind::FailedToParseYaml, error.to_string()))?;
        let map = value
            .as_mapping()
            .ok_or_else(|| Error::new(ErrorKind::MalformedResourceGroup))?;
        self.import_yaml(map, scope)
    }

    fn import_yaml(&mut self, map: &Mapping, scope: &StatusScope<'_>) -> Result<()> {
        scope.update(ProgressKind::Percentage, 0.0, 30.0, "Importing from YAML");

        let type_text = document::required_str(map, tags::TYPE)?;
        if type_text != self.group_type().type_id() {
            return Err(Error::with_info(ErrorKind::FileTypeMismatch, type_text));
        }

        let version_text = document::required_str(map, tags::VERSION)?;
        let mut version =
            Version::parse(version_text).ok_or_else(|| document::malformed(tags::VERSION))?;
        if version.major > CURRENT_VERSION.major {
            return Err(Error::with_info(
                ErrorKind::DocumentVersionUnsupported,
                version_text,
            ));
        }
        if version > CURRENT_VERSION {
            scope.update(
                ProgressKind::Warning,
                0.0,
                0.0,
                "Document version is newer than this engine supports; some data may be lost",
            );
            tracing::warn!(document = version_text, engine = %CURRENT_VERSION, "ceiling document version");
            version = CURRENT_VERSION;
        }
        self.version = version;

        document::reject_unknown_tags(map, &self.allowed_group_tags())?;

        if document::window(tags::NUMBER_OF_RESOURCES).contains(version) {
            document::required_u64(map, tags::NUMBER_OF_RESOURCES)?;
        }
        if document::window(tags::TOTAL_UNCOMPRESSED).contains(version) {
            document::required_u64(map, tags::TOTAL_UNCOMPRESSED)?;
        }
        if document::optional_u64(map, tags::TOTAL_COMPRESSED)?.is_none() {
            self.reset_compressed_total();
        }

        self.import_specialised_yaml(map, version)?;

        let Some(resources) = document::get(map, tags::RESOURCES) else {
            if document::window(tags::RESOURCES).contains(version) {
                return Err(document::malformed(tags::RESOURCES));
            }
            return Ok(());
        };
        let resources = resources
            .as_sequence()
            .ok_or_else(|| document::malformed(tags::RESOURCES))?;

        let nested = scope.child(30.0, 70.0, "Processing resources");
        let default_type = self.default_resource_type();
        for (index, entry) in resources.iter().enumerate() {
            let entry = entry
                .as_mapping()
                .ok_or_else(|| document::malformed(tags::RESOURCES))?;
            let resource = ResourceInfo::import_yaml(entry, version, default_type)?;
            if self.group_type() != GroupType::Plain && resource.type_tag() != default_type {
                return Err(Error::with_info(
                    ErrorKind::MalformedResourceGroup,
                    format!(
                        "{} group cannot hold {} resources",
                        self.group_type().type_id(),
                        resource.type_tag().as_str()
                    ),
                ));
            }
            if nested.requires_updates() {
                let step = 100.0 / resources.len() as f32;
                nested.update(
                    ProgressKind::Percentage,
                    step * index as f32,
                    step,
                    &format!("Adding resource: {}", resource.path_string()),
                );
            }
            self.add_resource(resource);
        }
        Ok(())
    }

    fn import_specialised_yaml(&mut self, map: &Mapping, version: Version) -> Result<()> {
        match self.group_type() {
            GroupType::Plain => Ok(()),
            GroupType::Bundle => {
                let embedded = import_embedded_group(map, version)?;
                let chunk_size = if document::window(tags::CHUNK_SIZE).contains(version) {
                    document::required_u64(map, tags::CHUNK_SIZE)?
                } else {
                    0
                };
                let extension = self
                    .bundle_extension_mut()
                    .expect("bundle groups carry a bundle extension");
                extension.embedded_group = embedded;
                if chunk_size > 0 {
                    extension.chunk_size = chunk_size;
                }
                Ok(())
            }
            GroupType::Patch => {
                let embedded = import_embedded_group(map, version)?;
                let chunk_size = if document::window(tags::CHUNK_SIZE).contains(version) {
                    document::required_u64(map, tags::CHUNK_SIZE)?
                } else {
                    0
                };
                let removed = if document::window(tags::REMOVED_RESOURCES).contains(version) {
                    let sequence = document::get(map, tags::REMOVED_RESOURCES)
                        .and_then(Value::as_sequence)
                        .ok_or_else(|| document::malformed(tags::REMOVED_RESOURCES))?;
                    sequence
                        .iter()
                        .map(|value| {
                            value
                                .as_str()
                                .map(PathBuf::from)
                                .ok_or_else(|| document::malformed(tags::REMOVED_RESOURCES))
                        })
                        .collect::<Result<Vec<_>>>()?
                } else {
                    Vec::new()
                };
                let extension = self
                    .patch_extension_mut()
                    .expect("patch groups carry a patch extension");
                extension.embedded_group = embedded;
                extension.max_input_chunk_size = chunk_size;
                extension.removed_resources = removed;
                Ok(())
            }
        }
    }

    /// Exports the group to a file.
    ///
    /// An output version of `0.0.0` selects the legacy CSV format; anything
    /// else produces YAML at the requested version clamped to the document's
    /// own version and the engine's current version.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::DocumentVersionUnsupported`],
    /// [`ErrorKind::UnsupportedFileFormat`], or
    /// [`ErrorKind::FailedToSaveFile`].
    pub fn export_to_file(&self, params: &ExportToFileParams) -> Result<()> {
        let scope = StatusScope::root(params.callbacks.clone());
        scope.update(
            ProgressKind::Percentage,
            0.0,
            10.0,
            &format!("Exporting resource group to file: {}", params.filename.display()),
        );

        let data = {
            let nested = scope.child(10.0, 90.0, "Rendering document");
            if params.output_document_version == Version::ZERO {
                self.export_csv(&nested)?
            } else {
                self.export_yaml_string(params.output_document_version, &nested)?
            }
        };

        if let Some(parent) = params.filename.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|error| {
                    Error::with_info(ErrorKind::FailedToSaveFile, error.to_string())
                })?;
            }
        }
        fs::write(&params.filename, data).map_err(|error| {
            Error::with_info(
                ErrorKind::FailedToSaveFile,
                format!("{}: {error}", params.filename.display()),
            )
        })
    }

    /// Renders the group as a YAML document at its own version.
    ///
    /// # Errors
    ///
    /// Returns any rendering failure.
    pub fn export_to_data(&self, callbacks: &CallbackSettings) -> Result<String> {
        let scope = StatusScope::root(callbacks.clone());
        self.export_yaml_string(self.version, &scope)
    }

    pub(crate) fn export_yaml_string(
        &self,
        requested: Version,
        scope: &StatusScope<'_>,
    ) -> Result<String> {
        scope.update(ProgressKind::Percentage, 0.0, 20.0, "Exporting YAML");

        if !requested.is_valid_output() {
            return Err(Error::with_info(
                ErrorKind::DocumentVersionUnsupported,
                requested.to_string(),
            ));
        }
        let version = requested.min(self.version).min(CURRENT_VERSION);

        let mut map = Mapping::new();
        map.insert(
            document::key(tags::VERSION),
            Value::String(version.to_string()),
        );
        document::emit(
            &mut map,
            tags::TYPE,
            version,
            Value::String(self.group_type().type_id().to_owned()),
        );
        document::emit(
            &mut map,
            tags::NUMBER_OF_RESOURCES,
            version,
            Value::from(self.number_of_resources()),
        );
        if let Some(total_compressed) = self.total_compressed() {
            document::emit(
                &mut map,
                tags::TOTAL_COMPRESSED,
                version,
                Value::from(total_compressed),
            );
        }
        document::emit(
            &mut map,
            tags::TOTAL_UNCOMPRESSED,
            version,
            Value::from(self.total_uncompressed()),
        );

        self.export_specialised_yaml(&mut map, version);

        if document::window(tags::RESOURCES).contains(version) {
            let nested = scope.child(20.0, 80.0, "Exporting resources");
            let mut rows = Vec::with_capacity(self.resources().len());
            for (index, resource) in self.resources().iter().enumerate() {
                if nested.requires_updates() {
                    let step = 100.0 / self.resources().len() as f32;
                    nested.update(
                        ProgressKind::Percentage,
                        step * index as f32,
                        step,
                        &format!("Exporting: {}", resource.path_string()),
                    );
                }
                rows.push(Value::Mapping(resource.export_yaml(version)));
            }
            map.insert(document::key(tags::RESOURCES), Value::Sequence(rows));
        }

        serde_yaml::to_string(&Value::Mapping(map))
            .map_err(|error| Error::with_info(ErrorKind::Fail, error.to_string()))
    }

    fn export_specialised_yaml(&self, map: &mut Mapping, version: Version) {
        match self.kind() {
            crate::group::GroupKind::Plain => {}
            crate::group::GroupKind::Bundle(extension) => {
                if let Some(embedded) = &extension.embedded_group {
                    document::emit(
                        map,
                        tags::RESOURCE_GROUP,
                        version,
                        Value::Mapping(embedded.export_yaml(version)),
                    );
                }
                document::emit(
                    map,
                    tags::CHUNK_SIZE,
                    version,
                    Value::from(extension.chunk_size),
                );
            }
            crate::group::GroupKind::Patch(extension) => {
                if let Some(embedded) = &extension.embedded_group {
                    document::emit(
                        map,
                        tags::RESOURCE_GROUP,
                        version,
                        Value::Mapping(embedded.export_yaml(version)),
                    );
                }
                document::emit(
                    map,
                    tags::CHUNK_SIZE,
                    version,
                    Value::from(extension.max_input_chunk_size),
                );
                document::emit(
                    map,
                    tags::REMOVED_RESOURCES,
                    version,
                    Value::Sequence(
                        extension
                            .removed_resources
                            .iter()
                            .map(|path| Value::String(repository::manifest_path(path)))
                            .collect(),
                    ),
                );
            }
        }
    }

    fn export_csv(&self, scope: &StatusScope<'_>) -> Result<String> {
        scope.update(ProgressKind::Percentage, 0.0, 10.0, "Exporting to CSV");
        if self.group_type() != GroupType::Plain {
            return Err(Error::with_info(
                ErrorKind::UnsupportedFileFormat,
                "only plain resource groups have a CSV form",
            ));
        }

        let mut rows: Vec<&ResourceInfo> = self.resources().iter().collect();
        rows.sort_by_key(|resource| resource.path_string());

        let nested = scope.child(10.0, 90.0, "Exporting to CSV");
        let mut out = String::new();
        for (index, resource) in rows.iter().enumerate() {
            if nested.requires_updates() {
                let step = 100.0 / rows.len() as f32;
                nested.update(ProgressKind::Percentage, step * index as f32, step, "Exporting");
            }
            out.push_str(&resource.export_csv_line());
            out.push('\n');
        }
        Ok(out)
    }
}

fn import_embedded_group(map: &Mapping, version: Version) -> Result<Option<ResourceInfo>> {
    if !document::window(tags::RESOURCE_GROUP).contains(version) {
        return Ok(None);
    }
    let embedded = document::get(map, tags::RESOURCE_GROUP)
        .and_then(Value::as_mapping)
        .ok_or_else(|| document::malformed(tags::RESOURCE_GROUP))?;
    let resource = ResourceInfo::import_yaml(embedded, version, ResourceTypeTag::GroupEmbedded)?;
    if resource.type_tag() != ResourceTypeTag::GroupEmbedded {
        return Err(document::malformed(tags::RESOURCE_GROUP));
    }
    Ok(Some(resource))
}
