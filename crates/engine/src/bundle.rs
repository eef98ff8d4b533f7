//! Bundle creation and unpacking.

use std::fs;
use std::path::{Path, PathBuf};

use chunker::{ChunkStreamIn, ChunkStreamOut, StagedChunk};
use repository::{GetParams, ResourceDestination};
use streams::{DataReader, FileStreamIn};

use crate::error::{Error, ErrorKind, Result};
use crate::group::ResourceGroup;
use crate::params::{BundleCreateParams, BundleUnpackParams};
use crate::progress::{ProgressKind, StatusScope};
use crate::resource::{ResourceInfo, ResourceKind};

struct ChunkSink<'a> {
    bundle: &'a mut ResourceGroup,
    destination: &'a ResourceDestination,
    base_name: String,
    emitted: u64,
}

impl ChunkSink<'_> {
    fn process(&mut self, staged: &StagedChunk) -> Result<()> {
        let chunk_name = PathBuf::from(format!("{}{}.chunk", self.base_name, self.emitted));

        let mut hasher = checksums::Md5Stream::new();
        let mut reader = FileStreamIn::open(&staged.uncompressed, 64 * 1024)?;
        while let Some(chunk) = reader.pull()? {
            hasher.push(&chunk)?;
        }
        let checksum = hasher.finish_and_retrieve()?;

        let mut resource = ResourceInfo::new(&chunk_name).with_kind(ResourceKind::Chunk);
        resource.checksum = checksum;
        resource.uncompressed_size = staged.uncompressed_len;
        resource.compressed_size = staged.compressed_len;
        resource.assign_location();

        // The destination type picks which staged artifact is published:
        // remote CDNs serve the gzip member, local layouts the raw payload.
        let source_file = match self.destination {
            ResourceDestination::RemoteCdn { .. } => &staged.compressed,
            _ => &staged.uncompressed,
        };
        let target =
            repository::destination_path(self.destination, &chunk_name, resource.location());
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::with_info(ErrorKind::FailedToSaveFile, error.to_string())
            })?;
        }
        fs::copy(source_file, &target).map_err(|error| {
            Error::with_info(
                ErrorKind::FailedToSaveFile,
                format!("{}: {error}", target.display()),
            )
        })?;

        self.bundle.add_resource(resource);
        self.emitted += 1;
        Ok(())
    }

    fn drain(&mut self, chunker: &mut ChunkStreamOut, clear_cache: bool) -> Result<()> {
        while let Some(staged) = chunker.pull(clear_cache)? {
            self.process(&staged)?;
        }
        Ok(())
    }
}

impl ResourceGroup {
    /// Packs this group's resource payloads into fixed-size chunks.
    ///
    /// Chunk payloads are published to the chunk destination under their
    /// content address, this group's manifest is embedded in the produced
    /// bundle, and the bundle manifest itself is published to its own
    /// destination. The returned group is the bundle manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidChunkSize`] or any repository, stream, or
    /// chunking failure.
    pub fn create_bundle(&self, params: &BundleCreateParams) -> Result<ResourceGroup> {
        let scope = StatusScope::root(params.callbacks.clone());
        scope.update(ProgressKind::Percentage, 0.0, 5.0, "Creating bundle");

        let mut bundle = ResourceGroup::new_bundle();
        bundle.set_chunk_size(params.chunk_size)?;

        let base_name = params
            .group_relative_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut chunker = ChunkStreamOut::new(params.chunk_size, &params.work_dir)?;
        let buffer = usize::try_from(params.file_read_chunk_size.max(1))
            .map_err(|_| Error::new(ErrorKind::Fail))?;

        {
            let generating = scope.child(5.0, 75.0, "Generating chunks");
            let mut sink = ChunkSink {
                bundle: &mut bundle,
                destination: &params.chunk_destination,
                base_name,
                emitted: 0,
            };

            let step = 100.0 / self.resources().len().max(1) as f32;
            for (index, resource) in self.resources().iter().enumerate() {
                if generating.requires_updates() {
                    let message = if resource.location().is_empty() {
                        format!("No file to process: {}", resource.path_string())
                    } else {
                        format!("Processing: {}", resource.path_string())
                    };
                    generating.update(
                        ProgressKind::Percentage,
                        step * index as f32,
                        step,
                        &message,
                    );
                }
                if resource.location().is_empty() {
                    continue;
                }

                let mut reader = repository::open_reader(
                    &GetParams {
                        source: &params.resource_source,
                        relative_path: resource.relative_path(),
                        location: resource.location(),
                        expected_checksum: None,
                        download_retry_secs: params.download_retry_secs,
                    },
                    buffer,
                )?;
                while let Some(data) = reader.pull()? {
                    chunker.push(&data);
                    sink.drain(&mut chunker, false)?;
                }
            }

            // Trailing bytes become one short tail chunk.
            sink.drain(&mut chunker, true)?;
            tracing::debug!(chunks = sink.emitted, "bundle chunking complete");
        }

        {
            let exporting = scope.child(80.0, 10.0, "Exporting resource group");
            let data = self.export_yaml_string(self.version, &exporting)?;
            let mut embedded = ResourceInfo::new(&params.group_relative_path)
                .with_kind(ResourceKind::GroupEmbedded);
            embedded.set_parameters_from_data(data.as_bytes(), true)?;
            repository::put_data(
                &params.chunk_destination,
                &params.group_relative_path,
                embedded.location(),
                data.as_bytes(),
            )?;
            bundle
                .bundle_extension_mut()
                .expect("freshly created bundle group")
                .embedded_group = Some(embedded);
        }

        {
            let exporting = scope.child(90.0, 10.0, "Exporting bundle group");
            let data = bundle.export_yaml_string(bundle.version, &exporting)?;
            let mut manifest = ResourceInfo::new(&params.bundle_relative_path)
                .with_kind(ResourceKind::GroupEmbedded);
            manifest.set_parameters_from_data(data.as_bytes(), true)?;
            repository::put_data(
                &params.bundle_manifest_destination,
                &params.bundle_relative_path,
                manifest.location(),
                data.as_bytes(),
            )?;
        }

        Ok(bundle)
    }

    /// Rebuilds the bundled group's files from this bundle's chunks.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::FileTypeMismatch`] on non-bundle groups,
    /// [`ErrorKind::UnexpectedEndOfChunks`] when chunks run out mid-resource,
    /// [`ErrorKind::FailedToGenerateChecksum`] on a corrupted chunk, and
    /// [`ErrorKind::UnexpectedChunkChecksumResult`] when a rebuilt resource
    /// does not hash to its manifest checksum.
    pub fn unpack(&self, params: &BundleUnpackParams) -> Result<()> {
        let scope = StatusScope::root(params.callbacks.clone());
        scope.update(ProgressKind::Percentage, 0.0, 20.0, "Rebuilding resources");

        let extension = self
            .bundle_extension()
            .ok_or_else(|| Error::new(ErrorKind::FileTypeMismatch))?;
        let embedded = extension
            .embedded_group
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::MalformedResourceGroup))?;

        let manifest_bytes = repository::get_data(&GetParams {
            source: &params.chunk_source,
            relative_path: embedded.relative_path(),
            location: embedded.location(),
            expected_checksum: Some(embedded.checksum()),
            download_retry_secs: params.download_retry_secs,
        })?;
        let manifest_text = String::from_utf8(manifest_bytes.clone())
            .map_err(|_| Error::new(ErrorKind::MalformedResourceGroup))?;

        let mut inner = ResourceGroup::new_plain();
        {
            let importing = scope.child(20.0, 20.0, "Rebuilding resources");
            inner.import_yaml_str(&manifest_text, &importing)?;
        }

        let mut stream = ChunkStreamIn::new();
        let mut chunks = self.resources().iter();
        {
            let rebuilding = scope.child(40.0, 40.0, "Rebuilding resources");
            let step = 100.0 / inner.resources().len().max(1) as f32;
            for (index, resource) in inner.resources().iter().enumerate() {
                if rebuilding.requires_updates() {
                    let message = if resource.location().is_empty() {
                        format!("Nothing to rebuild: {}", resource.path_string())
                    } else {
                        format!("Rebuilding: {}", resource.path_string())
                    };
                    rebuilding.update(
                        ProgressKind::Percentage,
                        step * index as f32,
                        step,
                        &message,
                    );
                }
                if resource.location().is_empty() {
                    continue;
                }
                rebuild_resource(resource, params, &mut stream, &mut chunks)?;
            }
        }

        let manifest_target = repository::destination_path(
            &params.resource_destination,
            embedded.relative_path(),
            embedded.location(),
        );
        write_manifest_copy(&manifest_target, &manifest_bytes)
    }
}

fn rebuild_resource<'a>(
    resource: &ResourceInfo,
    params: &BundleUnpackParams,
    stream: &mut ChunkStreamIn,
    chunks: &mut impl Iterator<Item = &'a ResourceInfo>,
) -> Result<()> {
    let mut writer = repository::open_writer(
        &params.resource_destination,
        resource.relative_path(),
        resource.location(),
    )?;
    let mut hasher = checksums::Md5Stream::new();
    let size = resource.uncompressed_size();
    let mut written = 0u64;

    while written < size {
        if stream.cached() == 0 {
            let chunk = chunks
                .next()
                .ok_or_else(|| Error::new(ErrorKind::UnexpectedEndOfChunks))?;
            let data = repository::get_data(&GetParams {
                source: &params.chunk_source,
                relative_path: chunk.relative_path(),
                location: chunk.location(),
                expected_checksum: Some(chunk.checksum()),
                download_retry_secs: params.download_retry_secs,
            })?;
            stream.push(&data);
        }
        let take = stream.cached().min(size - written);
        let data = stream.take(take)?;
        hasher.push(&data)?;
        writer.push(&data)?;
        written += take;
    }
    writer.finish()?;

    let computed = hasher.finish_and_retrieve()?;
    if computed != resource.checksum() {
        return Err(Error::with_info(
            ErrorKind::UnexpectedChunkChecksumResult,
            resource.path_string(),
        ));
    }
    Ok(())
}

fn write_manifest_copy(target: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|error| Error::with_info(ErrorKind::FailedToSaveFile, error.to_string()))?;
    }
    fs::write(target, bytes)
        .map_err(|error| Error::with_info(ErrorKind::FailedToSaveFile, error.to_string()))
}
