//! Group creation from a directory tree.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use checksums::Md5Stream;
use compress::CountingGzipEncoder;
use repository::Location;
use streams::{DataReader, FileStreamIn};

use crate::error::{Error, ErrorKind, Result};
use crate::group::ResourceGroup;
use crate::params::CreateFromDirectoryParams;
use crate::progress::{ProgressKind, StatusScope};
use crate::resource::ResourceInfo;

impl ResourceGroup {
    /// Builds a plain group by scanning a directory recursively.
    ///
    /// Files below the stream threshold are loaded whole; larger files are
    /// streamed once through parallel checksum and compression accumulators.
    /// With `export_resources` set, every file is also copied to the export
    /// destination (large files are streamed a second time, because the
    /// content checksum must be known before the destination key exists).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InputDirectoryDoesntExist`],
    /// [`ErrorKind::DocumentVersionUnsupported`], or any underlying stream
    /// error.
    pub fn create_from_directory(params: &CreateFromDirectoryParams) -> Result<Self> {
        let scope = StatusScope::root(params.callbacks.clone());
        scope.update(
            ProgressKind::Percentage,
            0.0,
            10.0,
            &format!(
                "Creating resource group from directory: {}",
                params.directory.display()
            ),
        );

        if !params.directory.is_dir() {
            return Err(Error::with_info(
                ErrorKind::InputDirectoryDoesntExist,
                params.directory.display().to_string(),
            ));
        }
        if !params.output_document_version.is_valid_output() {
            return Err(Error::new(ErrorKind::DocumentVersionUnsupported));
        }

        let mut group = ResourceGroup::new_plain();
        let processing = scope.child(10.0, 90.0, "Processing files");

        let mut files = Vec::new();
        for entry in WalkDir::new(&params.directory).sort_by_file_name() {
            let entry = entry.map_err(|error| {
                Error::with_info(ErrorKind::FailedToOpenFile, error.to_string())
            })?;
            if entry.file_type().is_file() {
                files.push(entry);
            }
        }

        let step = 100.0 / files.len().max(1) as f32;
        for (index, entry) in files.iter().enumerate() {
            let file_scope = processing.child(
                step * index as f32,
                step,
                &format!("Processing file: {}", entry.path().display()),
            );

            let relative_path = entry
                .path()
                .strip_prefix(&params.directory)
                .map_err(|error| Error::with_info(ErrorKind::Fail, error.to_string()))?;
            let file_size = entry
                .metadata()
                .map_err(|error| {
                    Error::with_info(ErrorKind::FailedToOpenFile, error.to_string())
                })?
                .len();

            let resource = if file_size < params.resource_stream_threshold {
                scan_small_file(entry.path(), relative_path, params)?
            } else {
                scan_streamed_file(entry.path(), relative_path, file_size, params, &file_scope)?
            };
            group.add_resource(resource);
        }

        if !params.calculate_compressions {
            group.reset_compressed_total();
        }
        tracing::debug!(
            resources = group.number_of_resources(),
            directory = %params.directory.display(),
            "scanned directory"
        );
        Ok(group)
    }
}

fn scan_small_file(
    path: &Path,
    relative_path: &Path,
    params: &CreateFromDirectoryParams,
) -> Result<ResourceInfo> {
    let data = fs::read(path)
        .map_err(|error| Error::with_info(ErrorKind::FailedToOpenFile, error.to_string()))?;
    let mut resource = ResourceInfo::new(relative_path).with_prefix(&params.resource_prefix);
    resource.set_parameters_from_data(&data, params.calculate_compressions)?;

    if let Some(destination) = &params.export_resources {
        repository::put_data(destination, relative_path, resource.location(), &data)?;
    }
    Ok(resource)
}

fn scan_streamed_file(
    path: &Path,
    relative_path: &Path,
    file_size: u64,
    params: &CreateFromDirectoryParams,
    scope: &StatusScope<'_>,
) -> Result<ResourceInfo> {
    let buffer = usize::try_from(params.resource_stream_threshold)
        .map_err(|_| Error::new(ErrorKind::Fail))?
        .max(1);

    let mut reader = FileStreamIn::open(path, buffer)?;
    let mut hasher = Md5Stream::new();
    let mut counter = params
        .calculate_compressions
        .then(CountingGzipEncoder::new);

    while let Some(chunk) = reader.pull()? {
        if scope.requires_updates() && reader.size() > 0 {
            let percent = reader.position() as f32 * 100.0 / reader.size() as f32;
            scope.update(ProgressKind::Percentage, percent, 0.0, "Streaming file");
        }
        hasher.push(&chunk)?;
        if let Some(counter) = counter.as_mut() {
            counter.push(&chunk).map_err(|error| {
                Error::with_info(ErrorKind::FailedToCompressData, error.to_string())
            })?;
        }
    }

    let checksum = hasher.finish_and_retrieve()?;
    let compressed_size = match counter.as_mut() {
        Some(counter) => counter.finish().map_err(|error| {
            Error::with_info(ErrorKind::FailedToCompressData, error.to_string())
        })?,
        None => 0,
    };

    let mut resource = ResourceInfo::new(relative_path).with_prefix(&params.resource_prefix);
    resource.checksum = checksum;
    resource.uncompressed_size = file_size;
    resource.compressed_size = compressed_size;
    resource.location = Location::from_path_and_checksum(
        &params.resource_prefix,
        relative_path,
        &resource.checksum,
    );

    if let Some(destination) = &params.export_resources {
        // Second pass: the destination key was only known once the checksum
        // completed.
        let mut writer =
            repository::open_writer(destination, relative_path, resource.location())?;
        let mut export_reader = FileStreamIn::open(path, buffer)?;
        while let Some(chunk) = export_reader.pull()? {
            writer.push(&chunk)?;
        }
        writer.finish()?;
    }
    Ok(resource)
}
