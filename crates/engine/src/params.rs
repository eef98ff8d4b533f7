//! Parameter records for the group operations.
//!
//! Operations are configured through plain records rather than long argument
//! lists; each record carries the [`CallbackSettings`] its operation reports
//! progress through.

use std::path::PathBuf;

use repository::{ResourceDestination, ResourceSource};

use crate::progress::CallbackSettings;
use crate::version::{Version, CURRENT_VERSION};

/// Default boundary above which files are processed through streams.
pub const DEFAULT_STREAM_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Configuration of [`ResourceGroup::create_from_directory`].
///
/// [`ResourceGroup::create_from_directory`]: crate::ResourceGroup::create_from_directory
#[derive(Debug)]
pub struct CreateFromDirectoryParams {
    /// Directory to scan recursively.
    pub directory: PathBuf,
    /// Logical namespace recorded on every resource, e.g. `res`.
    pub resource_prefix: String,
    /// Files at least this large are processed through streams.
    pub resource_stream_threshold: u64,
    /// Whether gzip-compressed sizes are computed and aggregated.
    pub calculate_compressions: bool,
    /// Document version the group is intended to be exported at.
    pub output_document_version: Version,
    /// When set, every scanned file is also copied to this destination.
    pub export_resources: Option<ResourceDestination>,
    /// Progress reporting configuration.
    pub callbacks: CallbackSettings,
}

impl CreateFromDirectoryParams {
    /// Creates defaults for scanning `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            resource_prefix: String::new(),
            resource_stream_threshold: DEFAULT_STREAM_THRESHOLD,
            calculate_compressions: true,
            output_document_version: CURRENT_VERSION,
            export_resources: None,
            callbacks: CallbackSettings::default(),
        }
    }
}

/// Configuration of [`ResourceGroup::import_from_file`].
///
/// [`ResourceGroup::import_from_file`]: crate::ResourceGroup::import_from_file
#[derive(Debug)]
pub struct ImportFromFileParams {
    /// Document to read; the extension selects the format.
    pub filename: PathBuf,
    /// Progress reporting configuration.
    pub callbacks: CallbackSettings,
}

impl ImportFromFileParams {
    /// Creates defaults for importing `filename`.
    #[must_use]
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            callbacks: CallbackSettings::default(),
        }
    }
}

/// Configuration of [`ResourceGroup::export_to_file`].
///
/// [`ResourceGroup::export_to_file`]: crate::ResourceGroup::export_to_file
#[derive(Debug)]
pub struct ExportToFileParams {
    /// Destination document path.
    pub filename: PathBuf,
    /// Requested output version; `0.0.0` selects legacy CSV.
    pub output_document_version: Version,
    /// Progress reporting configuration.
    pub callbacks: CallbackSettings,
}

impl ExportToFileParams {
    /// Creates defaults for exporting to `filename` at the current version.
    #[must_use]
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            output_document_version: CURRENT_VERSION,
            callbacks: CallbackSettings::default(),
        }
    }
}

/// Configuration of [`ResourceGroup::create_bundle`].
///
/// [`ResourceGroup::create_bundle`]: crate::ResourceGroup::create_bundle
#[derive(Debug)]
pub struct BundleCreateParams {
    /// Where the group's resource payloads are read from.
    pub resource_source: ResourceSource,
    /// Where chunk payloads and the embedded group manifest are published.
    pub chunk_destination: ResourceDestination,
    /// Where the bundle manifest itself is published.
    pub bundle_manifest_destination: ResourceDestination,
    /// Manifest name of the bundled group; its stem names the chunks.
    pub group_relative_path: PathBuf,
    /// Manifest name of the produced bundle document.
    pub bundle_relative_path: PathBuf,
    /// Chunk payload size in bytes.
    pub chunk_size: u64,
    /// Read buffer for resource streaming.
    pub file_read_chunk_size: u64,
    /// Scratch directory for staged chunk artifacts.
    pub work_dir: PathBuf,
    /// Retry budget for remote sources, in seconds.
    pub download_retry_secs: u64,
    /// Progress reporting configuration.
    pub callbacks: CallbackSettings,
}

/// Configuration of [`ResourceGroup::unpack`].
///
/// [`ResourceGroup::unpack`]: crate::ResourceGroup::unpack
#[derive(Debug)]
pub struct BundleUnpackParams {
    /// Where chunk payloads and the embedded manifest are read from.
    pub chunk_source: ResourceSource,
    /// Where rebuilt resources are written.
    pub resource_destination: ResourceDestination,
    /// Retry budget for remote sources, in seconds.
    pub download_retry_secs: u64,
    /// Progress reporting configuration.
    pub callbacks: CallbackSettings,
}

/// Configuration of [`ResourceGroup::create_patch`].
///
/// [`ResourceGroup::create_patch`]: crate::ResourceGroup::create_patch
pub struct PatchCreateParams<'a> {
    /// The group clients already hold.
    pub previous_group: &'a crate::ResourceGroup,
    /// Where the previous group's payloads are read from.
    pub source_previous: ResourceSource,
    /// Where the next group's payloads are read from.
    pub source_next: ResourceSource,
    /// Where delta payloads and the embedded next manifest are published.
    pub payload_destination: ResourceDestination,
    /// Where the patch manifest itself is published.
    pub patch_manifest_destination: ResourceDestination,
    /// Manifest name of the embedded next group.
    pub group_relative_path: PathBuf,
    /// Manifest name of the produced patch document.
    pub patch_relative_path: PathBuf,
    /// Prefix of per-record payload names; records append `.<n>`.
    pub patch_file_relative_path_prefix: PathBuf,
    /// Window size for chunk matching and delta generation.
    pub max_input_file_chunk_size: u64,
    /// Scratch directory for the chunk index.
    pub index_folder: PathBuf,
    /// Whether delta payloads record compressed sizes.
    pub calculate_compressions: bool,
    /// Retry budget for remote sources, in seconds.
    pub download_retry_secs: u64,
    /// Progress reporting configuration.
    pub callbacks: CallbackSettings,
}

/// Configuration of [`ResourceGroup::apply`].
///
/// [`ResourceGroup::apply`]: crate::ResourceGroup::apply
#[derive(Debug)]
pub struct PatchApplyParams {
    /// Root of the previous group's files on disk.
    pub previous_base: PathBuf,
    /// Root the next group is materialised into; may equal `previous_base`.
    pub destination_base: PathBuf,
    /// Where delta payloads and the embedded next manifest are read from.
    pub payload_source: ResourceSource,
    /// Retry budget for remote sources, in seconds.
    pub download_retry_secs: u64,
    /// Progress reporting configuration.
    pub callbacks: CallbackSettings,
}
