#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! The resource-group engine. A [`ResourceGroup`] is a manifest describing
//! every file of a binary delivery — relative path, MD5 content checksum,
//! compressed and uncompressed sizes, and a content-derived storage location —
//! together with the operations that turn manifests into deliverable
//! artifacts:
//!
//! - [`ResourceGroup::create_from_directory`] scans a tree into a manifest;
//! - [`ResourceGroup::import_from_file`] / [`ResourceGroup::export_to_file`]
//!   move manifests through the versioned YAML document format (and the
//!   legacy read/write CSV form at version 0.0.0);
//! - [`ResourceGroup::merge`], [`ResourceGroup::diff`],
//!   [`ResourceGroup::subtraction`], and [`ResourceGroup::remove_resources`]
//!   are the set-algebraic operations;
//! - [`ResourceGroup::create_bundle`] / [`ResourceGroup::unpack`] pack a
//!   group's payloads into fixed-size content-addressed chunks and rebuild
//!   them byte-exactly;
//! - [`ResourceGroup::create_patch`] / [`ResourceGroup::apply`] compute and
//!   replay binary deltas so clients holding a previous group fetch only
//!   changed regions.
//!
//! # Design
//!
//! Group and resource polymorphism is expressed as tagged variants
//! ([`GroupKind`], [`ResourceKind`]) rather than inheritance; every
//! operation is total on the variant. Long operations stream through the
//! workspace's bounded-buffer readers and writers, report progress through
//! the [`progress::StatusScope`] tree, and return flat-kinded
//! [`Error`] values.
//!
//! # Examples
//!
//! ```no_run
//! use engine::{CreateFromDirectoryParams, ExportToFileParams, ResourceGroup};
//!
//! let group = ResourceGroup::create_from_directory(
//!     &CreateFromDirectoryParams::new("assets/"),
//! )?;
//! group.export_to_file(&ExportToFileParams::new("assets.yaml"))?;
//! # Ok::<(), engine::Error>(())
//! ```

mod bundle;
mod document;
mod error;
mod group;
mod io;
mod params;
mod patch;
/// Nested progress reporting for long operations.
pub mod progress;
mod resource;
mod scan;
mod version;

pub use error::{Error, ErrorKind, Result};
pub use group::{
    BundleExtension, DiffLists, GroupKind, GroupType, PatchExtension, ResourceGroup,
    Subtraction, DEFAULT_CHUNK_SIZE,
};
pub use params::{
    BundleCreateParams, BundleUnpackParams, CreateFromDirectoryParams, ExportToFileParams,
    ImportFromFileParams, PatchApplyParams, PatchCreateParams, DEFAULT_STREAM_THRESHOLD,
};
pub use progress::{CallbackSettings, ProgressKind, StatusCallback, StatusEvent};
pub use resource::{PatchRecord, ResourceInfo, ResourceKind};
pub use version::{Version, CURRENT_VERSION};
