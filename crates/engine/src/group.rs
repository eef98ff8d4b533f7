//! The resource-group aggregate.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind, Result};
use crate::progress::{CallbackSettings, ProgressKind, StatusScope};
use crate::resource::ResourceInfo;
use crate::version::{Version, CURRENT_VERSION};

/// Default chunk size of freshly created bundle groups.
pub const DEFAULT_CHUNK_SIZE: u64 = 1000;

/// Discriminant of a group's document type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GroupType {
    /// An ordinary delivery manifest.
    Plain,
    /// A manifest of chunk resources plus an embedded parent group.
    Bundle,
    /// A manifest of patch records plus an embedded next group.
    Patch,
}

impl GroupType {
    /// Document `Type` value of this group type.
    #[must_use]
    pub fn type_id(self) -> &'static str {
        match self {
            Self::Plain => "ResourceGroup",
            Self::Bundle => "BundleGroup",
            Self::Patch => "PatchGroup",
        }
    }
}

/// Extension record of bundle groups.
#[derive(Clone, Debug, PartialEq)]
pub struct BundleExtension {
    /// Payload size of every chunk except the tail.
    pub chunk_size: u64,
    /// The bundled group's manifest, stored as a resource.
    pub embedded_group: Option<ResourceInfo>,
}

impl Default for BundleExtension {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            embedded_group: None,
        }
    }
}

/// Extension record of patch groups.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatchExtension {
    /// Window size used for matching and delta generation.
    pub max_input_chunk_size: u64,
    /// The next group's manifest, stored as a resource.
    pub embedded_group: Option<ResourceInfo>,
    /// Paths deleted when the patch is applied.
    pub removed_resources: Vec<PathBuf>,
}

/// Per-kind payload of a group.
#[derive(Clone, Debug, PartialEq)]
pub enum GroupKind {
    /// An ordinary delivery manifest.
    Plain,
    /// A bundle manifest with its extension record.
    Bundle(BundleExtension),
    /// A patch manifest with its extension record.
    Patch(PatchExtension),
}

/// Output of [`ResourceGroup::subtraction`].
///
/// Both arrays have the same length; position `i` pairs the previous and next
/// entries of the `i`-th potentially-changed resource, with dummy rows
/// padding additions. This index-parallel discipline is what patch creation
/// walks.
#[derive(Clone, Debug, Default)]
pub struct Subtraction {
    /// Previous-side rows; dummies mark resources new in the next group.
    pub previous_rows: Vec<ResourceInfo>,
    /// Next-side rows for every changed or added resource.
    pub next_rows: Vec<ResourceInfo>,
    /// Paths present previously and gone from the next group.
    pub removed_resources: Vec<PathBuf>,
}

/// Additions and removals between two groups, as path lists.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiffLists {
    /// Paths present here and changed or absent in the other group.
    pub additions: Vec<PathBuf>,
    /// Paths present in the other group and absent here.
    pub removals: Vec<PathBuf>,
}

/// A manifest of content-addressed resources.
///
/// Resources keep their insertion order for serialization but behave as a set
/// keyed by `(relativePath, checksum)` under the set operations. Aggregate
/// counters are maintained on every add and remove.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceGroup {
    pub(crate) version: Version,
    pub(crate) kind: GroupKind,
    pub(crate) resources: Vec<ResourceInfo>,
    pub(crate) total_uncompressed: u64,
    pub(crate) compressed_sum: u64,
    pub(crate) unknown_compressed: usize,
    pub(crate) compressed_reset: bool,
}

impl Default for ResourceGroup {
    fn default() -> Self {
        Self::new_plain()
    }
}

impl ResourceGroup {
    /// Creates an empty group of the given kind at the current version.
    #[must_use]
    pub fn new(kind: GroupKind) -> Self {
        Self {
            version: CURRENT_VERSION,
            kind,
            resources: Vec::new(),
            total_uncompressed: 0,
            compressed_sum: 0,
            unknown_compressed: 0,
            compressed_reset: false,
        }
    }

    /// Creates an empty plain group.
    #[must_use]
    pub fn new_plain() -> Self {
        Self::new(GroupKind::Plain)
    }

    /// Creates an empty bundle group with the default chunk size.
    #[must_use]
    pub fn new_bundle() -> Self {
        Self::new(GroupKind::Bundle(BundleExtension::default()))
    }

    /// Creates an empty patch group.
    #[must_use]
    pub fn new_patch() -> Self {
        Self::new(GroupKind::Patch(PatchExtension::default()))
    }

    /// Document type of this group.
    #[must_use]
    pub fn group_type(&self) -> GroupType {
        match &self.kind {
            GroupKind::Plain => GroupType::Plain,
            GroupKind::Bundle(_) => GroupType::Bundle,
            GroupKind::Patch(_) => GroupType::Patch,
        }
    }

    /// Per-kind payload of this group.
    #[must_use]
    pub fn kind(&self) -> &GroupKind {
        &self.kind
    }

    /// Bundle extension record, when this is a bundle group.
    #[must_use]
    pub fn bundle_extension(&self) -> Option<&BundleExtension> {
        match &self.kind {
            GroupKind::Bundle(extension) => Some(extension),
            _ => None,
        }
    }

    /// Patch extension record, when this is a patch group.
    #[must_use]
    pub fn patch_extension(&self) -> Option<&PatchExtension> {
        match &self.kind {
            GroupKind::Patch(extension) => Some(extension),
            _ => None,
        }
    }

    pub(crate) fn bundle_extension_mut(&mut self) -> Option<&mut BundleExtension> {
        match &mut self.kind {
            GroupKind::Bundle(extension) => Some(extension),
            _ => None,
        }
    }

    pub(crate) fn patch_extension_mut(&mut self) -> Option<&mut PatchExtension> {
        match &mut self.kind {
            GroupKind::Patch(extension) => Some(extension),
            _ => None,
        }
    }

    /// Sets the chunk size of a bundle group.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidChunkSize`] for zero and
    /// [`ErrorKind::FileTypeMismatch`] on non-bundle groups.
    pub fn set_chunk_size(&mut self, chunk_size: u64) -> Result<()> {
        if chunk_size == 0 {
            return Err(Error::new(ErrorKind::InvalidChunkSize));
        }
        self.bundle_extension_mut()
            .ok_or_else(|| Error::new(ErrorKind::FileTypeMismatch))?
            .chunk_size = chunk_size;
        Ok(())
    }

    /// Sets the matching window size of a patch group.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidChunkSize`] for zero and
    /// [`ErrorKind::FileTypeMismatch`] on non-patch groups.
    pub fn set_max_input_chunk_size(&mut self, size: u64) -> Result<()> {
        if size == 0 {
            return Err(Error::new(ErrorKind::InvalidChunkSize));
        }
        self.patch_extension_mut()
            .ok_or_else(|| Error::new(ErrorKind::FileTypeMismatch))?
            .max_input_chunk_size = size;
        Ok(())
    }

    /// Document schema version of this group.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Sets the document version, ceiling it to the engine's current one.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::DocumentVersionUnsupported`] when the major line
    /// exceeds the engine's.
    pub fn set_document_version(&mut self, version: Version) -> Result<()> {
        if version.major > CURRENT_VERSION.major {
            return Err(Error::new(ErrorKind::DocumentVersionUnsupported));
        }
        self.version = version.min(CURRENT_VERSION);
        Ok(())
    }

    /// Manifest rows in insertion order.
    #[must_use]
    pub fn resources(&self) -> &[ResourceInfo] {
        &self.resources
    }

    /// Number of manifest rows.
    #[must_use]
    pub fn number_of_resources(&self) -> u64 {
        self.resources.len() as u64
    }

    /// Reports whether the group holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Sum of all uncompressed payload sizes.
    #[must_use]
    pub fn total_uncompressed(&self) -> u64 {
        self.total_uncompressed
    }

    /// Sum of compressed payload sizes, when every member has one.
    #[must_use]
    pub fn total_compressed(&self) -> Option<u64> {
        if self.compressed_reset || self.unknown_compressed > 0 {
            None
        } else {
            Some(self.compressed_sum)
        }
    }

    /// Adds a row, updating the aggregate counters.
    pub fn add_resource(&mut self, resource: ResourceInfo) {
        self.total_uncompressed += resource.uncompressed_size();
        if resource.uncompressed_size() > 0 && resource.compressed_size() == 0 {
            self.unknown_compressed += 1;
        } else {
            self.compressed_sum += resource.compressed_size();
        }
        self.resources.push(resource);
    }

    /// Marks the compressed aggregate as never computed.
    pub(crate) fn reset_compressed_total(&mut self) {
        self.compressed_reset = true;
    }

    /// Finds a row by relative path; checksums are not consulted.
    #[must_use]
    pub fn find_by_path(&self, relative_path: &Path) -> Option<&ResourceInfo> {
        self.resources
            .iter()
            .find(|resource| resource.relative_path() == relative_path)
    }

    fn remove_at(&mut self, index: usize) {
        let resource = self.resources.remove(index);
        self.total_uncompressed -= resource.uncompressed_size();
        if resource.uncompressed_size() > 0 && resource.compressed_size() == 0 {
            self.unknown_compressed -= 1;
        } else {
            self.compressed_sum -= resource.compressed_size();
        }
    }

    /// Removes the named rows, matching by relative path only.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ResourceNotFound`] for the first missing path
    /// when `error_if_resource_not_found` is set; otherwise missing paths are
    /// skipped.
    pub fn remove_resources(
        &mut self,
        resources_to_remove: &[PathBuf],
        error_if_resource_not_found: bool,
        callbacks: &CallbackSettings,
    ) -> Result<()> {
        let scope = StatusScope::root(callbacks.clone());
        scope.update(
            ProgressKind::Percentage,
            0.0,
            5.0,
            "Removing resources from resource group",
        );
        let nested = scope.child(5.0, 95.0, "Removing resources from resource group");

        for (index, relative_path) in resources_to_remove.iter().enumerate() {
            if nested.requires_updates() {
                let step = 100.0 / resources_to_remove.len() as f32;
                nested.update(
                    ProgressKind::Percentage,
                    step * index as f32,
                    step,
                    &format!("Removing resource: {}", relative_path.display()),
                );
            }
            let found = self
                .resources
                .iter()
                .position(|resource| resource.relative_path() == relative_path);
            match found {
                Some(position) => self.remove_at(position),
                None if error_if_resource_not_found => {
                    return Err(Error::with_info(
                        ErrorKind::ResourceNotFound,
                        relative_path.display().to_string(),
                    ));
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Deep-copies the union of `self` and `other` into `target`.
    ///
    /// The union is keyed by `(relativePath, checksum)`; rows identical under
    /// that key appear once.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` mirrors the other set operations.
    pub fn merge(
        &self,
        other: &ResourceGroup,
        target: &mut ResourceGroup,
        callbacks: &CallbackSettings,
    ) -> Result<()> {
        let scope = StatusScope::root(callbacks.clone());
        scope.update(ProgressKind::Percentage, 0.0, 20.0, "Merging resource groups");

        let mut rows: Vec<&ResourceInfo> =
            self.resources.iter().chain(other.resources.iter()).collect();
        rows.sort_by_key(|resource| resource.sort_key());
        rows.dedup_by(|a, b| a.same_identity(b));

        let nested = scope.child(20.0, 80.0, "Merging resource groups");
        for (index, resource) in rows.iter().enumerate() {
            if nested.requires_updates() {
                let step = 100.0 / rows.len() as f32;
                nested.update(
                    ProgressKind::Percentage,
                    step * index as f32,
                    step,
                    "Merging resource",
                );
            }
            target.add_resource((*resource).clone());
        }
        Ok(())
    }

    /// Pairs this group (the *next* state) against `previous`.
    ///
    /// Inputs are walked in `(relativePath, checksum)` order. Resources whose
    /// checksum changed contribute a row to both arrays; resources new here
    /// are paired with a dummy; paths gone from here accumulate as removals.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` mirrors the original interface.
    pub fn subtraction(
        &self,
        previous: &ResourceGroup,
        callbacks: &CallbackSettings,
    ) -> Result<Subtraction> {
        let scope = StatusScope::root(callbacks.clone());
        self.subtraction_with_scope(previous, &scope)
    }

    pub(crate) fn subtraction_with_scope(
        &self,
        previous: &ResourceGroup,
        scope: &StatusScope<'_>,
    ) -> Result<Subtraction> {
        scope.update(
            ProgressKind::Percentage,
            0.0,
            20.0,
            "Calculating diff between two resource groups",
        );

        let mut next_sorted: Vec<&ResourceInfo> = self.resources.iter().collect();
        next_sorted.sort_by_key(|resource| resource.sort_key());
        let mut previous_sorted: Vec<&ResourceInfo> = previous.resources.iter().collect();
        previous_sorted.sort_by_key(|resource| resource.sort_key());

        let previous_by_path: HashMap<&Path, &ResourceInfo> = previous_sorted
            .iter()
            .map(|resource| (resource.relative_path(), *resource))
            .collect();
        let next_paths: HashSet<&Path> = next_sorted
            .iter()
            .map(|resource| resource.relative_path())
            .collect();

        let mut outcome = Subtraction::default();

        let pairing = scope.child(20.0, 40.0, "Pairing changed resources");
        for (index, resource) in next_sorted.iter().enumerate() {
            if pairing.requires_updates() {
                let step = 100.0 / next_sorted.len() as f32;
                pairing.update(
                    ProgressKind::Percentage,
                    step * index as f32,
                    step,
                    &format!("Processing: {}", resource.path_string()),
                );
            }
            match previous_by_path.get(resource.relative_path()) {
                Some(previous_resource) => {
                    if previous_resource.checksum() != resource.checksum() {
                        outcome.next_rows.push((*resource).clone());
                        outcome.previous_rows.push((*previous_resource).clone());
                    }
                }
                None => {
                    // Dummy rows keep both arrays the same length, which is
                    // what lets patch creation walk them index-parallel.
                    outcome.next_rows.push((*resource).clone());
                    outcome
                        .previous_rows
                        .push(ResourceInfo::dummy(resource.relative_path()));
                }
            }
        }
        drop(pairing);

        let removals = scope.child(60.0, 40.0, "Collecting removed resources");
        for (index, resource) in previous_sorted.iter().enumerate() {
            if removals.requires_updates() {
                let step = 100.0 / previous_sorted.len() as f32;
                removals.update(
                    ProgressKind::Percentage,
                    step * index as f32,
                    step,
                    &format!("Processing removed resource: {}", resource.path_string()),
                );
            }
            if !next_paths.contains(resource.relative_path()) {
                outcome
                    .removed_resources
                    .push(resource.relative_path().to_path_buf());
            }
        }
        Ok(outcome)
    }

    /// Computes additions and removals against `other`, as path lists.
    ///
    /// Additions are paths present here and changed or absent in `other`;
    /// removals are paths no longer present here at all.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` mirrors the original interface.
    pub fn diff(
        &self,
        other: &ResourceGroup,
        callbacks: &CallbackSettings,
    ) -> Result<DiffLists> {
        let scope = StatusScope::root(callbacks.clone());
        scope.update(ProgressKind::Percentage, 0.0, 20.0, "Diffing changes as lists");
        let outcome = {
            let nested = scope.child(20.0, 60.0, "Diffing changes as lists");
            self.subtraction_with_scope(other, &nested)?
        };
        Ok(DiffLists {
            additions: outcome
                .next_rows
                .iter()
                .map(|resource| resource.relative_path().to_path_buf())
                .collect(),
            removals: outcome.removed_resources,
        })
    }
}
