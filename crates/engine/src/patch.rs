//! Patch creation and application.
//!
//! Patch creation walks the index-parallel subtraction arrays. For each
//! changed resource it builds a chunk index over the previous payload and
//! slides a fixed window over the next payload: windows found in the previous
//! file become payload-less copy records, windows that miss become bsdiff
//! delta records against the previous window at the moving source offset.
//! Application replays the records in `dataOffset` order against the previous
//! tree, rebuilding every changed or added file byte-exactly.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use chunker::{count_matching_chunks, ChunkIndex};
use repository::GetParams;
use streams::{DataReader, DataWriter, FileStreamIn, FileStreamOut};

use crate::error::{Error, ErrorKind, Result};
use crate::group::{ResourceGroup, Subtraction};
use crate::params::{PatchApplyParams, PatchCreateParams};
use crate::progress::{ProgressKind, StatusScope};
use crate::resource::{PatchRecord, ResourceInfo, ResourceKind};

fn make_patch(previous: &[u8], next: &[u8]) -> Result<Vec<u8>> {
    let mut delta = Vec::new();
    bsdiff::diff(previous, next, &mut delta)
        .map_err(|error| Error::with_info(ErrorKind::FailedToCreatePatch, error.to_string()))?;
    Ok(delta)
}

fn apply_patch(previous: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut next = Vec::new();
    bsdiff::patch(previous, &mut &delta[..], &mut next)
        .map_err(|error| Error::with_info(ErrorKind::Fail, error.to_string()))?;
    Ok(next)
}

/// Streams `len` bytes at `offset` of `stream` through an MD5 digest.
fn checksum_of_window(stream: &mut FileStreamIn, offset: u64, len: u64) -> Result<String> {
    let mut hasher = checksums::Md5Stream::new();
    let mut remaining = len;
    let mut at = offset;
    while remaining > 0 {
        let take = remaining.min(64 * 1024) as usize;
        let window = stream.read_window(at, take)?;
        if window.is_empty() {
            break;
        }
        at += window.len() as u64;
        remaining -= window.len() as u64;
        hasher.push(&window)?;
    }
    Ok(hasher.finish_and_retrieve()?)
}

struct PatchBuilder<'a> {
    patch: &'a mut ResourceGroup,
    params: &'a PatchCreateParams<'a>,
    next_id: u32,
}

impl PatchBuilder<'_> {
    fn record_name(&self) -> PathBuf {
        PathBuf::from(format!(
            "{}.{}",
            self.params.patch_file_relative_path_prefix.display(),
            self.next_id
        ))
    }

    fn push_copy(
        &mut self,
        target: &ResourceInfo,
        data_offset: u64,
        source_offset: u64,
        match_length: u64,
        previous: &mut FileStreamIn,
    ) -> Result<()> {
        let mut record = ResourceInfo::new(self.record_name()).with_kind(ResourceKind::Patch(
            PatchRecord {
                target_relative_path: target.relative_path().to_path_buf(),
                data_offset,
                source_offset,
                match_length: Some(match_length),
            },
        ));
        record.checksum = checksum_of_window(previous, source_offset, match_length)?;
        record.uncompressed_size = match_length;
        record.assign_location();
        self.patch.add_resource(record);
        self.next_id += 1;
        Ok(())
    }

    fn push_delta(
        &mut self,
        target: &ResourceInfo,
        data_offset: u64,
        source_offset: u64,
        delta: &[u8],
    ) -> Result<()> {
        let mut record = ResourceInfo::new(self.record_name()).with_kind(ResourceKind::Patch(
            PatchRecord {
                target_relative_path: target.relative_path().to_path_buf(),
                data_offset,
                source_offset,
                match_length: None,
            },
        ));
        record.set_parameters_from_data(delta, self.params.calculate_compressions)?;
        repository::put_data(
            &self.params.payload_destination,
            record.relative_path(),
            record.location(),
            delta,
        )?;
        self.patch.add_resource(record);
        self.next_id += 1;
        Ok(())
    }
}

impl ResourceGroup {
    /// Computes a patch that upgrades `previous_group` to this group.
    ///
    /// Delta payloads and the embedded next manifest are published to the
    /// payload destination; the patch manifest to its own destination. The
    /// returned group is the patch manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::PatchResourceListMismatch`] for differently-typed
    /// groups, [`ErrorKind::InvalidChunkSize`] for a zero window, and any
    /// underlying repository, index, or codec failure.
    pub fn create_patch(&self, params: &PatchCreateParams<'_>) -> Result<ResourceGroup> {
        let scope = StatusScope::root(params.callbacks.clone());
        scope.update(ProgressKind::Percentage, 0.0, 20.0, "Creating patch");

        if params.previous_group.group_type() != self.group_type() {
            return Err(Error::new(ErrorKind::PatchResourceListMismatch));
        }
        let mut patch = ResourceGroup::new_patch();
        patch.set_max_input_chunk_size(params.max_input_file_chunk_size)?;

        let subtraction = {
            let diffing = scope.child(20.0, 20.0, "Creating patch");
            self.subtraction_with_scope(params.previous_group, &diffing)?
        };
        if subtraction.previous_rows.len() != subtraction.next_rows.len() {
            return Err(Error::new(ErrorKind::UnexpectedPatchDiffEncountered));
        }

        {
            let generating = scope.child(40.0, 20.0, "Generating patches");
            let mut builder = PatchBuilder {
                patch: &mut patch,
                params,
                next_id: 0,
            };
            let step = 100.0 / subtraction.next_rows.len().max(1) as f32;
            for index in 0..subtraction.next_rows.len() {
                let previous_row = &subtraction.previous_rows[index];
                let next_row = &subtraction.next_rows[index];
                let resource_scope = generating.child(
                    step * index as f32,
                    step,
                    &format!("Creating patch for: {}", next_row.path_string()),
                );
                if previous_row.is_dummy() {
                    builder.whole_file_record(next_row, &resource_scope)?;
                } else {
                    builder.windowed_records(previous_row, next_row, &resource_scope)?;
                }
            }
        }

        patch
            .patch_extension_mut()
            .expect("freshly created patch group")
            .removed_resources = subtraction.removed_resources.clone();

        {
            let exporting = scope.child(60.0, 20.0, "Exporting resource groups");
            let next_manifest = self.subtraction_next_group(&subtraction);
            let data = next_manifest.export_yaml_string(next_manifest.version, &exporting)?;
            let mut embedded = ResourceInfo::new(&params.group_relative_path)
                .with_kind(ResourceKind::GroupEmbedded);
            embedded.set_parameters_from_data(data.as_bytes(), true)?;
            repository::put_data(
                &params.payload_destination,
                &params.group_relative_path,
                embedded.location(),
                data.as_bytes(),
            )?;
            patch
                .patch_extension_mut()
                .expect("freshly created patch group")
                .embedded_group = Some(embedded);
        }

        {
            let exporting = scope.child(80.0, 20.0, "Exporting patch group");
            let data = patch.export_yaml_string(patch.version, &exporting)?;
            let mut manifest = ResourceInfo::new(&params.patch_relative_path)
                .with_kind(ResourceKind::GroupEmbedded);
            manifest.set_parameters_from_data(data.as_bytes(), true)?;
            repository::put_data(
                &params.patch_manifest_destination,
                &params.patch_relative_path,
                manifest.location(),
                data.as_bytes(),
            )?;
        }

        Ok(patch)
    }

    fn subtraction_next_group(&self, subtraction: &Subtraction) -> ResourceGroup {
        let mut group = ResourceGroup::new_plain();
        group.version = self.version;
        for row in &subtraction.next_rows {
            group.add_resource(row.clone());
        }
        group
    }
}

impl PatchBuilder<'_> {
    /// A resource new in the next group: one delta record covering the whole
    /// file, diffed against nothing.
    fn whole_file_record(
        &mut self,
        next_row: &ResourceInfo,
        scope: &StatusScope<'_>,
    ) -> Result<()> {
        if scope.requires_updates() {
            scope.update(
                ProgressKind::Unbounded,
                0.0,
                0.0,
                &format!("Storing new resource: {}", next_row.path_string()),
            );
        }
        let data = repository::get_data(&GetParams {
            source: &self.params.source_next,
            relative_path: next_row.relative_path(),
            location: next_row.location(),
            expected_checksum: Some(next_row.checksum()),
            download_retry_secs: self.params.download_retry_secs,
        })?;
        let delta = make_patch(&[], &data)?;
        self.push_delta(next_row, 0, 0, &delta)
    }

    fn windowed_records(
        &mut self,
        previous_row: &ResourceInfo,
        next_row: &ResourceInfo,
        scope: &StatusScope<'_>,
    ) -> Result<()> {
        let window = self.params.max_input_file_chunk_size;
        let buffer = usize::try_from(window).map_err(|_| Error::new(ErrorKind::InvalidChunkSize))?;

        let mut previous = repository::open_reader(
            &GetParams {
                source: &self.params.source_previous,
                relative_path: previous_row.relative_path(),
                location: previous_row.location(),
                expected_checksum: None,
                download_retry_secs: self.params.download_retry_secs,
            },
            buffer,
        )?;
        let mut next = repository::open_reader(
            &GetParams {
                source: &self.params.source_next,
                relative_path: next_row.relative_path(),
                location: next_row.location(),
                expected_checksum: None,
                download_retry_secs: self.params.download_retry_secs,
            },
            buffer,
        )?;

        let mut index = ChunkIndex::new(previous.path(), window, &self.params.index_folder)?;
        index.generate_checksum_filter(next.path())?;
        if let Err(error) = index.generate() {
            scope.update(
                ProgressKind::Warning,
                0.0,
                0.0,
                &format!(
                    "Index generation failed for {}: {error}",
                    previous_row.path_string()
                ),
            );
            tracing::warn!(
                resource = %previous_row.path_string(),
                %error,
                "chunk index generation failed; emitting deltas only"
            );
        }

        let next_size = next.size();
        let previous_size = previous.size();
        let mut data_offset = 0u64;
        let mut patch_source_offset = 0u64;

        while data_offset < next_size {
            if scope.requires_updates() && next_size > 0 {
                let percent = data_offset as f32 * 100.0 / next_size as f32;
                scope.update(ProgressKind::Percentage, percent, 0.0, "Matching windows");
            }

            let next_window = next.read_window(data_offset, buffer)?;
            let matched = if index.is_generated() {
                index.find_matching_chunk(&next_window)?
            } else {
                None
            };

            match matched {
                Some(source_offset) => {
                    let run = 1 + count_matching_chunks(
                        next.path(),
                        data_offset + next_window.len() as u64,
                        previous.path(),
                        source_offset + window,
                        window,
                    )?;
                    let match_size = (window * run)
                        .min(previous_size - source_offset)
                        .min(next_size - data_offset);

                    // An identity prefix needs no record; apply copies the
                    // leading gap from the previous file.
                    if !(data_offset == 0 && source_offset == 0) {
                        self.push_copy(
                            next_row,
                            data_offset,
                            source_offset,
                            match_size,
                            &mut previous,
                        )?;
                    }
                    data_offset += match_size;
                    patch_source_offset = source_offset + match_size;
                }
                None => {
                    let previous_window = previous.read_window(patch_source_offset, buffer)?;
                    let delta = make_patch(&previous_window, &next_window)?;
                    self.push_delta(next_row, data_offset, patch_source_offset, &delta)?;
                    data_offset += next_window.len() as u64;
                    patch_source_offset += if previous_window.is_empty() {
                        next_window.len() as u64
                    } else {
                        previous_window.len() as u64
                    };
                }
            }
        }
        Ok(())
    }
}

impl ResourceGroup {
    /// Applies this patch to a previous tree, materialising the next tree.
    ///
    /// Removed paths are deleted from the destination, every changed or added
    /// target is rebuilt record-by-record and verified against its manifest
    /// checksum, and the embedded next manifest is copied into the
    /// destination. `destination_base` may equal `previous_base` for an
    /// in-place upgrade; targets are staged in temporary files and renamed.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::FileTypeMismatch`] on non-patch groups,
    /// [`ErrorKind::UnexpectedPatchDiffEncountered`] for malformed record
    /// coverage, and [`ErrorKind::UnexpectedChunkChecksumResult`] when a
    /// rebuilt target does not hash to its manifest checksum.
    pub fn apply(&self, params: &PatchApplyParams) -> Result<()> {
        let scope = StatusScope::root(params.callbacks.clone());
        scope.update(ProgressKind::Percentage, 0.0, 10.0, "Applying patch");

        let extension = self
            .patch_extension()
            .ok_or_else(|| Error::new(ErrorKind::FileTypeMismatch))?;
        let window = extension.max_input_chunk_size;
        if window == 0 {
            return Err(Error::new(ErrorKind::InvalidChunkSize));
        }
        let embedded = extension
            .embedded_group
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::MalformedResourceGroup))?;

        let manifest_bytes = repository::get_data(&GetParams {
            source: &params.payload_source,
            relative_path: embedded.relative_path(),
            location: embedded.location(),
            expected_checksum: Some(embedded.checksum()),
            download_retry_secs: params.download_retry_secs,
        })?;
        let manifest_text = String::from_utf8(manifest_bytes.clone())
            .map_err(|_| Error::new(ErrorKind::MalformedResourceGroup))?;
        let mut next_group = ResourceGroup::new_plain();
        {
            let importing = scope.child(10.0, 10.0, "Reading next manifest");
            next_group.import_yaml_str(&manifest_text, &importing)?;
        }

        for removed in &extension.removed_resources {
            let target = params.destination_base.join(removed);
            match fs::remove_file(&target) {
                Ok(()) => {}
                Err(error) if error.kind() == IoErrorKind::NotFound => {}
                Err(error) => {
                    return Err(Error::with_info(
                        ErrorKind::FailedToSaveFile,
                        format!("{}: {error}", target.display()),
                    ));
                }
            }
        }

        let mut records_by_target: BTreeMap<&Path, Vec<&ResourceInfo>> = BTreeMap::new();
        for record in self.resources() {
            let patch_record = record
                .patch_record()
                .ok_or_else(|| Error::new(ErrorKind::MalformedResourceGroup))?;
            records_by_target
                .entry(patch_record.target_relative_path.as_path())
                .or_default()
                .push(record);
        }
        for records in records_by_target.values_mut() {
            records.sort_by_key(|record| {
                record
                    .patch_record()
                    .expect("grouped records are patch records")
                    .data_offset
            });
        }

        {
            let rebuilding = scope.child(20.0, 70.0, "Rebuilding targets");
            let step = 100.0 / next_group.resources().len().max(1) as f32;
            for (index, target) in next_group.resources().iter().enumerate() {
                if rebuilding.requires_updates() {
                    rebuilding.update(
                        ProgressKind::Percentage,
                        step * index as f32,
                        step,
                        &format!("Rebuilding: {}", target.path_string()),
                    );
                }
                let records = records_by_target
                    .get(target.relative_path())
                    .ok_or_else(|| {
                        Error::with_info(
                            ErrorKind::UnexpectedPatchDiffEncountered,
                            target.path_string(),
                        )
                    })?;
                rebuild_target(target, records, window, params)?;
            }
        }

        let manifest_target = params.destination_base.join(embedded.relative_path());
        if let Some(parent) = manifest_target.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::with_info(ErrorKind::FailedToSaveFile, error.to_string())
            })?;
        }
        fs::write(&manifest_target, &manifest_bytes)
            .map_err(|error| Error::with_info(ErrorKind::FailedToSaveFile, error.to_string()))
    }
}

fn copy_from_previous(
    previous: &mut Option<FileStreamIn>,
    offset: u64,
    len: u64,
    hasher: &mut checksums::Md5Stream,
    writer: &mut FileStreamOut,
) -> Result<()> {
    let previous = previous
        .as_mut()
        .ok_or_else(|| Error::new(ErrorKind::UnexpectedPatchDiffEncountered))?;
    let mut remaining = len;
    let mut at = offset;
    while remaining > 0 {
        let take = remaining.min(64 * 1024) as usize;
        let window = previous.read_window(at, take)?;
        if window.is_empty() {
            return Err(Error::new(ErrorKind::UnexpectedPatchDiffEncountered));
        }
        hasher.push(&window)?;
        writer.push(&window)?;
        at += window.len() as u64;
        remaining -= window.len() as u64;
    }
    Ok(())
}

fn rebuild_target(
    target: &ResourceInfo,
    records: &[&ResourceInfo],
    window: u64,
    params: &PatchApplyParams,
) -> Result<()> {
    let previous_path = params.previous_base.join(target.relative_path());
    let mut previous = if previous_path.is_file() {
        Some(FileStreamIn::open(
            &previous_path,
            usize::try_from(window).unwrap_or(64 * 1024),
        )?)
    } else {
        None
    };

    let final_path = params.destination_base.join(target.relative_path());
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|error| Error::with_info(ErrorKind::FailedToSaveFile, error.to_string()))?;
    }
    let staging_path = final_path.with_extension("patchtmp");
    let mut writer = FileStreamOut::create(&staging_path)?;
    let mut hasher = checksums::Md5Stream::new();
    let mut written = 0u64;

    for record in records {
        let patch_record = record
            .patch_record()
            .expect("grouped records are patch records");
        if patch_record.data_offset > written {
            // Leading identity region suppressed at creation time.
            copy_from_previous(
                &mut previous,
                written,
                patch_record.data_offset - written,
                &mut hasher,
                &mut writer,
            )?;
            written = patch_record.data_offset;
        }
        if patch_record.data_offset != written {
            return Err(Error::with_info(
                ErrorKind::UnexpectedPatchDiffEncountered,
                target.path_string(),
            ));
        }

        match patch_record.match_length {
            Some(match_length) => {
                copy_from_previous(
                    &mut previous,
                    patch_record.source_offset,
                    match_length,
                    &mut hasher,
                    &mut writer,
                )?;
                written += match_length;
            }
            None => {
                let delta = repository::get_data(&GetParams {
                    source: &params.payload_source,
                    relative_path: record.relative_path(),
                    location: record.location(),
                    expected_checksum: Some(record.checksum()),
                    download_retry_secs: params.download_retry_secs,
                })?;
                let previous_window = match previous.as_mut() {
                    Some(stream) => stream.read_window(
                        patch_record.source_offset,
                        usize::try_from(window).unwrap_or(usize::MAX),
                    )?,
                    None => Vec::new(),
                };
                let rebuilt = apply_patch(&previous_window, &delta)?;
                hasher.push(&rebuilt)?;
                writer.push(&rebuilt)?;
                written += rebuilt.len() as u64;
            }
        }
    }
    writer.finish()?;

    let computed = hasher.finish_and_retrieve()?;
    if written != target.uncompressed_size() || computed != target.checksum() {
        let _ = fs::remove_file(&staging_path);
        return Err(Error::with_info(
            ErrorKind::UnexpectedChunkChecksumResult,
            target.path_string(),
        ));
    }
    fs::rename(&staging_path, &final_path).map_err(|error| {
        Error::with_info(
            ErrorKind::FailedToSaveFile,
            format!("{}: {error}", final_path.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use repository::ResourceSource;

    #[test]
    fn bsdiff_round_trips_including_empty_previous() {
        let previous = b"previous contents".to_vec();
        let next = b"next contents entirely".to_vec();
        let delta = make_patch(&previous, &next).expect("diff");
        assert_eq!(apply_patch(&previous, &delta).expect("patch"), next);

        let whole = make_patch(&[], &next).expect("diff from nothing");
        assert_eq!(apply_patch(&[], &whole).expect("patch"), next);
    }

    #[test]
    fn apply_requires_a_patch_group() {
        let plain = ResourceGroup::new_plain();
        let dir = tempfile::tempdir().expect("tempdir");
        let params = PatchApplyParams {
            previous_base: dir.path().to_path_buf(),
            destination_base: dir.path().to_path_buf(),
            payload_source: ResourceSource::LocalCdn {
                base: dir.path().to_path_buf(),
            },
            download_retry_secs: 0,
            callbacks: crate::progress::CallbackSettings::default(),
        };
        let error = plain.apply(&params).expect_err("plain group");
        assert_eq!(error.kind(), ErrorKind::FileTypeMismatch);
    }

    #[test]
    fn patching_groups_of_different_types_is_rejected() {
        let next = ResourceGroup::new_plain();
        let previous = ResourceGroup::new_bundle();
        let dir = tempfile::tempdir().expect("tempdir");
        let params = PatchCreateParams {
            previous_group: &previous,
            source_previous: ResourceSource::LocalRelative {
                base: dir.path().to_path_buf(),
            },
            source_next: ResourceSource::LocalRelative {
                base: dir.path().to_path_buf(),
            },
            payload_destination: repository::ResourceDestination::LocalCdn {
                base: dir.path().to_path_buf(),
            },
            patch_manifest_destination: repository::ResourceDestination::LocalRelative {
                base: dir.path().to_path_buf(),
            },
            group_relative_path: PathBuf::from("next.yaml"),
            patch_relative_path: PathBuf::from("patch.yaml"),
            patch_file_relative_path_prefix: PathBuf::from("patch"),
            max_input_file_chunk_size: 64,
            index_folder: dir.path().join("index"),
            calculate_compressions: true,
            download_retry_secs: 0,
            callbacks: crate::progress::CallbackSettings::default(),
        };
        let error = next.create_patch(&params).expect_err("type mismatch");
        assert_eq!(error.kind(), ErrorKind::PatchResourceListMismatch);
    }
}
