//! Manifest document round-trips through the filesystem.

mod util;

use std::fs;
use std::path::PathBuf;

use engine::progress::CallbackSettings;
use engine::{
    ErrorKind, ExportToFileParams, ImportFromFileParams, ResourceGroup, Version,
};

#[test]
fn scanned_group_survives_an_export_import_cycle() {
    let source = tempfile::tempdir().expect("source dir");
    util::write_tree(
        source.path(),
        &[
            ("a/foo.txt", b"hello".to_vec()),
            ("bar.bin", util::pseudo_bytes(256, 5)),
        ],
    );
    let group = util::scan(source.path());

    let out = tempfile::tempdir().expect("out dir");
    let manifest = out.path().join("out.yaml");
    group
        .export_to_file(&ExportToFileParams::new(&manifest))
        .expect("export");

    let mut imported = ResourceGroup::new_plain();
    imported
        .import_from_file(&ImportFromFileParams::new(&manifest))
        .expect("import");

    assert_eq!(imported.resources(), group.resources());
    assert_eq!(imported.version(), group.version());
    assert_eq!(imported.number_of_resources(), group.number_of_resources());
    assert_eq!(imported.total_uncompressed(), group.total_uncompressed());
    assert_eq!(imported.total_compressed(), group.total_compressed());
}

#[test]
fn removal_with_a_missing_path_honours_the_error_flag() {
    let source = tempfile::tempdir().expect("source dir");
    util::write_tree(
        source.path(),
        &[
            ("a/foo.txt", b"hello".to_vec()),
            ("bar.bin", util::pseudo_bytes(256, 6)),
        ],
    );

    let mut strict = util::scan(source.path());
    let error = strict
        .remove_resources(
            &[PathBuf::from("a/foo.txt"), PathBuf::from("nonexistent")],
            true,
            &CallbackSettings::default(),
        )
        .expect_err("strict removal");
    assert_eq!(error.kind(), ErrorKind::ResourceNotFound);

    let mut lenient = util::scan(source.path());
    lenient
        .remove_resources(
            &[PathBuf::from("a/foo.txt"), PathBuf::from("nonexistent")],
            false,
            &CallbackSettings::default(),
        )
        .expect("lenient removal");
    assert_eq!(lenient.number_of_resources(), 1);
}

#[test]
fn requested_output_version_is_clamped_to_the_document() {
    let source = tempfile::tempdir().expect("source dir");
    util::write_tree(source.path(), &[("a.txt", b"payload".to_vec())]);
    let group = util::scan(source.path());

    let out = tempfile::tempdir().expect("out dir");
    let manifest = out.path().join("clamped.yaml");
    group
        .export_to_file(&ExportToFileParams {
            filename: manifest.clone(),
            output_document_version: Version::new(0, 3, 0),
            callbacks: CallbackSettings::default(),
        })
        .expect("export");

    let text = fs::read_to_string(&manifest).expect("read manifest");
    assert!(text.contains("Version: 0.2.0"), "{text}");
}

#[test]
fn legacy_csv_export_is_plain_groups_only() {
    let source = tempfile::tempdir().expect("source dir");
    util::write_tree(source.path(), &[("a.txt", b"payload".to_vec())]);
    let group = util::scan(source.path());

    let out = tempfile::tempdir().expect("out dir");
    let legacy = out.path().join("legacy.txt");
    group
        .export_to_file(&ExportToFileParams {
            filename: legacy.clone(),
            output_document_version: Version::ZERO,
            callbacks: CallbackSettings::default(),
        })
        .expect("csv export");

    let mut imported = ResourceGroup::new_plain();
    imported
        .import_from_file(&ImportFromFileParams::new(&legacy))
        .expect("csv import");
    assert_eq!(imported.number_of_resources(), 1);
    assert_eq!(imported.version(), Version::new(0, 1, 0));

    let bundle = ResourceGroup::new_bundle();
    let error = bundle
        .export_to_file(&ExportToFileParams {
            filename: out.path().join("bundle.txt"),
            output_document_version: Version::ZERO,
            callbacks: CallbackSettings::default(),
        })
        .expect_err("bundle csv export");
    assert_eq!(error.kind(), ErrorKind::UnsupportedFileFormat);
}

#[test]
fn scan_and_export_progress_is_monotone() {
    let source = tempfile::tempdir().expect("source dir");
    util::write_tree(
        source.path(),
        &[
            ("a/foo.txt", b"hello".to_vec()),
            ("bar.bin", util::pseudo_bytes(100_000, 7)),
        ],
    );

    let (callbacks, values) = util::recording_callbacks();
    let mut params = engine::CreateFromDirectoryParams::new(source.path());
    params.resource_prefix = "res".to_owned();
    params.resource_stream_threshold = 4096;
    params.callbacks = callbacks;
    let group = ResourceGroup::create_from_directory(&params).expect("scan");
    util::assert_monotone(&values.borrow());

    let out = tempfile::tempdir().expect("out dir");
    let (callbacks, values) = util::recording_callbacks();
    group
        .export_to_file(&ExportToFileParams {
            filename: out.path().join("group.yaml"),
            output_document_version: engine::CURRENT_VERSION,
            callbacks,
        })
        .expect("export");
    util::assert_monotone(&values.borrow());
}
