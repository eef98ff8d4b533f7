//! End-to-end bundle pipeline: chunk a directory, rebuild it byte-exactly.

mod util;

use std::fs;
use std::path::PathBuf;

use engine::progress::CallbackSettings;
use engine::{
    BundleCreateParams, BundleUnpackParams, ErrorKind, ImportFromFileParams, ResourceGroup,
};
use repository::{ResourceDestination, ResourceSource};

struct BundleFixture {
    _roots: Vec<tempfile::TempDir>,
    source: PathBuf,
    cdn: PathBuf,
    out: PathBuf,
    work: PathBuf,
    files: Vec<(&'static str, Vec<u8>)>,
}

fn fixture() -> BundleFixture {
    let source_dir = tempfile::tempdir().expect("source dir");
    let cdn_dir = tempfile::tempdir().expect("cdn dir");
    let out_dir = tempfile::tempdir().expect("out dir");

    let files = vec![
        ("a/foo.txt", b"hello".to_vec()),
        ("bar.bin", util::pseudo_bytes(256, 3)),
    ];
    util::write_tree(source_dir.path(), &files);

    BundleFixture {
        source: source_dir.path().to_path_buf(),
        cdn: cdn_dir.path().to_path_buf(),
        out: out_dir.path().to_path_buf(),
        work: out_dir.path().join("work"),
        files,
        _roots: vec![source_dir, cdn_dir, out_dir],
    }
}

fn bundle_params(fixture: &BundleFixture, callbacks: CallbackSettings) -> BundleCreateParams {
    BundleCreateParams {
        resource_source: ResourceSource::LocalRelative {
            base: fixture.source.clone(),
        },
        chunk_destination: ResourceDestination::LocalCdn {
            base: fixture.cdn.clone(),
        },
        bundle_manifest_destination: ResourceDestination::LocalRelative {
            base: fixture.out.clone(),
        },
        group_relative_path: PathBuf::from("demo.yaml"),
        bundle_relative_path: PathBuf::from("demo_bundle.yaml"),
        chunk_size: 128,
        file_read_chunk_size: 64,
        work_dir: fixture.work.clone(),
        download_retry_secs: 0,
        callbacks,
    }
}

fn unpack_params(fixture: &BundleFixture, destination: PathBuf) -> BundleUnpackParams {
    BundleUnpackParams {
        chunk_source: ResourceSource::LocalCdn {
            base: fixture.cdn.clone(),
        },
        resource_destination: ResourceDestination::LocalRelative { base: destination },
        download_retry_secs: 0,
        callbacks: CallbackSettings::default(),
    }
}

#[test]
fn chunk_layout_follows_the_group_size() {
    let fixture = fixture();
    let group = util::scan(&fixture.source);
    let bundle = group
        .create_bundle(&bundle_params(&fixture, CallbackSettings::default()))
        .expect("create bundle");

    // 5 + 256 bytes at chunk size 128 make two full chunks and a 5-byte tail.
    assert_eq!(bundle.resources().len(), 3);
    let sizes: Vec<u64> = bundle
        .resources()
        .iter()
        .map(|chunk| chunk.uncompressed_size())
        .collect();
    assert_eq!(sizes, vec![128, 128, 5]);
    assert_eq!(
        bundle.resources()[0].relative_path(),
        std::path::Path::new("demo0.chunk")
    );
    assert_eq!(bundle.bundle_extension().expect("extension").chunk_size, 128);

    // Every chunk payload is published under its content address.
    for chunk in bundle.resources() {
        let published = fixture
            .cdn
            .join(chunk.location().shard())
            .join(chunk.location().as_str());
        assert_eq!(
            fs::metadata(published).expect("published chunk").len(),
            chunk.uncompressed_size()
        );
    }
}

#[test]
fn unpack_rebuilds_the_tree_byte_for_byte() {
    let fixture = fixture();
    let group = util::scan(&fixture.source);
    let bundle = group
        .create_bundle(&bundle_params(&fixture, CallbackSettings::default()))
        .expect("create bundle");

    let destination = tempfile::tempdir().expect("destination");
    bundle
        .unpack(&unpack_params(&fixture, destination.path().to_path_buf()))
        .expect("unpack");

    util::assert_tree_matches(destination.path(), &fixture.files);
    // The embedded group manifest is copied alongside the rebuilt files.
    assert!(destination.path().join("demo.yaml").is_file());
}

#[test]
fn published_bundle_manifest_round_trips_and_unpacks() {
    let fixture = fixture();
    let group = util::scan(&fixture.source);
    let bundle = group
        .create_bundle(&bundle_params(&fixture, CallbackSettings::default()))
        .expect("create bundle");

    let mut imported = ResourceGroup::new_bundle();
    imported
        .import_from_file(&ImportFromFileParams::new(
            fixture.out.join("demo_bundle.yaml"),
        ))
        .expect("import bundle manifest");
    assert_eq!(imported.resources(), bundle.resources());
    assert_eq!(
        imported.bundle_extension().expect("extension").chunk_size,
        bundle.bundle_extension().expect("extension").chunk_size
    );

    let destination = tempfile::tempdir().expect("destination");
    imported
        .unpack(&unpack_params(&fixture, destination.path().to_path_buf()))
        .expect("unpack imported bundle");
    util::assert_tree_matches(destination.path(), &fixture.files);
}

#[test]
fn corrupted_chunk_payload_fails_the_checksum_gate() {
    let fixture = fixture();
    let group = util::scan(&fixture.source);
    let bundle = group
        .create_bundle(&bundle_params(&fixture, CallbackSettings::default()))
        .expect("create bundle");

    let first_chunk = &bundle.resources()[0];
    let published = fixture
        .cdn
        .join(first_chunk.location().shard())
        .join(first_chunk.location().as_str());
    fs::write(published, b"corrupted payload").expect("corrupt chunk");

    let destination = tempfile::tempdir().expect("destination");
    let error = bundle
        .unpack(&unpack_params(&fixture, destination.path().to_path_buf()))
        .expect_err("corrupted chunk");
    assert_eq!(error.kind(), ErrorKind::FailedToGenerateChecksum);
}

#[test]
fn remote_destination_publishes_gzip_chunks() {
    let fixture = fixture();
    let group = util::scan(&fixture.source);
    let mut params = bundle_params(&fixture, CallbackSettings::default());
    params.chunk_destination = ResourceDestination::RemoteCdn {
        base: fixture.cdn.clone(),
    };
    let bundle = group.create_bundle(&params).expect("create bundle");

    for chunk in bundle.resources() {
        let published = fixture
            .cdn
            .join(chunk.location().shard())
            .join(chunk.location().as_str());
        let staged = fs::read(published).expect("published chunk");
        let decoded = compress::decompress_to_vec(&staged).expect("gzip chunk");
        assert_eq!(decoded.len() as u64, chunk.uncompressed_size());
        assert_eq!(staged.len() as u64, chunk.compressed_size());
    }
}

#[test]
fn bundle_progress_is_monotone_to_completion() {
    let fixture = fixture();
    let group = util::scan(&fixture.source);
    let (callbacks, values) = util::recording_callbacks();
    group
        .create_bundle(&bundle_params(&fixture, callbacks))
        .expect("create bundle");
    util::assert_monotone(&values.borrow());
}
