#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use engine::progress::{CallbackSettings, StatusCallback, StatusEvent};
use engine::{CreateFromDirectoryParams, ResourceGroup};

/// Deterministic noise for binary fixtures.
pub fn pseudo_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|index| {
            let value = index as u64 * 31 + u64::from(seed) * 17 + 7;
            (value % 251) as u8
        })
        .collect()
}

/// Writes `files` under `root`, creating parent directories.
pub fn write_tree(root: &Path, files: &[(&str, Vec<u8>)]) {
    for (path, data) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("create tree directory");
        }
        fs::write(full, data).expect("write tree file");
    }
}

/// Scans `root` into a plain group with the `res` prefix.
pub fn scan(root: &Path) -> ResourceGroup {
    let mut params = CreateFromDirectoryParams::new(root);
    params.resource_prefix = "res".to_owned();
    ResourceGroup::create_from_directory(&params).expect("scan directory")
}

/// Asserts that `actual_root` holds exactly `files` byte-for-byte.
pub fn assert_tree_matches(actual_root: &Path, files: &[(&str, Vec<u8>)]) {
    for (path, expected) in files {
        let actual = fs::read(actual_root.join(path))
            .unwrap_or_else(|error| panic!("missing rebuilt file {path}: {error}"));
        assert_eq!(&actual, expected, "content mismatch for {path}");
    }
}

/// Callback settings that record every composed overall-progress value.
pub fn recording_callbacks() -> (CallbackSettings, Rc<RefCell<Vec<f32>>>) {
    let values = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&values);
    let callback: StatusCallback = Rc::new(move |event: &StatusEvent<'_>| {
        sink.borrow_mut().push(event.overall_progress);
    });
    (CallbackSettings::verbose(callback), values)
}

/// Asserts the recorded overall progress never decreases and stays in range.
pub fn assert_monotone(values: &[f32]) {
    assert!(
        values.windows(2).all(|pair| pair[0] <= pair[1] + 1e-3),
        "overall progress regressed: {values:?}"
    );
    assert!(values.iter().all(|value| *value <= 100.0 + 1e-3));
    assert!((values.last().copied().unwrap_or(0.0) - 100.0).abs() < 1e-3);
}
