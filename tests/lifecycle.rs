//! End-to-end lifecycle tests for the allocation engine.
//!
//! Runs the handler core against the mock GPU binding and walks through
//! the scenarios a mounted filesystem would see: create + truncate +
//! xattr retrieval, release paths, rejected resizes, and concurrent
//! materialization from many threads.

use std::collections::HashSet;
use std::sync::Arc;

use gpumemfs::fs::{FsError, GpuMemFs, TimeSet};
use gpumemfs::gpu::{MockGpuBinding, FABRIC_HANDLE_SIZE};

const XATTR_FABRIC_HANDLE: &str = "user.fabric_handle";
const XATTR_ALLOCATION_SIZE: &str = "user.allocation_size";

fn new_fs() -> (Arc<GpuMemFs>, Arc<MockGpuBinding>) {
    let gpu = Arc::new(MockGpuBinding::new());
    (Arc::new(GpuMemFs::new(gpu.clone())), gpu)
}

fn fabric_of(fs: &GpuMemFs, path: &str) -> Vec<u8> {
    fs.getxattr(path, XATTR_FABRIC_HANDLE, FABRIC_HANDLE_SIZE)
        .unwrap()
        .into_value()
        .unwrap()
}

#[test]
fn create_truncate_then_retrieve_attributes() {
    let (fs, _) = new_fs();

    fs.create("/buf").unwrap();
    fs.truncate("/buf", 8_388_608).unwrap();

    let size = fs
        .getxattr("/buf", XATTR_ALLOCATION_SIZE, 32)
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(size, b"8388608");

    let handle = fabric_of(&fs, "/buf");
    assert_eq!(handle.len(), FABRIC_HANDLE_SIZE);
}

#[test]
fn unsized_entry_is_listed_but_has_no_handle() {
    let (fs, _) = new_fs();

    fs.create("/a").unwrap();
    fs.truncate("/a", 0).unwrap();

    assert_eq!(fs.readdir(), vec!["a".to_string()]);
    assert!(matches!(
        fs.getxattr("/a", XATTR_FABRIC_HANDLE, 64),
        Err(FsError::NoData(_))
    ));
}

#[test]
fn unlink_forgets_the_path_entirely() {
    let (fs, gpu) = new_fs();

    fs.create("/x").unwrap();
    fs.truncate("/x", 1024).unwrap();
    fs.unlink("/x").unwrap();

    assert!(matches!(fs.getattr("/x"), Err(FsError::NotFound(_))));
    assert!(matches!(
        fs.getxattr("/x", XATTR_FABRIC_HANDLE, 64),
        Err(FsError::NotFound(_))
    ));
    assert!(matches!(fs.truncate("/x", 1024), Err(FsError::NotFound(_))));
    assert!(fs.readdir().is_empty());
    assert_eq!(gpu.live_count(), 0);
}

#[test]
fn resize_fails_and_preserves_the_record() {
    let (fs, _) = new_fs();

    fs.create("/y").unwrap();
    fs.truncate("/y", 1024).unwrap();
    let original = fabric_of(&fs, "/y");

    assert!(matches!(
        fs.truncate("/y", 2048),
        Err(FsError::NotSupported(_))
    ));

    assert_eq!(fs.getattr("/y").unwrap().size, 1024);
    assert_eq!(fabric_of(&fs, "/y"), original);
}

#[test]
fn sixteen_threads_materialize_distinct_paths() {
    let (fs, gpu) = new_fs();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let fs = fs.clone();
            std::thread::spawn(move || {
                let path = format!("/p{}", i);
                fs.create(&path).unwrap();
                fs.truncate(&path, 4096).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut names = fs.readdir();
    names.sort();
    let mut expected: Vec<String> = (0..16).map(|i| format!("p{}", i)).collect();
    expected.sort();
    assert_eq!(names, expected);

    // Every path holds its own allocation with a distinct fabric handle
    assert_eq!(gpu.live_count(), 16);
    let tokens: HashSet<Vec<u8>> = (0..16)
        .map(|i| fabric_of(&fs, &format!("/p{}", i)))
        .collect();
    assert_eq!(tokens.len(), 16);
}

#[test]
fn create_twice_changes_nothing_but_timestamps() {
    let (fs, gpu) = new_fs();

    fs.create("/buf").unwrap();
    fs.truncate("/buf", 4096).unwrap();
    let before = fabric_of(&fs, "/buf");

    fs.create("/buf").unwrap();

    assert_eq!(fs.entry_count(), 1);
    assert_eq!(gpu.live_count(), 1);
    assert_eq!(fs.getattr("/buf").unwrap().size, 4096);
    assert_eq!(fabric_of(&fs, "/buf"), before);
}

#[test]
fn truncate_same_size_does_not_reallocate() {
    let (fs, gpu) = new_fs();

    fs.create("/buf").unwrap();
    fs.truncate("/buf", 4096).unwrap();
    let before = fabric_of(&fs, "/buf");

    fs.truncate("/buf", 4096).unwrap();

    assert_eq!(gpu.live_count(), 1);
    assert_eq!(fabric_of(&fs, "/buf"), before);
}

#[test]
fn repeated_xattr_reads_are_stable() {
    let (fs, _) = new_fs();

    fs.create("/buf").unwrap();
    fs.truncate("/buf", 4096).unwrap();

    let first = fabric_of(&fs, "/buf");
    for _ in 0..8 {
        assert_eq!(fabric_of(&fs, "/buf"), first);
    }
}

#[test]
fn release_then_rematerialize_yields_fresh_allocation() {
    let (fs, gpu) = new_fs();

    fs.create("/buf").unwrap();
    fs.truncate("/buf", 4096).unwrap();
    let first = fabric_of(&fs, "/buf");

    fs.truncate("/buf", 0).unwrap();
    assert_eq!(gpu.live_count(), 0);

    fs.truncate("/buf", 4096).unwrap();
    assert_eq!(gpu.live_count(), 1);
    assert_eq!(fs.getattr("/buf").unwrap().size, 4096);

    // The record is consistent either way; the mock hands out a new
    // token per allocation, so the handle differs here
    assert_ne!(fabric_of(&fs, "/buf"), first);
}

#[test]
fn zero_size_probe_answers_needed_length() {
    let (fs, _) = new_fs();

    fs.create("/buf").unwrap();
    fs.truncate("/buf", 4096).unwrap();

    use gpumemfs::fs::XattrReply;
    assert_eq!(
        fs.getxattr("/buf", XATTR_FABRIC_HANDLE, 0).unwrap(),
        XattrReply::Length(FABRIC_HANDLE_SIZE)
    );
    assert_eq!(
        fs.getxattr("/buf", XATTR_ALLOCATION_SIZE, 0).unwrap(),
        XattrReply::Length(4)
    );
}

#[test]
fn failed_allocation_can_be_retried() {
    let (fs, gpu) = new_fs();

    fs.create("/buf").unwrap();
    gpu.fail_next_allocation();
    assert!(matches!(
        fs.truncate("/buf", 4096),
        Err(FsError::OutOfMemory(_))
    ));

    // The record is still unmaterialized and fully usable
    assert_eq!(fs.getattr("/buf").unwrap().size, 0);
    fs.truncate("/buf", 4096).unwrap();
    assert_eq!(fs.getattr("/buf").unwrap().size, 4096);
}

#[test]
fn utimens_and_getattr_agree() {
    let (fs, _) = new_fs();

    fs.create("/buf").unwrap();
    fs.utimens("/buf", Some(TimeSet::Epoch(11)), Some(TimeSet::Epoch(22)))
        .unwrap();

    let stat = fs.getattr("/buf").unwrap();
    assert_eq!(stat.atime, 11);
    assert_eq!(stat.mtime, 22);

    assert!(matches!(
        fs.utimens("/gone", Some(TimeSet::Now), None),
        Err(FsError::NotFound(_))
    ));
}

#[test]
fn diagnostic_read_matches_xattr_value() {
    let (fs, _) = new_fs();

    fs.create("/buf").unwrap();
    fs.truncate("/buf", 4096).unwrap();

    let via_read = fs.read("/buf", 4096, 0).unwrap();
    assert_eq!(via_read, fabric_of(&fs, "/buf"));
}

#[test]
fn shutdown_releases_all_live_allocations() {
    let (fs, gpu) = new_fs();

    for i in 0..8u64 {
        let path = format!("/buf{}", i);
        fs.create(&path).unwrap();
        fs.truncate(&path, 4096 * (i + 1)).unwrap();
    }
    assert_eq!(gpu.live_count(), 8);

    fs.shutdown();

    assert_eq!(gpu.live_count(), 0);
    assert!(fs.readdir().is_empty());
}
