//! Path Normalizer + Tree Builder, end to end through the Volume Facade
//! (spec §8 scenario 1: escaping paths land in dedicated buckets).

mod common;

use std::ffi::OsStr;

use common::Fixture;
use mount_zip::tree::BuildOptions;

fn lookup_id(volume: &mount_zip::volume::Volume, parent: u64, name: &str) -> u64 {
    volume.lookup(parent, OsStr::new(name)).unwrap_or_else(|_| panic!("missing {name}")).ino
}

#[test]
fn escaping_paths_land_in_up_and_root_buckets() {
    let volume = Fixture::new()
        .file("../up-1.txt", b"a")
        .file("../../up-2.txt", b"b")
        .file("/top.txt", b"c")
        .file("/../over-the-top.txt", b"d")
        .file("normal.txt", b"e")
        .build(BuildOptions { trim_root_singleton: false, ..Default::default() });

    let root = mount_zip::node::ROOT_ID;

    let up = lookup_id(&volume, root, "UP");
    assert!(volume.lookup(up, OsStr::new("up-1.txt")).is_ok());
    // `/../over-the-top.txt` escapes one level past the root, landing in
    // the same bucket as a plain `../` escape.
    assert!(volume.lookup(up, OsStr::new("over-the-top.txt")).is_ok());

    let upup = lookup_id(&volume, root, "UPUP");
    assert!(volume.lookup(upup, OsStr::new("up-2.txt")).is_ok());

    let root_bucket = lookup_id(&volume, root, "ROOT");
    assert!(volume.lookup(root_bucket, OsStr::new("top.txt")).is_ok());

    let cur = lookup_id(&volume, root, "CUR");
    assert!(volume.lookup(cur, OsStr::new("normal.txt")).is_ok());
}

#[test]
fn every_child_name_is_posix_legal_and_round_trips_lookup() {
    let volume = Fixture::new()
        .dir("pics/")
        .file("pics/a.jpg", b"data")
        .file("pics/../escaped.txt", b"data")
        .build(BuildOptions::default());

    let root = mount_zip::node::ROOT_ID;
    for ino in [root] {
        let entries = volume.readdir(ino).expect("readdir");
        for (child_ino, _kind, name) in entries {
            if name == "." || name == ".." {
                continue;
            }
            assert!(!name.is_empty());
            assert!(!name.contains('/'));
            assert!(!name.contains('\0'));
            assert!(name.len() <= mount_zip::path::MAX_NAME_LEN);

            let attr = volume.lookup(ino, OsStr::new(&name)).expect("lookup round-trips");
            assert_eq!(attr.ino, child_ino);
        }
    }
}
