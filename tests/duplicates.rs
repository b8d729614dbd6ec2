//! Name-collision resolution, end to end (spec §8 scenario 2: repeated
//! `pet`, `pet/cat`, `pet/cat/fish` entries where a directory eventually
//! claims each bare name and its file siblings get suffixed).

mod common;

use std::ffi::OsStr;

use common::Fixture;
use fuser::FileType;
use mount_zip::tree::BuildOptions;

#[test]
fn directories_keep_bare_name_files_get_suffixed() {
    let volume = Fixture::new()
        .file("pet/cat", b"a".repeat(25).as_slice())
        .file("pet", b"b".repeat(21).as_slice())
        .file("pet/cat/fish", b"c".repeat(30).as_slice())
        .dir("pet/cat/fish/")
        .file("pet/cat", b"d".repeat(26).as_slice())
        .file("pet", b"e".repeat(22).as_slice())
        .file("pet/cat/fish", b"f".repeat(31).as_slice())
        .build(BuildOptions { trim_root_singleton: false, ..Default::default() });

    let root = mount_zip::node::ROOT_ID;
    let cur = volume.lookup(root, OsStr::new("CUR")).unwrap().ino;

    let pet = volume.lookup(cur, OsStr::new("pet")).unwrap();
    assert_eq!(pet.kind, FileType::Directory);
    assert_eq!(pet.nlink, 3); // 2 + one child directory ("cat")

    assert_eq!(volume.lookup(cur, OsStr::new("pet (1)")).unwrap().kind, FileType::RegularFile);
    assert_eq!(volume.lookup(cur, OsStr::new("pet (2)")).unwrap().kind, FileType::RegularFile);

    let cat = volume.lookup(pet.ino, OsStr::new("cat")).unwrap();
    assert_eq!(cat.kind, FileType::Directory);
    assert_eq!(volume.lookup(pet.ino, OsStr::new("cat (1)")).unwrap().size, 25);
    assert_eq!(volume.lookup(pet.ino, OsStr::new("cat (2)")).unwrap().size, 26);

    let fish = volume.lookup(cat.ino, OsStr::new("fish")).unwrap();
    assert_eq!(fish.kind, FileType::Directory);
    assert_eq!(volume.lookup(cat.ino, OsStr::new("fish (1)")).unwrap().size, 30);
    assert_eq!(volume.lookup(cat.ino, OsStr::new("fish (2)")).unwrap().size, 31);
}
