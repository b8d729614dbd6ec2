//! Statvfs/Accounting universals (spec §8): fixed block size, name-max,
//! and node/block totals recomputed from the live tree.

mod common;

use common::Fixture;
use mount_zip::statvfs::{BLOCK_SIZE, NAME_MAX};
use mount_zip::tree::BuildOptions;

#[test]
fn fixed_constants_match_spec() {
    assert_eq!(BLOCK_SIZE, 512);
    assert_eq!(NAME_MAX, 255);
}

#[test]
fn block_and_file_totals_cover_every_live_node() {
    let volume = Fixture::new()
        .file("a.txt", &vec![0u8; 513]) // 2 blocks
        .file("b.txt", &vec![0u8; 1024]) // 2 blocks
        .dir("sub/")
        .build(BuildOptions::default());

    let acc = volume.statfs();
    // root (1) + a.txt (2) + b.txt (2) = 5; f_files = root + sub + a + b = 4.
    assert_eq!(acc.blocks, 5);
    assert_eq!(acc.files, 4);
    assert!(acc.files >= 2);
}
