//! Statvfs/Accounting (component 7, §4.6 `statfs`, §8 universals).
//!
//! Pure function over a finished [`NodeStore`]: no state of its own,
//! recomputed fresh on every `statfs` call since the tree never
//! changes after mount.

use crate::node::{Kind, NodeStore};

/// Fixed block size the filesystem reports, per §2/§6/§8.
pub const BLOCK_SIZE: u64 = 512;

/// Fixed `f_namemax`, matching the Path Normalizer's 255-byte cap.
pub const NAME_MAX: u32 = 255;

/// Aggregate counters fed to the kernel's `statfs`/`statvfs` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accounting {
    pub blocks: u64,
    pub files: u64,
}

/// Compute `f_blocks`/`f_files` over every live [`Node`] (§3 invariants,
/// §4.6, §8): `f_blocks` is `ceil(size/512)` summed over regular files
/// plus one block for the root; `f_files` is the live node count.
pub fn compute(store: &NodeStore) -> Accounting {
    let mut blocks: u64 = 1; // root
    let mut files: u64 = 0;

    for node in store.iter() {
        files += 1;
        if node.kind == Kind::File {
            blocks += node.size.div_ceil(BLOCK_SIZE);
        }
    }

    Accounting { blocks, files }
}
