//! mount-zip core: a read-only FUSE filesystem view over a ZIP archive.
//!
//! The binary in `src/bin/mount-zip.rs` is a thin CLI wrapper; this
//! crate does the real work end to end: parse the archive's central
//! directory (`archive`), normalize member paths and build the node
//! tree (`path`, `tree`, `node`), and serve it over FUSE (`volume`)
//! through a lazy decompression engine (`reader`, `decoder`, `cache`,
//! `scratch`).

pub mod archive;
pub mod cache;
pub mod decoder;
pub mod error;
pub mod node;
pub mod options;
pub mod path;
pub mod reader;
pub mod scratch;
pub mod statvfs;
pub mod tree;
pub mod volume;

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use fuser::MountOption;
use tracing::info;

use crate::archive::ZipArchiveSource;
use crate::decoder::Mode;
use crate::error::MountError;
use crate::options::MountOptions;
use crate::reader::ReaderRegistry;
use crate::tree::BuildOptions;
use crate::volume::{FuseFs, Volume};

/// Everything needed to bring a [`Volume`] up, gathered in one place so
/// the CLI binary stays a thin argument-parsing shim.
pub struct Session {
    pub volume: Arc<Volume>,
}

impl Session {
    /// Open `archive_path`, verify `passphrase`, build the tree, and
    /// wire up the Reader Registry -- everything short of actually
    /// calling into the kernel (§4, §6).
    pub fn build(archive_path: &Path, passphrase: Option<&[u8]>, options: MountOptions) -> Result<Self, MountError> {
        let archive = ZipArchiveSource::open(archive_path, &options.encoding)?;
        // Under `force`, a missing/wrong passphrase degrades to
        // per-read `EIO` on the affected entries instead of aborting
        // the mount (§4.5, §7).
        if !options.force {
            archive.verify_passphrase(passphrase)?;
        }
        let archive: Arc<dyn archive::ArchiveSource> = Arc::new(archive);

        let build_options = BuildOptions {
            dir_mode_mask: options.dmask,
            file_mode_mask: options.fmask,
            drop_symlinks: options.nosymlinks,
            drop_specials: options.nospecials,
            materialize_hardlinks: options.nohardlinks,
            trim_root_singleton: !options.notrim,
        };
        let store = tree::build_tree(archive.entries(), &build_options);
        info!(nodes = store.len(), "tree built");

        let mode = if options.nocache { Mode::NoCache } else { Mode::Buffered { precache: options.precache } };
        let page_cache = (!options.nocache).then(|| cache::PageCache::new(options.cache_capacity_bytes));
        let scratch = (!options.nocache)
            .then(|| scratch::ScratchDir::create().map_err(MountError::ArchiveUnreadable))
            .transpose()?;

        let readers = ReaderRegistry::new(
            Arc::clone(&archive),
            passphrase.map(|p| p.to_vec()),
            mode,
            page_cache,
            scratch,
            options.nocache,
        );

        let volume = Arc::new(Volume::new(archive, store, readers, options));
        Ok(Self { volume })
    }

    /// Block the calling thread serving FUSE requests at `mount_point`
    /// until the filesystem is unmounted (§6).
    pub fn run(self, mount_point: &Path, fuse_options: &[MountOption]) -> std::io::Result<()> {
        fuser::mount2(FuseFs(self.volume), mount_point, fuse_options)
    }
}

/// Translate recognized `MountOptions` into the `fuser` options that
/// actually change kernel-visible mount behavior; everything else in
/// `MountOptions` only affects how the CORE itself builds/serves the
/// tree.
pub fn fuse_mount_options(options: &MountOptions, archive_path: &Path) -> Vec<MountOption> {
    let mut opts = vec![
        MountOption::RO,
        MountOption::FSName("mount-zip".to_string()),
        MountOption::Subtype(file_stem(archive_path)),
    ];
    if options.default_permissions {
        opts.push(MountOption::DefaultPermissions);
    }
    opts
}

fn file_stem(path: &Path) -> String {
    path.file_name().and_then(OsStr::to_str).unwrap_or("archive").to_string()
}
