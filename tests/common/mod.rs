//! Shared fixture for the integration tests in `tests/`: builds a
//! [`Volume`] straight from synthetic [`ArchiveEntry`] records, so these
//! tests exercise the full Path Normalizer -> Tree Builder -> Node Store
//! -> Reader Registry -> Volume Facade pipeline without needing a real
//! ZIP file or an actual FUSE mount.

use std::io::{Cursor, Read};
use std::sync::Arc;

use mount_zip::archive::{ArchiveEntry, ArchiveSource, EntryKind};
use mount_zip::cache::{self, PageCache};
use mount_zip::decoder::Mode;
use mount_zip::error::EntryError;
use mount_zip::node::Timestamp;
use mount_zip::options::MountOptions;
use mount_zip::reader::ReaderRegistry;
use mount_zip::scratch::ScratchDir;
use mount_zip::tree::{self, BuildOptions};
use mount_zip::volume::Volume;

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

struct MemoryArchive {
    entries: Vec<ArchiveEntry>,
    bodies: Vec<Vec<u8>>,
}

impl ArchiveSource for MemoryArchive {
    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn open_stream(
        &self,
        index: usize,
        _passphrase: Option<&[u8]>,
    ) -> Result<Box<dyn Read + Send>, EntryError> {
        Ok(Box::new(Cursor::new(self.bodies[index].clone())))
    }
}

/// Builds up a synthetic archive entry by entry, in archive order, then
/// hands back a ready-to-use [`Volume`].
#[derive(Default)]
pub struct Fixture {
    entries: Vec<ArchiveEntry>,
    bodies: Vec<Vec<u8>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.entries.push(ArchiveEntry {
            path: path.to_string(),
            uncompressed_size: data.len() as u64,
            crc32: crc32(data),
            mtime: Timestamp::default(),
            mode: 0o644,
            uid: 0,
            gid: 0,
            device: None,
            is_directory: false,
            is_encrypted: false,
            kind: EntryKind::Regular,
            target: Vec::new(),
        });
        self.bodies.push(data.to_vec());
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.entries.push(ArchiveEntry {
            path: path.to_string(),
            uncompressed_size: 0,
            crc32: 0,
            mtime: Timestamp::default(),
            mode: 0o755,
            uid: 0,
            gid: 0,
            device: None,
            is_directory: true,
            is_encrypted: false,
            kind: EntryKind::Directory,
            target: Vec::new(),
        });
        self.bodies.push(Vec::new());
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.entries.push(ArchiveEntry {
            path: path.to_string(),
            uncompressed_size: target.len() as u64,
            crc32: 0,
            mtime: Timestamp::default(),
            mode: 0o777,
            uid: 0,
            gid: 0,
            device: None,
            is_directory: false,
            is_encrypted: false,
            kind: EntryKind::Symlink,
            target: target.as_bytes().to_vec(),
        });
        self.bodies.push(Vec::new());
        self
    }

    pub fn hardlink(mut self, path: &str, target_path: &str) -> Self {
        self.entries.push(ArchiveEntry {
            path: path.to_string(),
            uncompressed_size: 0,
            crc32: 0,
            mtime: Timestamp::default(),
            mode: 0o644,
            uid: 0,
            gid: 0,
            device: None,
            is_directory: false,
            is_encrypted: false,
            kind: EntryKind::Hardlink,
            target: target_path.as_bytes().to_vec(),
        });
        self.bodies.push(Vec::new());
        self
    }

    /// Build the tree with `build_options` and wire it into a `Volume`
    /// using the default buffered decoder mode.
    pub fn build(self, build_options: BuildOptions) -> Volume {
        self.build_with_mode(build_options, Mode::Buffered { precache: false })
    }

    pub fn build_with_mode(self, build_options: BuildOptions, mode: Mode) -> Volume {
        let store = tree::build_tree(&self.entries, &build_options);
        let archive: Arc<dyn ArchiveSource> =
            Arc::new(MemoryArchive { entries: self.entries, bodies: self.bodies });

        let (page_cache, scratch) = match mode {
            Mode::Buffered { .. } => (
                Some(PageCache::new(cache::DEFAULT_CAPACITY_BYTES)),
                Some(ScratchDir::create().expect("create scratch dir")),
            ),
            Mode::NoCache => (None, None),
        };

        let readers = ReaderRegistry::new(Arc::clone(&archive), None, mode, page_cache, scratch, false);
        Volume::new(archive, store, readers, MountOptions::default())
    }
}
