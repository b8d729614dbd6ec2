//! Volume Facade (component 6, §4.6): the object the FUSE layer calls.
//!
//! [`Volume`] holds no mutable state of its own beyond the Reader
//! Registry's internal bookkeeping and a small open-file-handle table;
//! the Node Store is built once at mount and read thereafter without
//! locking (§5). [`FuseFs`] is the thin adapter that satisfies
//! `fuser::Filesystem`'s `&mut self` surface by delegating onto a
//! shared, already-thread-safe `Volume`.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, Request,
};
use tracing::{debug, error, warn};

use crate::archive::ArchiveSource;
use crate::error::EntryError;
use crate::node::{Kind, Node, NodeStore, Timestamp, ROOT_ID};
use crate::options::MountOptions;
use crate::reader::{FileHandle as ReaderHandle, ReaderRegistry};
use crate::statvfs;

/// Attribute cache TTL handed back to the kernel. The tree never
/// changes after mount, so there is no correctness reason to keep this
/// short; a generous TTL just means fewer redundant `getattr` round
/// trips.
const ATTR_TTL: Duration = Duration::from_secs(3600);

struct OpenFile {
    entry_index: usize,
    handle: ReaderHandle,
}

/// The object the FUSE layer calls (§4.6): `lookup`, `getattr`,
/// `readdir`, `readlink`, `open`, `read`, `release`, `statfs`.
pub struct Volume {
    archive: Arc<dyn ArchiveSource>,
    store: NodeStore,
    readers: ReaderRegistry,
    options: MountOptions,
    files: Mutex<HashMap<u64, OpenFile>>,
    next_fh: AtomicU64,
}

impl Volume {
    pub fn new(archive: Arc<dyn ArchiveSource>, store: NodeStore, readers: ReaderRegistry, options: MountOptions) -> Self {
        Self { archive, store, readers, options, files: Mutex::new(HashMap::new()), next_fh: AtomicU64::new(1) }
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// The mount options this volume was configured with; tree-shaping
    /// options (masks, feature toggles) are already baked into the Node
    /// Store by the time `Volume` exists, so this is mostly useful for
    /// introspection and for kernel-level options like
    /// `default_permissions` that `fuse_mount_options` reads separately.
    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    fn attr_for(&self, node: &Node) -> FileAttr {
        let ino = self.store.inode_of(node.id);
        FileAttr {
            ino,
            size: node.size,
            blocks: node.size.div_ceil(statvfs::BLOCK_SIZE),
            atime: to_system_time(node.atime),
            mtime: to_system_time(node.mtime),
            ctime: to_system_time(node.ctime),
            crtime: to_system_time(node.ctime),
            kind: to_file_type(node.kind),
            perm: node.mode,
            nlink: node.nlink,
            uid: node.uid,
            gid: node.gid,
            rdev: node.rdev.map(|d| libc::makedev(d.major, d.minor) as u32).unwrap_or(0),
            blksize: statvfs::BLOCK_SIZE as u32,
            flags: 0,
        }
    }

    /// `lookup(parent, name)` (§4.6): parent must be a directory id;
    /// returns `ENOENT` if there's no child of that name.
    pub fn lookup(&self, parent: u64, name: &OsStr) -> Result<FileAttr, i32> {
        let name = name.to_str().ok_or(libc::ENOENT)?;
        let node = self.store.lookup(parent, name).ok_or(libc::ENOENT)?;
        Ok(self.attr_for(node))
    }

    /// `getattr(id)` (§4.6): fixed, cached attributes.
    pub fn getattr(&self, ino: u64) -> Result<FileAttr, i32> {
        self.store.getattr(ino).map(|n| self.attr_for(n)).ok_or(libc::ENOENT)
    }

    /// `readlink(id)` (§4.6): symlink only, else `EINVAL`.
    pub fn readlink(&self, ino: u64) -> Result<Vec<u8>, i32> {
        let node = self.store.get(ino).ok_or(libc::ENOENT)?;
        if node.kind != Kind::Symlink {
            return Err(libc::EINVAL);
        }
        self.store.readlink(ino).map(|t| t.to_vec()).ok_or(libc::EINVAL)
    }

    /// `open(id, flags)` (§4.6): write flags ⇒ `EROFS`.
    pub fn open(&self, ino: u64, flags: i32) -> Result<u64, i32> {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(libc::EROFS);
        }
        let node = self.store.get(ino).ok_or(libc::ENOENT)?;
        if node.kind != Kind::File {
            return Err(libc::EINVAL);
        }
        let Some(archive_index) = node.archive_index else {
            // A hardlink that dangled and was materialized has no
            // backing archive entry; it reads as an empty file.
            let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
            return Ok(fh);
        };

        let entry = &self.archive.entries()[archive_index];
        let handle = self.readers.open(archive_index, node.size, entry.crc32);
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.files.lock().unwrap().insert(fh, OpenFile { entry_index: archive_index, handle });
        Ok(fh)
    }

    /// `read(handle, off, len)` (§4.6): up to `len` bytes; short reads
    /// at EOF are normal; `EIO` on decode failure.
    pub fn read(&self, fh: u64, offset: u64, size: u32) -> Result<Vec<u8>, i32> {
        let files = self.files.lock().unwrap();
        let Some(open_file) = files.get(&fh) else {
            // Dangling hardlink with no backing handle: always EOF.
            return Ok(Vec::new());
        };
        open_file.handle.read(offset, size as usize).map_err(|e| {
            error!(entry = open_file.entry_index, error = %e, "read failed");
            libc::c_int::from(&e)
        })
    }

    /// `release(handle)` (§4.4, §4.6).
    pub fn release(&self, fh: u64) {
        let taken = self.files.lock().unwrap().remove(&fh);
        if let Some(open_file) = taken {
            self.readers.release(open_file.handle);
        }
    }

    /// `readdir(id, offset)` (§4.6): `.`/`..` always occupy positions
    /// 0 and 1, followed by children in insertion (archive) order.
    pub fn readdir(&self, ino: u64) -> Result<Vec<(u64, FileType, String)>, i32> {
        let node = self.store.get(ino).ok_or(libc::ENOENT)?;
        if node.kind != Kind::Directory {
            return Err(libc::ENOTDIR);
        }
        let mut out = vec![
            (self.store.inode_of(ino), FileType::Directory, ".".to_string()),
            (self.store.inode_of(node.parent_id), FileType::Directory, "..".to_string()),
        ];
        for (name, child_id, kind) in self.store.readdir(ino).ok_or(libc::ENOTDIR)? {
            out.push((self.store.inode_of(child_id), to_file_type(kind), name.to_string()));
        }
        Ok(out)
    }

    pub fn statfs(&self) -> statvfs::Accounting {
        statvfs::compute(&self.store)
    }
}

fn to_system_time(t: Timestamp) -> SystemTime {
    if t.secs >= 0 {
        UNIX_EPOCH + Duration::new(t.secs as u64, t.nanos)
    } else {
        UNIX_EPOCH - Duration::new((-t.secs) as u64, 0)
    }
}

fn to_file_type(kind: Kind) -> FileType {
    match kind {
        Kind::Directory => FileType::Directory,
        Kind::File => FileType::RegularFile,
        Kind::Symlink => FileType::Symlink,
        Kind::BlockDevice => FileType::BlockDevice,
        Kind::CharDevice => FileType::CharDevice,
        Kind::Fifo => FileType::NamedPipe,
        Kind::Socket => FileType::Socket,
    }
}

/// Thin `fuser::Filesystem` adapter. `fuser` demands `&mut self`
/// methods; `Volume` itself is already safe to share across threads
/// (§5), so this wrapper just forwards through the shared `Arc`
/// without adding any locking of its own.
pub struct FuseFs(pub Arc<Volume>);

impl Filesystem for FuseFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        debug!(root = ROOT_ID, "mounted");
        Ok(())
    }

    fn destroy(&mut self) {
        debug!("unmounted");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.0.lookup(parent, name) {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, _ino: u64, _nlookup: u64) {}

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.0.getattr(ino) {
            Ok(attr) => reply.attr(&ATTR_TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        match self.0.readlink(ino) {
            Ok(target) => reply.data(&target),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.0.open(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.0.read(fh, offset.max(0) as u64, size) {
            Ok(data) => reply.data(&data),
            Err(errno) => reply.error(errno),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.0.release(fh);
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let entries = match self.0.readdir(ino) {
            Ok(entries) => entries,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        for (i, (child_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(child_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let acc = self.0.statfs();
        reply.statfs(
            acc.blocks,
            0,
            0,
            acc.files,
            0,
            statvfs::BLOCK_SIZE as u32,
            statvfs::NAME_MAX,
            statvfs::BLOCK_SIZE as u32,
        );
    }
}

/// Surfaced for callers that want to log a decode failure once instead
/// of per-byte-range (used by `force`-mode precache warm-up).
pub fn warn_entry_error(entry_index: usize, err: &EntryError) {
    warn!(entry = entry_index, error = %err, "tolerating entry failure under `force`");
}
