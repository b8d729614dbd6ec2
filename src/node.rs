//! Node Store (component 3, §4.3): stable id → [`Node`] record.
//!
//! Built once, during mount, then read-only — the FUSE layer may call
//! its lookup/getattr/readdir methods from any thread without locking.

use std::collections::BTreeMap;

/// Root node always has this id.
pub const ROOT_ID: u64 = 1;

/// Kind of filesystem object a [`Node`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Directory,
    File,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

/// Nanosecond-precision timestamp, matching the archive's own fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: u32,
}

/// Major/minor device number, for `Kind::BlockDevice`/`Kind::CharDevice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Device {
    pub major: u32,
    pub minor: u32,
}

/// One visible filesystem object in the mounted tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: u64,
    pub parent_id: u64,
    pub name: String,
    pub kind: Kind,
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub mtime: Timestamp,
    pub atime: Timestamp,
    pub ctime: Timestamp,
    pub size: u64,
    pub nlink: u32,
    pub rdev: Option<Device>,
    pub target: Vec<u8>,
    /// Index into the archive's entry table, or `None` for a synthetic
    /// directory invented by the Tree Builder.
    pub archive_index: Option<usize>,
    /// Name → child id, insertion-ordered so `readdir` matches archive order.
    pub children: Vec<(String, u64)>,
    /// For `Kind::File`: id of the canonical node of its hardlink group
    /// (itself, if it is the canonical node or has no siblings).
    pub hardlink_group: Option<u64>,
}

impl Node {
    /// Child id for `name` in this directory, if any.
    pub fn child(&self, name: &str) -> Option<u64> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }
}

/// Read-only, built-once table of every [`Node`] in the mounted tree.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: BTreeMap<u64, Node>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self { nodes: BTreeMap::new() }
    }

    /// Insert or overwrite a node. Used only by the Tree Builder during
    /// mount construction.
    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    /// Remove a node outright. Used only by the Tree Builder when a
    /// synthetic directory is spliced out of the tree (root-singleton
    /// lifting, §4.2) and must stop counting towards `statvfs.f_files`.
    pub fn remove(&mut self, id: u64) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// `lookup(parent_id, name)`: resolves a child name within a directory.
    pub fn lookup(&self, parent_id: u64, name: &str) -> Option<&Node> {
        let parent = self.nodes.get(&parent_id)?;
        if parent.kind != Kind::Directory {
            return None;
        }
        let child_id = parent.child(name)?;
        self.nodes.get(&child_id)
    }

    pub fn getattr(&self, id: u64) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// `readdir(id)`: ordered `(name, id, kind)` triples, NOT including
    /// `.`/`..` (the Volume Facade adds those at positions 0 and 1).
    pub fn readdir(&self, id: u64) -> Option<Vec<(&str, u64, Kind)>> {
        let dir = self.nodes.get(&id)?;
        if dir.kind != Kind::Directory {
            return None;
        }
        Some(
            dir.children
                .iter()
                .filter_map(|(name, child_id)| {
                    self.nodes.get(child_id).map(|n| (name.as_str(), *child_id, n.kind))
                })
                .collect(),
        )
    }

    pub fn readlink(&self, id: u64) -> Option<&[u8]> {
        let node = self.nodes.get(&id)?;
        (node.kind == Kind::Symlink).then_some(node.target.as_slice())
    }

    /// `st_ino` reported to the kernel: the hardlink group's canonical
    /// id for regular files, the node's own id otherwise.
    pub fn inode_of(&self, id: u64) -> u64 {
        match self.nodes.get(&id) {
            Some(node) if node.kind == Kind::File => node.hardlink_group.unwrap_or(id),
            _ => id,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
