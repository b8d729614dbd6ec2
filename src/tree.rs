//! Name Resolver / Tree Builder (component 2, §4.2).
//!
//! Walks archive entries in archive order, normalizing each path
//! (`path.rs`) and inserting it into the [`NodeStore`] while resolving
//! name collisions deterministically. Directories always keep the bare
//! (unsuffixed) name at a given parent; anything else that collides
//! with an occupied name is pushed to a freshly allocated `name (k)`.
//! When a later entry needs a name to be a directory and a non-directory
//! node already holds it bare, that node is evicted to a fresh suffix
//! and the directory reclaims the bare slot -- this is what lets
//! `pet`, `pet/cat`, `pet/cat/fish` end up as directories while their
//! same-named file siblings become `pet (1)`, `pet (2)`, etc.

use std::collections::{HashMap, HashSet};

use crate::archive::{ArchiveEntry, EntryKind};
use crate::node::{Device, Kind, Node, NodeStore, Timestamp, ROOT_ID};
use crate::path::{self, Bucket};

/// Options that affect tree shape (independent of read behavior).
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub dir_mode_mask: u16,
    pub file_mode_mask: u16,
    pub drop_symlinks: bool,
    pub drop_specials: bool,
    pub materialize_hardlinks: bool,
    pub trim_root_singleton: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            dir_mode_mask: 0,
            file_mode_mask: 0,
            drop_symlinks: false,
            drop_specials: false,
            materialize_hardlinks: false,
            trim_root_singleton: true,
        }
    }
}

/// Build the full Node Store for `entries` (§4.2, §4.3). Returns the
/// finished, read-only tree.
pub fn build_tree(entries: &[ArchiveEntry], options: &BuildOptions) -> NodeStore {
    let mut builder = Builder::new(options.clone());
    builder.insert_non_hardlinks(entries);
    builder.resolve_hardlinks(entries);
    builder.finalize_nlink();
    if options.trim_root_singleton {
        builder.lift_singleton_root();
    }
    builder.store
}

struct Slot {
    occupant: Option<u64>,
    used_suffixes: HashSet<u32>,
}

struct Builder {
    store: NodeStore,
    next_id: u64,
    options: BuildOptions,
    slots: HashMap<(u64, String), Slot>,
    /// Normalized archive path (bucket-qualified, `/`-joined) -> the
    /// node actually created for that entry. Used only to resolve
    /// hardlink targets (§4.3), keyed by the *original* path, never by
    /// the post-collision display name.
    path_to_node: HashMap<String, u64>,
    /// Raw target path string recorded by each hardlink entry, keyed
    /// by its own normalized path (for chain resolution).
    hardlink_targets: HashMap<String, String>,
}

struct PlacedNode {
    kind: Kind,
    mode: u16,
    uid: u32,
    gid: u32,
    mtime: Timestamp,
    size: u64,
    rdev: Option<Device>,
    target: Vec<u8>,
    archive_index: Option<usize>,
    hardlink_group: Option<u64>,
}

impl Builder {
    fn new(options: BuildOptions) -> Self {
        let mut store = NodeStore::new();
        store.insert(Node {
            id: ROOT_ID,
            parent_id: ROOT_ID,
            name: String::new(),
            kind: Kind::Directory,
            mode: 0o755 & !options.dir_mode_mask,
            uid: 0,
            gid: 0,
            mtime: Timestamp::default(),
            atime: Timestamp::default(),
            ctime: Timestamp::default(),
            size: 0,
            nlink: 2,
            rdev: None,
            target: Vec::new(),
            archive_index: None,
            children: Vec::new(),
            hardlink_group: None,
        });

        Self {
            store,
            next_id: ROOT_ID + 1,
            options,
            slots: HashMap::new(),
            path_to_node: HashMap::new(),
            hardlink_targets: HashMap::new(),
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert_non_hardlinks(&mut self, entries: &[ArchiveEntry]) {
        for (index, entry) in entries.iter().enumerate() {
            if entry.kind == EntryKind::Hardlink {
                continue;
            }
            if entry.kind == EntryKind::Symlink && self.options.drop_symlinks {
                continue;
            }
            if matches!(
                entry.kind,
                EntryKind::BlockDevice | EntryKind::CharDevice | EntryKind::Fifo | EntryKind::Socket
            ) && self.options.drop_specials
            {
                continue;
            }

            let Some(normalized) = path::normalize(&entry.path, entry.is_directory) else {
                continue;
            };

            let id = self.insert_entry(&normalized, index, entry);
            let full_path = display_path(&normalized);
            self.path_to_node.insert(full_path, id);
        }
    }

    /// Insert one non-hardlink entry, returning the id of the final
    /// (leaf) node it produced.
    fn insert_entry(&mut self, normalized: &path::NormalizedPath, index: usize, entry: &ArchiveEntry) -> u64 {
        let top = bucket_dir_name(&normalized.bucket);
        let mut parent = self.ensure_dir(ROOT_ID, &top, None);

        let (last, init) = normalized.components.split_last().expect("normalize() never returns empty components");
        for component in init {
            parent = self.ensure_dir(parent, component, None);
        }

        if normalized.is_directory {
            self.ensure_dir(parent, last, Some(dir_meta(entry, index, &self.options)))
        } else {
            let template = leaf_template(entry, index, &self.options);
            self.place_leaf(parent, last, template)
        }
    }

    /// Ensure a directory named `name` exists under `parent_id`,
    /// reusing it if already present, reclaiming the bare slot from a
    /// non-directory occupant if necessary, and creating it fresh
    /// (synthetic, or carrying `meta` from a real archive directory
    /// entry) otherwise.
    fn ensure_dir(&mut self, parent_id: u64, name: &str, meta: Option<PlacedNode>) -> u64 {
        let key = (parent_id, name.to_string());
        let occupant = self.slots.get(&key).and_then(|s| s.occupant);

        if let Some(id) = occupant {
            let is_dir = self.store.get(id).map(|n| n.kind == Kind::Directory).unwrap_or(false);
            if is_dir {
                if let Some(meta) = meta {
                    self.enrich_directory(id, meta);
                }
                return id;
            }

            // Reclaim: evict the non-directory occupant to a fresh suffix.
            let fresh_name = self.suffixed_name(parent_id, name);
            self.rename_child(parent_id, id, &fresh_name);
        }

        let id = self.create_directory(parent_id, name, meta);
        self.slots.entry(key).or_insert_with(|| Slot { occupant: None, used_suffixes: HashSet::new() }).occupant =
            Some(id);
        id
    }

    /// Place a non-directory leaf. Never evicts an existing occupant;
    /// a name already in use always pushes the new leaf to a fresh
    /// suffix.
    fn place_leaf(&mut self, parent_id: u64, name: &str, template: PlacedNode) -> u64 {
        let key = (parent_id, name.to_string());
        let occupied = self.slots.get(&key).map(|s| s.occupant.is_some()).unwrap_or(false);

        if !occupied {
            let id = self.create_node(parent_id, name, template);
            self.slots.entry(key).or_insert_with(|| Slot { occupant: None, used_suffixes: HashSet::new() }).occupant =
                Some(id);
            id
        } else {
            let fresh_name = self.suffixed_name(parent_id, name);
            self.create_node(parent_id, &fresh_name, template)
        }
    }

    fn suffixed_name(&mut self, parent_id: u64, base: &str) -> String {
        let key = (parent_id, base.to_string());
        let slot = self.slots.entry(key).or_insert_with(|| Slot { occupant: None, used_suffixes: HashSet::new() });
        let mut k = 1u32;
        while slot.used_suffixes.contains(&k) {
            k += 1;
        }
        slot.used_suffixes.insert(k);
        apply_suffix(base, k)
    }

    fn create_directory(&mut self, parent_id: u64, name: &str, meta: Option<PlacedNode>) -> u64 {
        let id = self.allocate_id();
        let (mode, uid, gid, mtime, archive_index) = match meta {
            Some(m) => (m.mode, m.uid, m.gid, m.mtime, m.archive_index),
            None => (0o755 & !self.options.dir_mode_mask, 0, 0, Timestamp::default(), None),
        };

        self.store.insert(Node {
            id,
            parent_id,
            name: name.to_string(),
            kind: Kind::Directory,
            mode,
            uid,
            gid,
            mtime,
            atime: mtime,
            ctime: mtime,
            size: 0,
            nlink: 2,
            rdev: None,
            target: Vec::new(),
            archive_index,
            children: Vec::new(),
            hardlink_group: None,
        });

        if let Some(parent) = self.store.get_mut(parent_id) {
            parent.children.push((name.to_string(), id));
        }
        id
    }

    fn enrich_directory(&mut self, id: u64, meta: PlacedNode) {
        if let Some(node) = self.store.get_mut(id) {
            if node.archive_index.is_none() {
                node.mode = meta.mode;
                node.uid = meta.uid;
                node.gid = meta.gid;
                node.mtime = meta.mtime;
                node.atime = meta.mtime;
                node.ctime = meta.mtime;
                node.archive_index = meta.archive_index;
            }
        }
    }

    fn create_node(&mut self, parent_id: u64, name: &str, t: PlacedNode) -> u64 {
        let id = self.allocate_id();
        self.store.insert(Node {
            id,
            parent_id,
            name: name.to_string(),
            kind: t.kind,
            mode: t.mode,
            uid: t.uid,
            gid: t.gid,
            mtime: t.mtime,
            atime: t.mtime,
            ctime: t.mtime,
            size: t.size,
            nlink: 1,
            rdev: t.rdev,
            target: t.target,
            archive_index: t.archive_index,
            children: Vec::new(),
            hardlink_group: t.hardlink_group,
        });

        if let Some(parent) = self.store.get_mut(parent_id) {
            parent.children.push((name.to_string(), id));
        }
        id
    }

    fn rename_child(&mut self, parent_id: u64, child_id: u64, new_name: &str) {
        if let Some(node) = self.store.get_mut(child_id) {
            node.name = new_name.to_string();
        }
        if let Some(parent) = self.store.get_mut(parent_id) {
            if let Some(entry) = parent.children.iter_mut().find(|(_, id)| *id == child_id) {
                entry.0 = new_name.to_string();
            }
        }
    }

    // ---- hardlinks (§4.3) ---------------------------------------------

    fn resolve_hardlinks(&mut self, entries: &[ArchiveEntry]) {
        // Record every hardlink's own source -> target path first, so a
        // hardlink that points at another (not-yet-processed) hardlink
        // can still be chased to its eventual real node.
        for entry in entries.iter() {
            if entry.kind != EntryKind::Hardlink {
                continue;
            }
            let Some(normalized) = path::normalize(&entry.path, entry.is_directory) else {
                continue;
            };
            let target_raw = String::from_utf8_lossy(&entry.target).to_string();
            self.hardlink_targets.insert(display_path(&normalized), target_raw);
        }

        for (index, entry) in entries.iter().enumerate() {
            if entry.kind != EntryKind::Hardlink {
                continue;
            }
            let Some(normalized) = path::normalize(&entry.path, entry.is_directory) else {
                continue;
            };

            let resolved = self.resolve_hardlink_target(entry);
            let template = match resolved {
                Some(target_id) if self.store.get(target_id).map(|n| n.kind) == Some(Kind::File) => {
                    if self.options.materialize_hardlinks {
                        materialized_file_copy(self.store.get(target_id).unwrap())
                    } else {
                        let canonical = self.canonical_of(target_id);
                        let mut t = leaf_template_for_group(self.store.get(target_id).unwrap());
                        t.hardlink_group = Some(canonical);
                        t
                    }
                }
                Some(target_id) => {
                    let target = self.store.get(target_id).unwrap().clone();
                    copy_non_file_kind(&target, index)
                }
                None => dangling_template(index),
            };

            self.place_hardlink(&normalized, template);
        }
    }

    fn place_hardlink(&mut self, normalized: &path::NormalizedPath, template: PlacedNode) {
        let top = bucket_dir_name(&normalized.bucket);
        let mut parent = self.ensure_dir(ROOT_ID, &top, None);
        let (last, init) = normalized.components.split_last().expect("normalize() never returns empty components");
        for component in init {
            parent = self.ensure_dir(parent, component, None);
        }

        let id = self.place_leaf(parent, last, template);
        self.path_to_node.insert(display_path(normalized), id);
    }

    /// Follow a hardlink's recorded target path to a concrete node,
    /// returning `None` for a dangling or cyclic chain (§4.3).
    fn resolve_hardlink_target(&self, entry: &ArchiveEntry) -> Option<u64> {
        let target_raw = String::from_utf8_lossy(&entry.target).to_string();
        let mut current = path::normalize(&target_raw, false).map(|n| display_path(&n))?;
        let mut visited = HashSet::new();

        for _ in 0..64 {
            if !visited.insert(current.clone()) {
                return None; // cycle
            }
            if let Some(&id) = self.path_to_node.get(&current) {
                return Some(id);
            }
            match self.hardlink_targets.get(&current) {
                Some(next) => current = next.clone(),
                None => return None, // dangling
            }
        }
        None
    }

    fn canonical_of(&self, id: u64) -> u64 {
        self.store.get(id).and_then(|n| n.hardlink_group).unwrap_or(id)
    }

    /// Assign final `nlink` to every node: directories get
    /// `2 + child-directory-count`; files get their hardlink group's
    /// member count.
    fn finalize_nlink(&mut self) {
        let mut group_counts: HashMap<u64, u32> = HashMap::new();
        for node in self.store.iter() {
            if node.kind == Kind::File {
                let canonical = node.hardlink_group.unwrap_or(node.id);
                *group_counts.entry(canonical).or_insert(0) += 1;
            }
        }

        let ids: Vec<u64> = self.store.iter().map(|n| n.id).collect();
        for id in ids {
            let (kind, child_dir_count) = {
                let node = self.store.get(id).unwrap();
                let child_dirs = node
                    .children
                    .iter()
                    .filter(|(_, cid)| self.store.get(*cid).map(|c| c.kind == Kind::Directory).unwrap_or(false))
                    .count() as u32;
                (node.kind, child_dirs)
            };

            if kind == Kind::Directory {
                self.store.get_mut(id).unwrap().nlink = 2 + child_dir_count;
            } else if kind == Kind::File {
                let canonical = self.canonical_of(id);
                let count = *group_counts.get(&canonical).unwrap_or(&1);
                self.store.get_mut(id).unwrap().nlink = count;
            }
        }
    }

    /// Root-singleton lifting (§4.2): if root has exactly one
    /// synthetic child directory and nothing else, splice its
    /// children up to root and discard it.
    fn lift_singleton_root(&mut self) {
        let root = self.store.get(ROOT_ID).unwrap();
        if root.children.len() != 1 {
            return;
        }
        let (_, only_child_id) = root.children[0];
        let Some(child) = self.store.get(only_child_id) else { return };
        if child.kind != Kind::Directory || child.archive_index.is_some() {
            return;
        }

        let grandchildren = child.children.clone();
        for (_, gc_id) in &grandchildren {
            if let Some(gc) = self.store.get_mut(*gc_id) {
                gc.parent_id = ROOT_ID;
            }
        }

        let root = self.store.get_mut(ROOT_ID).unwrap();
        root.children = grandchildren;
        self.store.remove(only_child_id);
    }
}

fn display_path(normalized: &path::NormalizedPath) -> String {
    let top = bucket_dir_name(&normalized.bucket);
    let mut parts = vec![top];
    parts.extend(normalized.components.iter().cloned());
    parts.join("/")
}

fn bucket_dir_name(bucket: &Bucket) -> String {
    match bucket {
        Bucket::Current => "CUR".to_string(),
        Bucket::Root => "ROOT".to_string(),
        Bucket::Up(k) | Bucket::RootUp(k) => "UP".repeat((*k).max(1) as usize),
    }
}

fn entry_timestamp(entry: &ArchiveEntry) -> Timestamp {
    entry.mtime
}

fn dir_meta(entry: &ArchiveEntry, index: usize, options: &BuildOptions) -> PlacedNode {
    PlacedNode {
        kind: Kind::Directory,
        mode: (entry.mode as u16 & 0o777 | 0o755) & !options.dir_mode_mask,
        uid: entry.uid,
        gid: entry.gid,
        mtime: entry_timestamp(entry),
        size: 0,
        rdev: None,
        target: Vec::new(),
        archive_index: Some(index),
        hardlink_group: None,
    }
}

fn leaf_template(entry: &ArchiveEntry, index: usize, options: &BuildOptions) -> PlacedNode {
    let kind = match entry.kind {
        EntryKind::Regular => Kind::File,
        EntryKind::Symlink => Kind::Symlink,
        EntryKind::BlockDevice => Kind::BlockDevice,
        EntryKind::CharDevice => Kind::CharDevice,
        EntryKind::Fifo => Kind::Fifo,
        EntryKind::Socket => Kind::Socket,
        EntryKind::Directory | EntryKind::Hardlink => Kind::File,
    };

    let default_mode = match kind {
        Kind::Symlink => 0o777,
        _ => 0o644,
    };

    PlacedNode {
        kind,
        mode: ((entry.mode as u16 & 0o777) | default_mode) & !options.file_mode_mask,
        uid: entry.uid,
        gid: entry.gid,
        mtime: entry_timestamp(entry),
        size: match kind {
            Kind::Symlink => entry.target.len() as u64,
            Kind::File => entry.uncompressed_size,
            _ => 0,
        },
        rdev: entry.device,
        target: entry.target.clone(),
        archive_index: Some(index),
        hardlink_group: None,
    }
}

/// Build a new hardlink alias's node template, routing reads to
/// whichever archive entry actually backs the group's bytes (the
/// `canonical` node's own `archive_index`, not this new alias's) since
/// a ZIP hardlink entry carries no real payload of its own (§4.3).
fn leaf_template_for_group(canonical: &Node) -> PlacedNode {
    PlacedNode {
        kind: Kind::File,
        mode: canonical.mode,
        uid: canonical.uid,
        gid: canonical.gid,
        mtime: canonical.mtime,
        size: canonical.size,
        rdev: None,
        target: Vec::new(),
        archive_index: canonical.archive_index,
        hardlink_group: None,
    }
}

fn copy_non_file_kind(target: &Node, index: usize) -> PlacedNode {
    PlacedNode {
        kind: target.kind,
        mode: target.mode,
        uid: target.uid,
        gid: target.gid,
        mtime: target.mtime,
        size: target.size,
        rdev: target.rdev,
        target: target.target.clone(),
        archive_index: Some(index),
        hardlink_group: None,
    }
}

/// Build a `nohardlinks` alias's template for a File target: reads still
/// route to the canonical node's own archive entry (a hardlink carries no
/// payload of its own, per `leaf_template_for_group`), but `hardlink_group`
/// stays `None` so each alias counts as its own one-member group (nlink=1)
/// instead of joining the canonical group (§4.6 `nohardlinks`).
fn materialized_file_copy(target: &Node) -> PlacedNode {
    PlacedNode {
        kind: Kind::File,
        mode: target.mode,
        uid: target.uid,
        gid: target.gid,
        mtime: target.mtime,
        size: target.size,
        rdev: None,
        target: Vec::new(),
        archive_index: target.archive_index,
        hardlink_group: None,
    }
}

fn dangling_template(index: usize) -> PlacedNode {
    PlacedNode {
        kind: Kind::File,
        mode: 0o644,
        uid: 0,
        gid: 0,
        mtime: Timestamp::default(),
        size: 0,
        rdev: None,
        target: Vec::new(),
        archive_index: Some(index),
        hardlink_group: None,
    }
}

/// Insert a `(k)` disambiguator into `base`, before a trailing
/// extension when one qualifies (§4.2), then re-truncate to 255 bytes
/// if the result grew past it.
fn apply_suffix(base: &str, k: u32) -> String {
    let suffix = format!(" ({k})");
    let (stem, ext) = split_extension_for_suffix(base);
    let combined = format!("{stem}{suffix}{ext}");
    if combined.len() <= path::MAX_NAME_LEN {
        return combined;
    }

    let budget = path::MAX_NAME_LEN.saturating_sub(suffix.len() + ext.len());
    let truncated_stem = path::truncate_keeping_extension(stem, budget);
    format!("{truncated_stem}{suffix}{ext}")
}

fn split_extension_for_suffix(name: &str) -> (&str, &str) {
    const MAX_EXT_LEN: usize = 11;
    if let Some(dot) = name.rfind('.') {
        if dot != 0 {
            let ext = &name[dot..];
            if ext.len() <= MAX_EXT_LEN && !ext.contains(' ') {
                return (&name[..dot], ext);
            }
        }
    }
    (name, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_entry(path: &str, size: u64) -> ArchiveEntry {
        ArchiveEntry {
            path: path.to_string(),
            uncompressed_size: size,
            mtime: Timestamp::default(),
            mode: 0o644,
            uid: 0,
            gid: 0,
            device: None,
            is_directory: false,
            is_encrypted: false,
            kind: EntryKind::Regular,
            target: Vec::new(),
        }
    }

    fn dir_entry(path: &str) -> ArchiveEntry {
        ArchiveEntry { is_directory: true, ..file_entry(path, 0) }
    }

    #[test]
    fn directories_keep_bare_name_files_get_suffixed() {
        // Mirrors google/mount-zip's file-dir-same-name.zip fixture.
        let entries = vec![
            file_entry("pet/cat", 25),
            file_entry("pet", 21),
            file_entry("pet/cat/fish", 30),
            dir_entry("pet/cat/fish/"),
            file_entry("pet/cat", 26),
            file_entry("pet", 22),
            file_entry("pet/cat/fish", 31),
        ];

        let options = BuildOptions { trim_root_singleton: false, ..Default::default() };
        let store = build_tree(&entries, &options);

        let cur = store.lookup(ROOT_ID, "CUR").expect("CUR bucket");
        let pet = store.lookup(cur.id, "pet").expect("pet directory");
        assert_eq!(pet.kind, Kind::Directory);
        assert_eq!(pet.nlink, 3);

        assert!(store.lookup(cur.id, "pet (1)").unwrap().kind == Kind::File);
        assert!(store.lookup(cur.id, "pet (2)").unwrap().kind == Kind::File);

        let cat = store.lookup(pet.id, "cat").expect("cat directory");
        assert_eq!(cat.kind, Kind::Directory);
        assert_eq!(cat.nlink, 3);
        assert_eq!(store.lookup(pet.id, "cat (1)").unwrap().size, 25);
        assert_eq!(store.lookup(pet.id, "cat (2)").unwrap().size, 26);

        let fish = store.lookup(cat.id, "fish").expect("fish directory");
        assert_eq!(fish.kind, Kind::Directory);
        assert_eq!(fish.nlink, 2);
        assert_eq!(store.lookup(cat.id, "fish (1)").unwrap().size, 30);
        assert_eq!(store.lookup(cat.id, "fish (2)").unwrap().size, 31);
    }

    #[test]
    fn escaping_paths_land_in_up_and_root_buckets() {
        let entries = vec![
            file_entry("../up-1.txt", 1),
            file_entry("../../up-2.txt", 1),
            file_entry("/top.txt", 1),
            file_entry("/../over-the-top.txt", 1),
            file_entry("normal.txt", 1),
        ];
        let options = BuildOptions { trim_root_singleton: false, ..Default::default() };
        let store = build_tree(&entries, &options);

        let up = store.lookup(ROOT_ID, "UP").unwrap();
        assert!(store.lookup(up.id, "up-1.txt").is_some());

        let upup = store.lookup(ROOT_ID, "UPUP").unwrap();
        assert!(store.lookup(upup.id, "up-2.txt").is_some());

        let root_bucket = store.lookup(ROOT_ID, "ROOT").unwrap();
        assert!(store.lookup(root_bucket.id, "top.txt").is_some());

        // `/../over-the-top.txt` escapes one level past the root, same
        // bucket as a plain `../`.
        assert!(store.lookup(up.id, "over-the-top.txt").is_some());

        let cur = store.lookup(ROOT_ID, "CUR").unwrap();
        assert!(store.lookup(cur.id, "normal.txt").is_some());
    }

    #[test]
    fn singleton_root_is_lifted_unless_notrim() {
        let entries = vec![file_entry("only.txt", 1)];

        let lifted = build_tree(&entries, &BuildOptions::default());
        assert!(lifted.lookup(ROOT_ID, "only.txt").is_some());
        assert!(lifted.lookup(ROOT_ID, "CUR").is_none());

        let not_lifted =
            build_tree(&entries, &BuildOptions { trim_root_singleton: false, ..Default::default() });
        let cur = not_lifted.lookup(ROOT_ID, "CUR").unwrap();
        assert!(not_lifted.lookup(cur.id, "only.txt").is_some());

        // The discarded "CUR" node must not linger in the store, or it
        // would inflate statvfs.f_files for a mount that no longer
        // references it.
        assert_eq!(lifted.len(), 2);
        assert_eq!(not_lifted.len(), 3);
    }

    #[test]
    fn hardlink_chain_shares_inode_and_dangling_becomes_empty_file() {
        let mut entries = vec![file_entry("c.txt", 4)];
        entries.push(ArchiveEntry {
            kind: EntryKind::Hardlink,
            target: b"c.txt".to_vec(),
            ..file_entry("b.txt", 0)
        });
        entries.push(ArchiveEntry {
            kind: EntryKind::Hardlink,
            target: b"b.txt".to_vec(),
            ..file_entry("a.txt", 0)
        });
        entries.push(ArchiveEntry {
            kind: EntryKind::Hardlink,
            target: b"does-not-exist.txt".to_vec(),
            ..file_entry("d.txt", 0)
        });

        let store = build_tree(&entries, &BuildOptions::default());
        let a = store.lookup(ROOT_ID, "a.txt").unwrap();
        let b = store.lookup(ROOT_ID, "b.txt").unwrap();
        let c = store.lookup(ROOT_ID, "c.txt").unwrap();
        assert_eq!(store.inode_of(a.id), store.inode_of(b.id));
        assert_eq!(store.inode_of(b.id), store.inode_of(c.id));
        assert_eq!(a.nlink, 3);

        let d = store.lookup(ROOT_ID, "d.txt").unwrap();
        assert_eq!(d.kind, Kind::File);
        assert_eq!(d.size, 0);
        assert_eq!(d.nlink, 1);
    }
}
