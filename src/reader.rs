//! Reader Registry (component 4, §4.4): a lazy, per-entry [`Decoder`]
//! factory shared by every open file handle of the same archive entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::archive::ArchiveSource;
use crate::cache::PageCache;
use crate::decoder::{Decoder, Mode};
use crate::error::EntryError;
use crate::scratch::ScratchDir;

struct Entry {
    decoder: Arc<Decoder>,
    open_handles: AtomicUsize,
}

/// Opaque handle returned by [`ReaderRegistry::open`]; cheap to copy
/// around, carries only what the Volume Facade needs to route a
/// subsequent `read`/`release`.
pub struct FileHandle {
    pub entry_index: usize,
    decoder: Arc<Decoder>,
}

impl FileHandle {
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, EntryError> {
        self.decoder.read(offset, len)
    }
}

/// Per-mount registry of live decoders, keyed by archive entry index.
pub struct ReaderRegistry {
    archive: Arc<dyn ArchiveSource>,
    passphrase: Option<Vec<u8>>,
    mode: Mode,
    page_cache: Option<PageCache>,
    scratch: Option<Arc<ScratchDir>>,
    /// When set, a decoder is torn down (and its cached pages evicted)
    /// as soon as its last handle is released (`nocache` mount option;
    /// see §4.4).
    evict_on_last_release: bool,
    entries: Mutex<HashMap<usize, Arc<Entry>>>,
}

impl ReaderRegistry {
    pub fn new(
        archive: Arc<dyn ArchiveSource>,
        passphrase: Option<Vec<u8>>,
        mode: Mode,
        page_cache: Option<PageCache>,
        scratch: Option<Arc<ScratchDir>>,
        evict_on_last_release: bool,
    ) -> Self {
        Self { archive, passphrase, mode, page_cache, scratch, evict_on_last_release, entries: Mutex::new(HashMap::new()) }
    }

    /// `open(entry_index)`: returns a new handle, creating the shared
    /// decoder for this entry on first open.
    pub fn open(&self, entry_index: usize, uncompressed_size: u64, expected_crc32: u32) -> FileHandle {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(entry_index).or_insert_with(|| {
            Arc::new(Entry {
                decoder: Arc::new(Decoder::new(
                    entry_index,
                    uncompressed_size,
                    expected_crc32,
                    Arc::clone(&self.archive),
                    self.passphrase.clone(),
                    self.mode,
                    self.page_cache.clone(),
                    self.scratch.clone(),
                )),
                open_handles: AtomicUsize::new(0),
            })
        });
        entry.open_handles.fetch_add(1, Ordering::AcqRel);
        FileHandle { entry_index, decoder: Arc::clone(&entry.decoder) }
    }

    /// `release`: decrement the handle count; under `nocache`, tear the
    /// decoder down entirely once the last handle closes.
    pub fn release(&self, handle: FileHandle) {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(&handle.entry_index) else { return };

        if entry.open_handles.fetch_sub(1, Ordering::AcqRel) == 1 && self.evict_on_last_release {
            entries.remove(&handle.entry_index);
            if let Some(cache) = &self.page_cache {
                cache.evict_entry(handle.entry_index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    struct EmptySource;
    impl ArchiveSource for EmptySource {
        fn entries(&self) -> &[crate::archive::ArchiveEntry] {
            &[]
        }
        fn open_stream(
            &self,
            _index: usize,
            _passphrase: Option<&[u8]>,
        ) -> Result<Box<dyn Read + Send>, EntryError> {
            Ok(Box::new(Cursor::new(vec![1, 2, 3, 4])))
        }
    }

    #[test]
    fn repeated_open_shares_one_decoder() {
        let registry = ReaderRegistry::new(Arc::new(EmptySource), None, Mode::NoCache, None, None, false);
        let a = registry.open(0, 4, 0);
        let b = registry.open(0, 4, 0);
        assert!(Arc::ptr_eq(&a.decoder, &b.decoder));
        registry.release(a);
        registry.release(b);
    }

    #[test]
    fn nocache_teardown_removes_entry_after_last_release() {
        let registry = ReaderRegistry::new(Arc::new(EmptySource), None, Mode::NoCache, None, None, true);
        let a = registry.open(0, 4, 0);
        registry.release(a);
        assert!(registry.entries.lock().unwrap().is_empty());
    }
}
