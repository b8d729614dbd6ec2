//! Process-wide bounded LRU page cache (§4.5, §5): the one piece of
//! global mutable state besides the scratch directory. Pages are
//! immutable once written; only cache membership changes after mount.

use std::sync::Arc;

use moka::sync::Cache;

/// Fixed window size mapped from each entry's scratch file.
pub const PAGE_SIZE: u64 = 4096;

/// Default page cache capacity: 128 MiB.
pub const DEFAULT_CAPACITY_BYTES: u64 = 128 * 1024 * 1024;

/// Key identifying one page: (archive entry index, page index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub entry_index: usize,
    pub page_index: u64,
}

/// Bounded, size-weighted LRU shared by every open entry's decoder.
/// Built on `moka::sync::Cache`, weighing each page by its byte length
/// so `capacity_bytes` is an actual memory bound rather than an entry
/// count.
#[derive(Clone)]
pub struct PageCache {
    inner: Cache<PageKey, Arc<[u8]>>,
}

impl PageCache {
    pub fn new(capacity_bytes: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity_bytes)
            .weigher(|_key, value: &Arc<[u8]>| value.len() as u32)
            .build();
        Self { inner }
    }

    pub fn get(&self, key: PageKey) -> Option<Arc<[u8]>> {
        self.inner.get(&key)
    }

    pub fn insert(&self, key: PageKey, page: Arc<[u8]>) {
        self.inner.insert(key, page);
    }

    /// Drop every page belonging to one archive entry. Called when a
    /// `Decoder` is torn down under `nocache`/reader-count-reaches-zero.
    pub fn evict_entry(&self, entry_index: usize) {
        self.inner.invalidate_entries_if(move |key, _| key.entry_index == entry_index).ok();
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let cache = PageCache::new(DEFAULT_CAPACITY_BYTES);
        let key = PageKey { entry_index: 0, page_index: 3 };
        cache.insert(key, Arc::from(vec![1u8, 2, 3].into_boxed_slice()));
        cache.inner.run_pending_tasks();
        assert_eq!(cache.get(key).as_deref(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn eviction_only_affects_targeted_entry() {
        let cache = PageCache::new(DEFAULT_CAPACITY_BYTES);
        cache.insert(PageKey { entry_index: 0, page_index: 0 }, Arc::from(vec![0u8; 4].into_boxed_slice()));
        cache.insert(PageKey { entry_index: 1, page_index: 0 }, Arc::from(vec![1u8; 4].into_boxed_slice()));
        cache.inner.run_pending_tasks();

        cache.evict_entry(0);
        cache.inner.run_pending_tasks();

        assert!(cache.get(PageKey { entry_index: 0, page_index: 0 }).is_none());
        assert!(cache.get(PageKey { entry_index: 1, page_index: 0 }).is_some());
    }
}
