//! Decompression Engine (component 5, §4.5): delivers any byte range
//! of an entry's uncompressed stream in roughly O(page) time, in
//! arbitrary order, with at most one concurrent decompression stream
//! per member.
//!
//! Two modes, chosen once at mount time and shared by every `Decoder`:
//! buffered (scratch file + page cache) and no-cache (single rewindable
//! stream). Both serialize all mutation of one entry's stream/scratch
//! behind a single per-entry mutex (§5).

use std::fs::File;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crc32fast::Hasher as Crc32;

use crate::archive::ArchiveSource;
use crate::cache::{PageCache, PageKey, PAGE_SIZE};
use crate::error::EntryError;
use crate::scratch::ScratchDir;

/// How a [`Decoder`] serves random-access reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Scratch file + bounded page cache (default).
    Buffered { precache: bool },
    /// No scratch file; a single rewindable logical stream.
    NoCache,
}

/// Per-member decoder. One instance is shared across every open file
/// handle of the same archive entry (see `reader.rs`).
pub struct Decoder {
    entry_index: usize,
    uncompressed_size: u64,
    expected_crc32: u32,
    archive: Arc<dyn ArchiveSource>,
    passphrase: Option<Vec<u8>>,
    mode: Mode,
    page_cache: Option<PageCache>,
    scratch: Option<Arc<ScratchDir>>,
    /// Monotonically non-decreasing count of bytes known-good in the
    /// scratch file; safe to read up to this offset without holding
    /// the mutex below (§5 cancellation note). Only meaningful in
    /// `Mode::Buffered`.
    high_water: AtomicU64,
    state: Mutex<State>,
}

enum State {
    Buffered { scratch_file: Option<File>, stream: Option<Box<dyn Read + Send>>, crc: Crc32 },
    NoCache { stream: Option<Box<dyn Read + Send>>, position: u64 },
}

impl Decoder {
    pub fn new(
        entry_index: usize,
        uncompressed_size: u64,
        expected_crc32: u32,
        archive: Arc<dyn ArchiveSource>,
        passphrase: Option<Vec<u8>>,
        mode: Mode,
        page_cache: Option<PageCache>,
        scratch: Option<Arc<ScratchDir>>,
    ) -> Self {
        let state = match mode {
            Mode::Buffered { .. } => {
                State::Buffered { scratch_file: None, stream: None, crc: Crc32::new() }
            }
            Mode::NoCache => State::NoCache { stream: None, position: 0 },
        };

        let decoder = Self {
            entry_index,
            uncompressed_size,
            expected_crc32,
            archive,
            passphrase,
            mode,
            page_cache,
            scratch,
            high_water: AtomicU64::new(0),
            state: Mutex::new(state),
        };

        if let Mode::Buffered { precache: true } = mode {
            let _ = decoder.read(0, uncompressed_size as usize);
        }

        decoder
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Read up to `len` bytes starting at `offset`. Short reads at EOF
    /// are normal; returns `Err` only on an unrecoverable decode or I/O
    /// failure (surfaced as `EIO` by the Volume Facade).
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, EntryError> {
        if offset >= self.uncompressed_size || len == 0 {
            return Ok(Vec::new());
        }
        let len = len.min((self.uncompressed_size - offset) as usize);

        match self.mode {
            Mode::Buffered { .. } => self.read_buffered(offset, len),
            Mode::NoCache => self.read_nocache(offset, len),
        }
    }

    fn open_fresh_stream(&self) -> Result<Box<dyn Read + Send>, EntryError> {
        self.archive.open_stream(self.entry_index, self.passphrase.as_deref())
    }

    // ---- buffered mode -----------------------------------------------

    fn read_buffered(&self, offset: u64, len: usize) -> Result<Vec<u8>, EntryError> {
        let want_end = offset + len as u64;

        if want_end > self.high_water.load(Ordering::Acquire) {
            self.extend_to(want_end)?;
        }

        self.serve_from_scratch(offset, len)
    }

    /// Resume the codec stream from the current high-water mark and
    /// append to the scratch file until it reaches at least `target`
    /// bytes, or EOF.
    fn extend_to(&self, target: u64) -> Result<(), EntryError> {
        let scratch = self.scratch.as_ref().expect("buffered mode always has a scratch dir");
        let mut guard = self.state.lock().unwrap();
        let State::Buffered { scratch_file, stream, crc } = &mut *guard else {
            unreachable!("buffered decoder always holds State::Buffered")
        };

        // Another thread may have already extended past `target` while
        // we waited on the mutex.
        if self.high_water.load(Ordering::Acquire) >= target {
            return Ok(());
        }

        let file = match scratch_file {
            Some(f) => f,
            None => {
                let f = scratch.open_entry(self.entry_index).map_err(|e| EntryError::Io(e.to_string()))?;
                *scratch_file = Some(f);
                scratch_file.as_mut().unwrap()
            }
        };

        if stream.is_none() {
            *stream = Some(self.open_fresh_stream()?);
        }

        let mut buf = [0u8; 64 * 1024];
        let mut written = self.high_water.load(Ordering::Acquire);
        while written < target {
            let to_read = buf.len().min((self.uncompressed_size - written) as usize);
            if to_read == 0 {
                break;
            }
            let n = stream.as_mut().unwrap().read(&mut buf[..to_read]).map_err(|e| {
                *stream = None;
                EntryError::Io(e.to_string())
            })?;
            if n == 0 {
                break;
            }
            crc.update(&buf[..n]);
            file.write_all(&buf[..n]).map_err(|e| EntryError::Io(e.to_string()))?;
            written += n as u64;
            self.high_water.store(written, Ordering::Release);
        }

        if written >= self.uncompressed_size {
            *stream = None;
            if crc.clone().finalize() != self.expected_crc32 {
                return Err(EntryError::CrcMismatch);
            }
        }

        Ok(())
    }

    fn serve_from_scratch(&self, offset: u64, len: usize) -> Result<Vec<u8>, EntryError> {
        let mut out = Vec::with_capacity(len);
        let mut pos = offset;
        let end = offset + len as u64;

        while pos < end {
            let page_index = pos / PAGE_SIZE;
            let page_start = page_index * PAGE_SIZE;
            let page = self.page(page_index, page_start)?;

            let in_page_offset = (pos - page_start) as usize;
            let take = (page.len() - in_page_offset).min((end - pos) as usize);
            out.extend_from_slice(&page[in_page_offset..in_page_offset + take]);
            pos += take as u64;
        }

        Ok(out)
    }

    fn page(&self, page_index: u64, page_start: u64) -> Result<Arc<[u8]>, EntryError> {
        let key = PageKey { entry_index: self.entry_index, page_index };
        if let Some(cache) = &self.page_cache {
            if let Some(page) = cache.get(key) {
                return Ok(page);
            }
        }

        let guard = self.state.lock().unwrap();
        let State::Buffered { scratch_file: Some(file), .. } = &*guard else {
            return Err(EntryError::Io("scratch file not yet materialized".into()));
        };

        let high_water = self.high_water.load(Ordering::Acquire);
        let page_len = PAGE_SIZE.min(high_water.saturating_sub(page_start));
        if page_len == 0 {
            return Ok(Arc::from(Vec::new().into_boxed_slice()));
        }

        // SAFETY: the scratch file is private to this mount and only
        // ever grown, never truncated or rewritten, while mapped.
        let mmap = unsafe {
            memmap2::MmapOptions::new().offset(page_start).len(page_len as usize).map(file)
        }
        .map_err(|e| EntryError::Io(e.to_string()))?;

        let page: Arc<[u8]> = Arc::from(mmap.as_ref());
        // Only cache a page once it can never grow further: either it's
        // a full page, or it already runs to the entry's logical EOF.
        // `extend_to` can return after a short intermediate `read()`
        // (streams have no obligation to fill the caller's buffer) with
        // `high_water` landing mid-page; caching that partial window
        // would let a later read past it compute a negative
        // `page.len() - in_page_offset` in `serve_from_scratch` and
        // panic on the following slice.
        let page_complete = page_len == PAGE_SIZE || page_start + page_len >= self.uncompressed_size;
        if page_complete {
            if let Some(cache) = &self.page_cache {
                cache.insert(key, Arc::clone(&page));
            }
        }
        Ok(page)
    }

    // ---- no-cache mode ------------------------------------------------

    fn read_nocache(&self, offset: u64, len: usize) -> Result<Vec<u8>, EntryError> {
        let mut guard = self.state.lock().unwrap();
        let State::NoCache { stream, position } = &mut *guard else {
            unreachable!("no-cache decoder always holds State::NoCache")
        };

        if stream.is_none() || offset < *position {
            *stream = Some(self.open_fresh_stream()?);
            *position = 0;
        }

        if *position < offset {
            discard(stream.as_mut().unwrap(), offset - *position).map_err(|e| {
                *stream = None;
                e
            })?;
            *position = offset;
        }

        let mut buf = vec![0u8; len];
        let n = read_fill(stream.as_mut().unwrap(), &mut buf).map_err(|e| {
            *stream = None;
            e
        })?;
        buf.truncate(n);
        *position += n as u64;

        if *position >= self.uncompressed_size {
            *stream = None;
        }

        Ok(buf)
    }
}

/// Read and discard exactly `n` bytes, used by no-cache mode to skip
/// forward to a requested offset.
fn discard(stream: &mut Box<dyn Read + Send>, mut n: u64) -> Result<(), EntryError> {
    let mut buf = [0u8; 64 * 1024];
    while n > 0 {
        let chunk = (buf.len() as u64).min(n) as usize;
        let read = stream.read(&mut buf[..chunk]).map_err(|e| EntryError::Io(e.to_string()))?;
        if read == 0 {
            break;
        }
        n -= read as u64;
    }
    Ok(())
}

/// Read until `buf` is full or the stream hits EOF.
fn read_fill(stream: &mut Box<dyn Read + Send>, buf: &mut [u8]) -> Result<usize, EntryError> {
    let mut total = 0;
    while total < buf.len() {
        let n = stream.read(&mut buf[total..]).map_err(|e| EntryError::Io(e.to_string()))?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
