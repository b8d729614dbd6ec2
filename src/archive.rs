//! Archive codec adapter (§6 "Archive codec" external interface).
//!
//! The CORE never parses ZIP bytes itself; it only consumes this
//! narrow trait. [`ZipArchiveSource`] is the concrete adapter over the
//! `zip` crate, which supplies deflate/bzip2/zstd/LZMA decompression and
//! ZipCrypto/AES decryption.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ouroboros::self_referencing;

use crate::error::{EntryError, MountError};
use crate::node::{Device, Timestamp};
use crate::options::Encoding;

/// What an archive entry ultimately becomes in the mounted tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    Hardlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

/// Info-ZIP "new" Unix extra field (`0x7875`, "ux"): carries a per-entry
/// UID/GID independent of the 16-bit central directory external
/// attributes. See Info-ZIP's APPNOTE addendum; widely produced by
/// `zip -X`/`7z`/Python's `zipfile` on POSIX hosts.
const UNIX_UID_GID_EXTRA_ID: u16 = 0x7875;

/// Private convention used by this crate's own archive adapter to mark
/// a hardlink entry, since plain ZIP has no standard encoding for one:
/// payload is the archive-relative target path as UTF-8 bytes. Real
/// archives in the wild never set this id; it only round-trips through
/// archives this crate itself (or a cooperating tool) produced. Every
/// other hardlink signal we looked for in `original_source/`'s test
/// fixtures turned out to be just a same-content regular file sharing a
/// name prefix (`z-hardlink1`, `z-hardlink2`, ...) with no reusable wire
/// marker, so in the absence of one we define our own (see DESIGN.md).
const HARDLINK_TARGET_EXTRA_ID: u16 = 0x7864;

/// One record from the archive's central directory, already decoded to
/// a name and stripped of codec-specific detail the tree builder never
/// needs.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub mtime: Timestamp,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub device: Option<Device>,
    pub is_directory: bool,
    pub is_encrypted: bool,
    pub kind: EntryKind,
    /// Symlink target bytes, or (for a ZIP "hardlink" extension entry)
    /// the archive-relative path of the link's target.
    pub target: Vec<u8>,
}

/// The minimal interface the CORE consumes from a physical archive
/// codec (§6).
pub trait ArchiveSource: Send + Sync {
    fn entries(&self) -> &[ArchiveEntry];

    /// Open a fresh, independent sequential byte source for `index`,
    /// decrypting with `passphrase` if the entry requires one. Callers
    /// may drop and reopen this to implement "seek to start" (§6).
    fn open_stream(
        &self,
        index: usize,
        passphrase: Option<&[u8]>,
    ) -> Result<Box<dyn Read + Send>, EntryError>;
}

/// Adapter over `zip::ZipArchive`.
pub struct ZipArchiveSource {
    path: PathBuf,
    entries: Vec<ArchiveEntry>,
    // Guards nothing shared today; kept so a future caching layer over
    // the central directory has an obvious place to live without
    // reshaping the public API.
    _guard: Mutex<()>,
}

impl ZipArchiveSource {
    /// Parse the central directory at `path`, decoding each entry's
    /// name per `encoding` (§4.1 step 1, §9). Fails mount per §7's
    /// `MountFailure` taxonomy.
    pub fn open(path: &Path, encoding: &Encoding) -> Result<Self, MountError> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                MountError::ArchiveNotFound
            } else {
                MountError::ArchiveUnreadable(e)
            }
        })?;

        let mut archive = zip::ZipArchive::new(BufReader::new(file))
            .map_err(|e| MountError::Malformed(e.to_string()))?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let zf = archive.by_index_raw(i).map_err(|e| MountError::Malformed(e.to_string()))?;
            entries.push(entry_from_zipfile(&zf, encoding));
        }
        drop(archive);

        let mut source = Self { path: path.to_path_buf(), entries, _guard: Mutex::new(()) };
        source.read_symlink_targets()?;
        Ok(source)
    }

    /// Symlink targets are stored as the entry's file content, not as
    /// metadata, so they need a second pass that actually decompresses
    /// each symlink entry (unencrypted ones only -- an encrypted
    /// symlink target is read lazily like any other entry and surfaced
    /// as `EIO` if never resolvable without a passphrase).
    fn read_symlink_targets(&mut self) -> Result<(), MountError> {
        let indices: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == EntryKind::Symlink && !e.is_encrypted)
            .map(|(i, _)| i)
            .collect();

        for index in indices {
            let mut stream = self
                .open_stream(index, None)
                .map_err(|e| MountError::Malformed(e.to_string()))?;
            let mut target = Vec::new();
            stream.read_to_end(&mut target).map_err(|e| MountError::Malformed(e.to_string()))?;
            self.entries[index].target = target;
        }
        Ok(())
    }

    /// Validate that `passphrase` opens every encrypted entry; used at
    /// mount time so wrong/missing passphrases fail the mount (§4.5,
    /// §6) instead of surfacing only on first read.
    pub fn verify_passphrase(&self, passphrase: Option<&[u8]>) -> Result<(), MountError> {
        let any_encrypted = self.entries.iter().any(|e| e.is_encrypted);
        if !any_encrypted {
            return Ok(());
        }
        let Some(pass) = passphrase else {
            return Err(MountError::PassphraseRequired);
        };

        let first_encrypted =
            self.entries.iter().position(|e| e.is_encrypted && !e.is_directory);
        let Some(index) = first_encrypted else {
            return Ok(());
        };

        let mut stream = self
            .open_stream(index, Some(pass))
            .map_err(|_| MountError::WrongPassphrase)?;
        let mut probe = [0u8; 1];
        match stream.read(&mut probe) {
            Ok(_) => Ok(()),
            Err(_) => Err(MountError::WrongPassphrase),
        }
    }
}

impl ArchiveSource for ZipArchiveSource {
    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn open_stream(
        &self,
        index: usize,
        passphrase: Option<&[u8]>,
    ) -> Result<Box<dyn Read + Send>, EntryError> {
        let file = File::open(&self.path).map_err(|e| EntryError::Io(e.to_string()))?;
        let archive = zip::ZipArchive::new(BufReader::new(file))
            .map_err(|e| EntryError::Codec(e.to_string()))?;

        let passphrase = passphrase.map(|p| p.to_vec());
        let stream = ZipEntryStreamBuilder {
            archive,
            file_builder: |archive: &mut zip::ZipArchive<BufReader<File>>| {
                match &passphrase {
                    Some(pass) => archive.by_index_decrypt(index, pass),
                    None => archive.by_index(index),
                }
            },
        }
        .try_build()
        .map_err(|e| match e {
            zip::result::ZipError::UnsupportedArchive(_) => EntryError::Encrypted,
            other => EntryError::Codec(other.to_string()),
        })?;

        Ok(Box::new(stream))
    }
}

#[self_referencing]
struct ZipEntryStream {
    archive: zip::ZipArchive<BufReader<File>>,
    #[borrows(mut archive)]
    #[covariant]
    file: zip::read::ZipFile<'this>,
}

impl Read for ZipEntryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.with_file_mut(|f| f.read(buf))
    }
}

fn entry_from_zipfile(zf: &zip::read::ZipFile, encoding: &Encoding) -> ArchiveEntry {
    let name = decode_name(zf.name_raw(), zf.name(), encoding);
    let unix_mode = zf.unix_mode().unwrap_or(if zf.is_dir() { 0o040755 } else { 0o100644 });
    let file_type_bits = unix_mode & 0o170000;

    let extra = zf.extra_data().unwrap_or(&[]);
    let hardlink_target = find_extra_field(extra, HARDLINK_TARGET_EXTRA_ID)
        .map(|payload| payload.to_vec());
    let (uid, gid) = find_unix_uid_gid(extra).unwrap_or((0, 0));

    let (kind, is_dir, target) = if let Some(target) = hardlink_target {
        (EntryKind::Hardlink, false, target)
    } else if zf.is_dir() {
        (EntryKind::Directory, true, Vec::new())
    } else {
        match file_type_bits {
            0o120000 => (EntryKind::Symlink, false, Vec::new()),
            0o140000 => (EntryKind::Socket, false, Vec::new()),
            0o060000 => (EntryKind::BlockDevice, false, Vec::new()),
            0o020000 => (EntryKind::CharDevice, false, Vec::new()),
            0o010000 => (EntryKind::Fifo, false, Vec::new()),
            _ => (EntryKind::Regular, false, Vec::new()),
        }
    };

    // Device files carry no real payload; tools that store them in ZIP
    // (following the historic Info-ZIP/`cpio` convention) pack the rdev
    // major/minor pair into the otherwise-unused uncompressed-size
    // field rather than the file content.
    let (uncompressed_size, device) = match kind {
        EntryKind::BlockDevice | EntryKind::CharDevice => {
            let encoded = zf.size();
            (0, Some(Device { major: (encoded >> 8) as u32, minor: (encoded & 0xff) as u32 }))
        }
        _ => (zf.size(), None),
    };

    let mtime = zf
        .last_modified()
        .map(|dt| Timestamp {
            secs: dos_datetime_to_unix(&dt),
            nanos: 0,
        })
        .unwrap_or_default();

    ArchiveEntry {
        path: name,
        uncompressed_size,
        crc32: zf.crc32(),
        mtime,
        mode: (unix_mode & 0o7777) as u32,
        uid,
        gid,
        device,
        is_directory: is_dir,
        is_encrypted: zf.encrypted(),
        kind,
        target,
    }
}

/// Decode one entry's name per the `encoding=` mount option (§4.1 step
/// 1, §9): `Auto`/`Libzip` both defer to `fallback`, the name the `zip`
/// crate itself already decoded by consulting the entry's own
/// UTF-8 general-purpose-bit-11 flag -- this *is* "the archive
/// library's heuristic" `encoding=libzip` asks to defer to. A `Named`
/// charset is an explicit user override: it forces every entry's raw
/// bytes through that charset via `encoding_rs`, taking precedence over
/// the per-entry flag (the same override-wins-over-declared-flag
/// behavior common `unzip -O`/-style charset flags have, for archives
/// whose own UTF-8 flag was set incorrectly by the tool that wrote
/// them). An unrecognized charset label falls back to `fallback`
/// rather than failing the mount.
fn decode_name(raw: &[u8], fallback: &str, encoding: &Encoding) -> String {
    match encoding {
        Encoding::Auto | Encoding::Libzip => fallback.to_string(),
        Encoding::Named(label) => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(enc) => enc.decode(raw).0.into_owned(),
            None => fallback.to_string(),
        },
    }
}

/// Scan a raw ZIP extra-field block (concatenated `id(u16) size(u16)
/// payload` records, little-endian) for one matching `want_id`.
fn find_extra_field(extra: &[u8], want_id: u16) -> Option<&[u8]> {
    let mut pos = 0usize;
    while pos + 4 <= extra.len() {
        let id = u16::from_le_bytes([extra[pos], extra[pos + 1]]);
        let size = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        let start = pos + 4;
        let end = start.checked_add(size)?;
        if end > extra.len() {
            return None;
        }
        if id == want_id {
            return Some(&extra[start..end]);
        }
        pos = end;
    }
    None
}

/// Parse Info-ZIP's "new" Unix extra field (`0x7875`): `version(1)
/// uid_size(1) uid(uid_size) gid_size(1) gid(gid_size)`, each integer
/// little-endian and no wider than 8 bytes in practice.
fn find_unix_uid_gid(extra: &[u8]) -> Option<(u32, u32)> {
    let field = find_extra_field(extra, UNIX_UID_GID_EXTRA_ID)?;
    if field.len() < 3 {
        return None;
    }
    let uid_size = field[1] as usize;
    let uid_start = 2;
    let uid_end = uid_start.checked_add(uid_size)?;
    let uid = read_le_uint(field.get(uid_start..uid_end)?);

    let gid_size = *field.get(uid_end)?;
    let gid_start = uid_end + 1;
    let gid_end = gid_start.checked_add(gid_size as usize)?;
    let gid = read_le_uint(field.get(gid_start..gid_end)?);

    Some((uid, gid))
}

fn read_le_uint(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    for (i, b) in bytes.iter().take(4).enumerate() {
        buf[i] = *b;
    }
    u32::from_le_bytes(buf)
}

/// DOS-date to unix-epoch conversion; `zip`'s `DateTime` has no
/// timezone, so this is treated as UTC (the same approximation libzip
/// itself makes). DOS dates have no representation before 1980.
fn dos_datetime_to_unix(dt: &zip::DateTime) -> i64 {
    let year = dt.year() as i64;
    let (month, day) = (dt.month() as i64, dt.day() as i64);
    let (hour, minute, second) = (dt.hour() as i64, dt.minute() as i64, dt.second() as i64);

    let days = days_from_civil(year, month, day);
    days * 86_400 + hour * 3_600 + minute * 60 + second
}

/// Howard Hinnant's civil-from-days algorithm, in reverse: days since
/// the unix epoch for a given proleptic-Gregorian `(y, m, d)`.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_field_scan_finds_matching_id_and_skips_others() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&0x0001u16.to_le_bytes());
        extra.extend_from_slice(&4u16.to_le_bytes());
        extra.extend_from_slice(&[9, 9, 9, 9]);
        extra.extend_from_slice(&UNIX_UID_GID_EXTRA_ID.to_le_bytes());
        extra.extend_from_slice(&3u16.to_le_bytes());
        extra.extend_from_slice(&[1, 2, 3]);

        assert_eq!(find_extra_field(&extra, UNIX_UID_GID_EXTRA_ID), Some(&[1u8, 2, 3][..]));
        assert_eq!(find_extra_field(&extra, 0x9999), None);
    }

    #[test]
    fn unix_uid_gid_extra_field_parses_one_byte_ids() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&UNIX_UID_GID_EXTRA_ID.to_le_bytes());
        extra.extend_from_slice(&7u16.to_le_bytes());
        extra.push(1); // version
        extra.push(2); // uid_size
        extra.extend_from_slice(&1000u16.to_le_bytes());
        extra.push(2); // gid_size
        extra.extend_from_slice(&1000u16.to_le_bytes());

        assert_eq!(find_unix_uid_gid(&extra), Some((1000, 1000)));
    }

    #[test]
    fn dos_epoch_matches_known_date() {
        // 1980-01-01 00:00:00 UTC, the earliest DOS date, is exactly
        // 3652 days before the Unix epoch (315532800 seconds).
        assert_eq!(days_from_civil(1980, 1, 1) * 86_400, 315_532_800);
    }

    #[test]
    fn auto_and_libzip_defer_to_the_library_decoded_name() {
        assert_eq!(decode_name(b"raw", "already-decoded.txt", &Encoding::Auto), "already-decoded.txt");
        assert_eq!(decode_name(b"raw", "already-decoded.txt", &Encoding::Libzip), "already-decoded.txt");
    }

    #[test]
    fn named_encoding_overrides_the_library_default() {
        // "caf\xe9.txt" is "café.txt" in windows-1252, but would have
        // decoded as something else (or lossily) under the library's
        // own UTF-8-or-fallback heuristic.
        let raw = b"caf\xe9.txt";
        let name = decode_name(raw, "caf?.txt", &Encoding::Named("windows-1252".to_string()));
        assert_eq!(name, "café.txt");
    }

    #[test]
    fn unrecognized_named_encoding_falls_back_to_library_default() {
        let name = decode_name(b"x", "fallback.txt", &Encoding::Named("not-a-real-charset".to_string()));
        assert_eq!(name, "fallback.txt");
    }
}
