//! Error taxonomy: [`MountError`] aborts the mount with a process exit
//! code (see `README`/§6 of the design notes); [`EntryError`] is scoped
//! to a single archive entry and is surfaced to callers as `EIO`.

use std::fmt;

/// Failure that prevents the filesystem from mounting at all.
///
/// Each variant corresponds to one of the bit-exact process exit codes
/// the CLI must return.
#[derive(Debug)]
pub enum MountError {
    /// The archive path does not exist (exit 19).
    ArchiveNotFound,
    /// The archive exists but could not be opened, e.g. permissions (exit 21).
    ArchiveUnreadable(std::io::Error),
    /// The archive is not a valid or supported ZIP file (exit 29).
    Malformed(String),
    /// The archive has encrypted entries and no passphrase was given (exit 36).
    PassphraseRequired,
    /// A passphrase was given but does not decrypt the archive (exit 37).
    WrongPassphrase,
    /// No archive path was given on the command line (exit 38).
    NoArchivePath,
}

impl MountError {
    /// Process exit code mandated for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            MountError::ArchiveNotFound => 19,
            MountError::ArchiveUnreadable(_) => 21,
            MountError::Malformed(_) => 29,
            MountError::PassphraseRequired => 36,
            MountError::WrongPassphrase => 37,
            MountError::NoArchivePath => 38,
        }
    }
}

impl fmt::Display for MountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountError::ArchiveNotFound => write!(f, "archive file does not exist"),
            MountError::ArchiveUnreadable(e) => write!(f, "cannot open archive: {e}"),
            MountError::Malformed(msg) => write!(f, "archive is malformed or unsupported: {msg}"),
            MountError::PassphraseRequired => write!(f, "archive is encrypted, no passphrase given"),
            MountError::WrongPassphrase => write!(f, "supplied passphrase is wrong"),
            MountError::NoArchivePath => write!(f, "no archive path was given"),
        }
    }
}

impl std::error::Error for MountError {}

/// Failure decoding a single archive entry. Never aborts the mount once
/// `force` is in effect; always becomes `EIO` on the affected `read`.
#[derive(Debug, Clone)]
pub enum EntryError {
    /// CRC-32 of the decoded bytes did not match the central directory.
    CrcMismatch,
    /// The underlying codec rejected the stream (unsupported method, truncation).
    Codec(String),
    /// I/O error against the archive file or the scratch file.
    Io(String),
    /// Entry is encrypted and no usable passphrase was supplied.
    Encrypted,
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryError::CrcMismatch => write!(f, "CRC-32 mismatch"),
            EntryError::Codec(msg) => write!(f, "codec error: {msg}"),
            EntryError::Io(msg) => write!(f, "I/O error: {msg}"),
            EntryError::Encrypted => write!(f, "entry is encrypted"),
        }
    }
}

impl std::error::Error for EntryError {}

impl From<&EntryError> for libc::c_int {
    fn from(_: &EntryError) -> Self {
        libc::EIO
    }
}
