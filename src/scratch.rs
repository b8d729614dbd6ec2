//! Scratch directory lifecycle (§4.5, §5, §6): one directory per
//! mount, one file per archive entry index, removed on unmount -- even
//! on abnormal exit, via a signal handler.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static CLEANUP_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Owns the per-mount scratch directory and removes it on drop (normal
/// unmount) or via a registered signal handler (abnormal exit).
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `$TMPDIR/mount-zip-<pid>` and register cleanup.
    pub fn create() -> io::Result<Arc<Self>> {
        let pid = std::process::id();
        let path = std::env::temp_dir().join(format!("mount-zip-{pid}"));
        fs::create_dir_all(&path)?;

        let scratch = Arc::new(Self { path });
        install_signal_cleanup(Arc::clone(&scratch));
        Ok(scratch)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the scratch file backing one archive entry.
    pub fn entry_path(&self, entry_index: usize) -> PathBuf {
        self.path.join(entry_index.to_string())
    }

    /// Create (or truncate) the scratch file for `entry_index`.
    pub fn open_entry(&self, entry_index: usize) -> io::Result<File> {
        File::options().read(true).write(true).create(true).truncate(true).open(self.entry_path(entry_index))
    }

    fn remove(&self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Register a `SIGINT`/`SIGTERM` handler that removes the scratch
/// directory before the process exits abnormally. Installed once per
/// process; subsequent calls are no-ops.
fn install_signal_cleanup(scratch: Arc<ScratchDir>) {
    if CLEANUP_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    // signal-hook's flag-based API would only let us know a signal
    // arrived, not run arbitrary cleanup; low-level `register` is the
    // documented escape hatch for "remove a file, then re-raise".
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        let scratch = Arc::clone(&scratch);
        unsafe {
            let _ = signal_hook::low_level::register(sig, move || {
                scratch.remove();
                signal_hook::low_level::emulate_default_handler(sig).ok();
            });
        }
    }
}
