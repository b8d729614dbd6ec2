//! CLI entrypoint (§6): `mount-zip [options] <archive-path> <mount-point>`.
//!
//! Mirrors the process-exit-code contract in `mount_zip::error::MountError`
//! bit for bit; everything else (tree construction, FUSE serving) lives
//! in the library.

use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use mount_zip::error::MountError;
use mount_zip::options::MountOptions;
use mount_zip::Session;
use tracing_subscriber::EnvFilter;

/// Mount a ZIP archive as a read-only filesystem.
#[derive(Parser, Debug)]
#[command(name = "mount-zip", version, about)]
struct Args {
    /// Path to the ZIP archive to mount.
    archive_path: Option<PathBuf>,

    /// Directory to mount the archive on.
    mount_point: Option<PathBuf>,

    /// Comma-separated `key[=value]` mount options; may be repeated.
    #[arg(short = 'o', value_name = "opt,...")]
    options: Vec<String>,

    /// Run in the foreground instead of daemonizing.
    #[arg(short = 'f', long)]
    foreground: bool,

    /// Enable verbose logging.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Override name decoding (see `encoding=` under `-o`).
    #[arg(long)]
    encoding: Option<String>,

    /// Tolerate damaged/encrypted entries; mount anyway.
    #[arg(long)]
    force: bool,

    /// Disable scratch files (single rewindable stream per entry).
    #[arg(long)]
    nocache: bool,

    /// Pre-drain every entry into its scratch on mount.
    #[arg(long)]
    precache: bool,

    /// Drop symlink entries.
    #[arg(long)]
    nosymlinks: bool,

    /// Materialize hardlink groups as independent files.
    #[arg(long)]
    nohardlinks: bool,

    /// Drop block/char/fifo/socket entries.
    #[arg(long)]
    nospecials: bool,

    /// Disable root-singleton lifting.
    #[arg(long)]
    notrim: bool,

    /// Surface archive mode/uid/gid verbatim; kernel enforces access.
    #[arg(long)]
    default_permissions: bool,

    /// Octal mask ORed into directory mode clear bits.
    #[arg(long, value_name = "OCTAL")]
    dmask: Option<String>,

    /// Octal mask ORed into file mode clear bits.
    #[arg(long, value_name = "OCTAL")]
    fmask: Option<String>,
}

impl Args {
    /// Fold the long-form flags into a `-o`-style list so both syntaxes
    /// (§6) end up going through the same parser.
    fn as_dash_o_list(&self) -> Vec<String> {
        let mut items = Vec::new();
        if let Some(v) = &self.encoding {
            items.push(format!("encoding={v}"));
        }
        if self.force {
            items.push("force".to_string());
        }
        if self.nocache {
            items.push("nocache".to_string());
        }
        if self.precache {
            items.push("precache".to_string());
        }
        if self.nosymlinks {
            items.push("nosymlinks".to_string());
        }
        if self.nohardlinks {
            items.push("nohardlinks".to_string());
        }
        if self.nospecials {
            items.push("nospecials".to_string());
        }
        if self.notrim {
            items.push("notrim".to_string());
        }
        if self.default_permissions {
            items.push("default_permissions".to_string());
        }
        if let Some(v) = &self.dmask {
            items.push(format!("dmask={v}"));
        }
        if let Some(v) = &self.fmask {
            items.push(format!("fmask={v}"));
        }
        items
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(args) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(args: Args) -> Result<(), MountError> {
    let Some(archive_path) = args.archive_path else {
        return Err(MountError::NoArchivePath);
    };
    let Some(mount_point) = args.mount_point else {
        return Err(MountError::NoArchivePath);
    };

    let mut options = MountOptions::default();
    options.apply_dash_o_list(&args.as_dash_o_list()).map_err(|e| MountError::Malformed(e.0))?;
    options.apply_dash_o_list(&args.options).map_err(|e| MountError::Malformed(e.0))?;

    let passphrase = Some(read_passphrase());

    let fuse_options = mount_zip::fuse_mount_options(&options, &archive_path);
    let session = Session::build(&archive_path, passphrase.as_deref(), options)?;
    session.run(&mount_point, &fuse_options).map_err(MountError::ArchiveUnreadable)
}

/// Read the first line of stdin as the archive passphrase, stripping
/// the trailing newline; any further input is left for the kernel
/// (never consumed).
fn read_passphrase() -> Vec<u8> {
    if io::stdin().is_terminal() {
        eprint!("Archive password: ");
    }
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
    line.trim_end_matches(['\n', '\r']).as_bytes().to_vec()
}
