//! Mount options (§4.6): the recognized `-o key[=val],...` / long-form
//! `--flag[=value]` surface, doubling as this crate's only runtime
//! configuration (see `SPEC_FULL.md` §B "Configuration").

use std::fmt;

/// Name-decoding strategy for archive entries (§4.1 step 1, §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    /// Trust each entry's own UTF-8 flag (general-purpose bit 11);
    /// this is what the `zip` crate already does internally, so this
    /// variant is a pass-through of its decoding.
    Auto,
    /// Defer entirely to the archive library's own heuristic
    /// (`encoding=libzip`).
    Libzip,
    /// Force every entry's raw name bytes through a named charset
    /// (anything `encoding_rs::Encoding::for_label` recognizes --
    /// `windows-1252`, `shift_jis`, `gbk`, `big5`, `koi8-r`, ...),
    /// overriding the per-entry UTF-8 flag (`archive.rs`'s
    /// `decode_name`). An unrecognized label is accepted here and
    /// falls back to the library's own decoded name at parse time
    /// rather than failing the mount.
    Named(String),
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Auto
    }
}

/// The full recognized mount-option set (§4.6 table).
#[derive(Debug, Clone)]
pub struct MountOptions {
    pub encoding: Encoding,
    pub force: bool,
    pub nocache: bool,
    pub precache: bool,
    pub nosymlinks: bool,
    pub nohardlinks: bool,
    pub nospecials: bool,
    pub notrim: bool,
    pub dmask: u16,
    pub fmask: u16,
    pub default_permissions: bool,
    /// Page cache capacity in bytes; not a named §4.6 option but the
    /// one size knob §4.5 calls out as "configurable".
    pub cache_capacity_bytes: u64,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            force: false,
            nocache: false,
            precache: false,
            nosymlinks: false,
            nohardlinks: false,
            nospecials: false,
            notrim: false,
            dmask: 0,
            fmask: 0,
            default_permissions: false,
            cache_capacity_bytes: crate::cache::DEFAULT_CAPACITY_BYTES,
        }
    }
}

#[derive(Debug)]
pub struct OptionParseError(pub String);

impl fmt::Display for OptionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid mount option: {}", self.0)
    }
}

impl std::error::Error for OptionParseError {}

impl MountOptions {
    /// Parse a `-o key[=val],key[=val],...` comma list (possibly
    /// passed multiple times; `values` is the concatenation of every
    /// occurrence), folding onto a `MountOptions` that already carries
    /// any long-form `--flag` defaults.
    pub fn apply_dash_o_list(&mut self, values: &[String]) -> Result<(), OptionParseError> {
        for group in values {
            for item in group.split(',') {
                if item.is_empty() {
                    continue;
                }
                self.apply_one(item)?;
            }
        }
        Ok(())
    }

    fn apply_one(&mut self, item: &str) -> Result<(), OptionParseError> {
        let (key, value) = match item.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (item, None),
        };

        match key {
            "encoding" => {
                let v = value.ok_or_else(|| OptionParseError("encoding= needs a value".into()))?;
                self.encoding = match v {
                    "utf-8" | "utf8" => Encoding::Auto,
                    "libzip" => Encoding::Libzip,
                    other => Encoding::Named(other.to_string()),
                };
            }
            "force" => self.force = true,
            "nocache" => self.nocache = true,
            "precache" => self.precache = true,
            "nosymlinks" => self.nosymlinks = true,
            "nohardlinks" => self.nohardlinks = true,
            "nospecials" => self.nospecials = true,
            "notrim" => self.notrim = true,
            "default_permissions" => self.default_permissions = true,
            "dmask" => self.dmask = parse_octal_mask(key, value)?,
            "fmask" => self.fmask = parse_octal_mask(key, value)?,
            // FUSE/libfuse-level options the transport handles itself
            // (mount point ownership, allow_other, etc.); the CORE has
            // nothing to do with them but must not reject them.
            "ro" | "rw" | "allow_other" | "allow_root" | "auto_unmount" | "nonempty" => {}
            other => return Err(OptionParseError(format!("unrecognized option `{other}`"))),
        }
        Ok(())
    }
}

fn parse_octal_mask(key: &str, value: Option<&str>) -> Result<u16, OptionParseError> {
    let v = value.ok_or_else(|| OptionParseError(format!("{key}= needs a value")))?;
    u16::from_str_radix(v, 8).map_err(|_| OptionParseError(format!("{key}={v} is not octal")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_list_sets_multiple_flags() {
        let mut opts = MountOptions::default();
        opts.apply_dash_o_list(&["force,nocache,dmask=022".to_string()]).unwrap();
        assert!(opts.force);
        assert!(opts.nocache);
        assert_eq!(opts.dmask, 0o022);
    }

    #[test]
    fn encoding_libzip_is_recognized() {
        let mut opts = MountOptions::default();
        opts.apply_dash_o_list(&["encoding=libzip".to_string()]).unwrap();
        assert_eq!(opts.encoding, Encoding::Libzip);
    }

    #[test]
    fn unknown_option_is_rejected() {
        let mut opts = MountOptions::default();
        assert!(opts.apply_dash_o_list(&["bogus".to_string()]).is_err());
    }

    #[test]
    fn fuse_passthrough_options_are_accepted() {
        let mut opts = MountOptions::default();
        assert!(opts.apply_dash_o_list(&["allow_other".to_string()]).is_ok());
    }
}
