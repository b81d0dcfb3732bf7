//! ConfigFS file operations for USB Gadget
//!
//! [`ConfigFs`] is the seam between the gadget core and the kernel: every
//! filesystem access made by the loader, the mutation engine and the
//! accessors goes through it. [`HostFs`] is the real implementation.
//! Raw OS error codes are classified here and nowhere else.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use tracing::{trace, warn};

use crate::error::{Error, Result};

/// Kind of a directory entry, as reported without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// One entry returned by [`ConfigFs::list_directory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Synchronous filesystem primitives the gadget core is built on
pub trait ConfigFs {
    /// List a directory. Order is unspecified.
    fn list_directory(&self, path: &Path) -> Result<Vec<DirEntry>>;

    fn read_link(&self, path: &Path) -> Result<PathBuf>;

    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write the whole buffer in a single write call.
    ///
    /// configfs attributes are parsed on the first write(), so the value
    /// must never be split.
    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()>;

    fn make_directory(&self, path: &Path) -> Result<()>;

    /// Create `link` pointing at `target`
    fn make_symlink(&self, target: &Path, link: &Path) -> Result<()>;

    /// Remove a directory; fails with `NotEmpty` while it holds children
    fn remove_directory(&self, path: &Path) -> Result<()>;

    fn remove_file_or_link(&self, path: &Path) -> Result<()>;
}

/// Map an OS error onto the crate's error classification
pub fn classify(err: std::io::Error, path: &Path) -> Error {
    let shown = path.display().to_string();
    match err.raw_os_error().map(Errno::from_raw) {
        Some(Errno::ENOENT) => Error::NotFound(shown),
        Some(Errno::EACCES) | Some(Errno::EPERM) => Error::PermissionDenied(shown),
        Some(Errno::EEXIST) => Error::AlreadyExists(shown),
        Some(Errno::ENOTEMPTY) => Error::NotEmpty(shown),
        _ => Error::Io {
            path: shown,
            source: err,
        },
    }
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFs;

impl HostFs {
    pub fn new() -> Self {
        Self
    }
}

impl ConfigFs for HostFs {
    fn list_directory(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let entries = fs::read_dir(path).map_err(|e| classify(e, path))?;

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| classify(e, path))?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!("Skipping non UTF-8 entry {:?} in {}", raw, path.display());
                    continue;
                }
            };
            let kind = match entry.file_type() {
                Ok(t) if t.is_symlink() => EntryKind::Symlink,
                Ok(t) if t.is_dir() => EntryKind::Directory,
                Ok(t) if t.is_file() => EntryKind::File,
                Ok(_) => EntryKind::Other,
                Err(e) => return Err(classify(e, &entry.path())),
            };
            out.push(DirEntry { name, kind });
        }
        trace!("Listed {} entries in {}", out.len(), path.display());
        Ok(out)
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        fs::read_link(path).map_err(|e| classify(e, path))
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| classify(e, path))
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        // Attribute files exist only when the kernel created them
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| classify(e, path))?;

        file.write_all(data).map_err(|e| classify(e, path))?;

        // Explicitly flush so the kernel has processed the value before we return
        file.flush().map_err(|e| classify(e, path))?;
        trace!("Wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    fn make_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir(path).map_err(|e| classify(e, path))
    }

    fn make_symlink(&self, target: &Path, link: &Path) -> Result<()> {
        std::os::unix::fs::symlink(target, link).map_err(|e| classify(e, link))
    }

    fn remove_directory(&self, path: &Path) -> Result<()> {
        fs::remove_dir(path).map_err(|e| classify(e, path))
    }

    fn remove_file_or_link(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).map_err(|e| classify(e, path))
    }
}
