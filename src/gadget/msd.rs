//! Mass storage function attributes

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::attrs::AttrDir;
use super::configfs::{ConfigFs, EntryKind};
use crate::error::{Error, Result};

/// One logical unit (`lun.<n>`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LunAttrs {
    /// Emulate a CD-ROM
    pub cdrom: bool,
    /// Read-only mode
    pub ro: bool,
    /// Disable Force Unit Access
    pub nofua: bool,
    /// Removable media
    pub removable: bool,
    /// Backing file or device; empty when no medium is inserted
    pub file: PathBuf,
}

impl Default for LunAttrs {
    fn default() -> Self {
        Self {
            cdrom: false,
            ro: false,
            nofua: false,
            removable: true,
            file: PathBuf::new(),
        }
    }
}

impl LunAttrs {
    /// CD-ROM backed by an image
    pub fn cdrom(file: impl Into<PathBuf>) -> Self {
        Self {
            cdrom: true,
            ro: true,
            file: file.into(),
            ..Default::default()
        }
    }

    /// Disk backed by an image
    pub fn disk(file: impl Into<PathBuf>, read_only: bool) -> Self {
        Self {
            ro: read_only,
            file: file.into(),
            ..Default::default()
        }
    }

    fn read<F: ConfigFs>(attrs: &AttrDir<'_, F>) -> Result<Self> {
        Ok(Self {
            cdrom: attrs.read_bool("cdrom")?,
            ro: attrs.read_bool("ro")?,
            nofua: attrs.read_bool("nofua")?,
            removable: attrs.read_bool("removable")?,
            file: PathBuf::from(attrs.read_string("file")?),
        })
    }

    fn write<F: ConfigFs>(&self, attrs: &AttrDir<'_, F>) -> Result<()> {
        let file = self.file.to_str().ok_or_else(|| {
            Error::InvalidAttributeValue(format!("{:?} is not valid UTF-8", self.file))
        })?;

        // The kernel refuses most changes while a medium is attached
        let current = LunAttrs::read(attrs).ok();
        if current.as_ref().map_or(true, |c| !c.file.as_os_str().is_empty()) {
            attrs.write_text("file", "")?;
        }

        let flags = [
            ("cdrom", self.cdrom, current.as_ref().map(|c| c.cdrom)),
            ("ro", self.ro, current.as_ref().map(|c| c.ro)),
            ("removable", self.removable, current.as_ref().map(|c| c.removable)),
            ("nofua", self.nofua, current.as_ref().map(|c| c.nofua)),
        ];
        for (name, wanted, current) in flags {
            if current != Some(wanted) {
                debug!("Updating {}/{}: {:?} -> {}", attrs.dir().display(), name, current, wanted);
                attrs.write_bool(name, wanted)?;
            }
        }

        if !file.is_empty() {
            attrs.write_text("file", file)?;
            info!(
                "{} attached to {} (cdrom={}, ro={})",
                attrs.dir().display(),
                file,
                self.cdrom,
                self.ro
            );
        }
        Ok(())
    }
}

/// Attribute bundle of a `mass_storage` function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MsdAttrs {
    pub stall: bool,
    /// LUNs in index order; `luns[0]` is the kernel-created `lun.0`
    pub luns: Vec<LunAttrs>,
}

impl Default for MsdAttrs {
    fn default() -> Self {
        Self {
            stall: true,
            luns: vec![LunAttrs::default()],
        }
    }
}

fn lun_dir_name(index: usize) -> String {
    format!("lun.{}", index)
}

/// Indices of the `lun.<n>` directories present, ascending
fn lun_indices<F: ConfigFs>(attrs: &AttrDir<'_, F>) -> Result<Vec<usize>> {
    let mut indices: Vec<usize> = attrs
        .fs()
        .list_directory(attrs.dir())?
        .into_iter()
        .filter(|e| e.kind == EntryKind::Directory)
        .filter_map(|e| e.name.strip_prefix("lun.")?.parse().ok())
        .collect();
    indices.sort_unstable();
    Ok(indices)
}

impl MsdAttrs {
    pub(crate) fn read<F: ConfigFs>(attrs: &AttrDir<'_, F>) -> Result<Self> {
        let stall = attrs.read_bool("stall")?;
        let luns = lun_indices(attrs)?
            .into_iter()
            .map(|i| LunAttrs::read(&attrs.child(&lun_dir_name(i))?))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stall, luns })
    }

    pub(crate) fn write<F: ConfigFs>(&self, attrs: &AttrDir<'_, F>) -> Result<()> {
        if self.luns.is_empty() {
            return Err(Error::InvalidAttributeValue(format!(
                "{}: mass storage needs at least one LUN",
                attrs.dir().display()
            )));
        }

        attrs.write_bool("stall", self.stall)?;

        let existing = lun_indices(attrs)?;
        for (index, lun) in self.luns.iter().enumerate() {
            let dir = attrs.child(&lun_dir_name(index))?;
            if !existing.contains(&index) {
                attrs.fs().make_directory(dir.dir())?;
                debug!("Created {}", dir.dir().display());
            }
            lun.write(&dir)?;
        }

        // lun.0 is a default group and cannot be removed
        for index in existing.into_iter().filter(|&i| i >= self.luns.len() && i > 0) {
            remove_lun(attrs, index)?;
        }
        Ok(())
    }
}

fn remove_lun<F: ConfigFs>(attrs: &AttrDir<'_, F>, index: usize) -> Result<()> {
    let dir = attrs.child(&lun_dir_name(index))?;
    attrs.fs().remove_directory(dir.dir())?;
    debug!("Removed {}", dir.dir().display());
    Ok(())
}

/// Remove every LUN but `lun.0`, so the function directory can be removed
pub(crate) fn remove_extra_luns<F: ConfigFs>(attrs: &AttrDir<'_, F>) -> Result<()> {
    for index in lun_indices(attrs)?.into_iter().filter(|&i| i > 0) {
        remove_lun(attrs, index)?;
    }
    Ok(())
}
