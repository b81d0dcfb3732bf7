//! Canonical configfs paths for every entity kind
//!
//! Paths are never stored on entities; they are derived here from identity.

use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};

use super::function::FunctionType;
use super::model::{ConfigId, FunctionId};
use crate::error::{Error, Result};

/// Default configfs mount point
pub const DEFAULT_CONFIGFS_ROOT: &str = "/sys/kernel/config";

/// Directory listing the available USB Device Controllers
pub const DEFAULT_UDC_ROOT: &str = "/sys/class/udc";

/// Maximum length of any resolved path (PATH_MAX)
pub const MAX_PATH_LENGTH: usize = 4096;

pub const GADGET_SUBDIR: &str = "usb_gadget";
pub const FUNCTIONS_DIR: &str = "functions";
pub const CONFIGS_DIR: &str = "configs";
pub const STRINGS_DIR: &str = "strings";
pub const OS_DESC_DIR: &str = "os_desc";
pub const UDC_FILE: &str = "UDC";

/// Path builder rooted at one configfs mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    configfs_root: PathBuf,
    gadget_root: PathBuf,
}

impl Paths {
    pub fn new(configfs_root: impl Into<PathBuf>) -> Self {
        let configfs_root = configfs_root.into();
        let gadget_root = configfs_root.join(GADGET_SUBDIR);
        Self {
            configfs_root,
            gadget_root,
        }
    }

    pub fn configfs_root(&self) -> &Path {
        &self.configfs_root
    }

    /// `<configfs_root>/usb_gadget`
    pub fn gadget_root(&self) -> &Path {
        &self.gadget_root
    }

    pub fn gadget(&self, name: &str) -> Result<PathBuf> {
        checked(self.gadget_root.join(name))
    }

    /// A file directly inside the gadget directory (`UDC`, `idVendor`, ...)
    pub fn gadget_file(&self, name: &str, file: &str) -> Result<PathBuf> {
        checked(self.gadget_root.join(name).join(file))
    }

    pub fn gadget_strings(&self, name: &str) -> Result<PathBuf> {
        self.gadget_file(name, STRINGS_DIR)
    }

    pub fn gadget_lang(&self, name: &str, lang: u16) -> Result<PathBuf> {
        checked(self.gadget_strings(name)?.join(lang_dir_name(lang)))
    }

    pub fn functions_dir(&self, gadget: &str) -> Result<PathBuf> {
        self.gadget_file(gadget, FUNCTIONS_DIR)
    }

    pub fn function(&self, gadget: &str, id: &FunctionId) -> Result<PathBuf> {
        checked(self.functions_dir(gadget)?.join(id.name()))
    }

    pub fn configs_dir(&self, gadget: &str) -> Result<PathBuf> {
        self.gadget_file(gadget, CONFIGS_DIR)
    }

    pub fn config(&self, gadget: &str, id: &ConfigId) -> Result<PathBuf> {
        checked(self.configs_dir(gadget)?.join(id.name()))
    }

    pub fn config_strings(&self, gadget: &str, id: &ConfigId) -> Result<PathBuf> {
        checked(self.config(gadget, id)?.join(STRINGS_DIR))
    }

    pub fn config_lang(&self, gadget: &str, id: &ConfigId, lang: u16) -> Result<PathBuf> {
        checked(self.config_strings(gadget, id)?.join(lang_dir_name(lang)))
    }

    pub fn binding(&self, gadget: &str, config: &ConfigId, name: &str) -> Result<PathBuf> {
        checked(self.config(gadget, config)?.join(name))
    }

    pub fn os_desc_dir(&self, gadget: &str) -> Result<PathBuf> {
        self.gadget_file(gadget, OS_DESC_DIR)
    }

    pub fn os_desc_link(&self, gadget: &str, config: &ConfigId) -> Result<PathBuf> {
        checked(self.os_desc_dir(gadget)?.join(config.name()))
    }
}

pub(crate) fn checked(path: PathBuf) -> Result<PathBuf> {
    if path.as_os_str().len() >= MAX_PATH_LENGTH {
        return Err(Error::PathTooLong(format!(
            "{}... ({} bytes)",
            path.to_string_lossy().chars().take(64).collect::<String>(),
            path.as_os_str().len()
        )));
    }
    Ok(path)
}

/// Check that a caller-chosen name is usable as a single path component
pub fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(Error::MalformedName(format!("invalid {} name {:?}", what, name)));
    }
    Ok(())
}

/// Directory name for a USB LANGID (`0x409`)
pub fn lang_dir_name(lang: u16) -> String {
    format!("0x{:x}", lang)
}

/// Parse a string language directory name back into a LANGID
pub fn parse_lang(name: &str) -> Result<u16> {
    name.strip_prefix("0x")
        .or_else(|| name.strip_prefix("0X"))
        .and_then(|hex| u16::from_str_radix(hex, 16).ok())
        .ok_or_else(|| Error::MalformedName(format!("invalid language directory {:?}", name)))
}

/// Split `"<type>.<instance>"` into a function identity
pub fn parse_function_name(name: &str) -> Result<FunctionId> {
    let (prefix, instance) = name
        .split_once('.')
        .filter(|(prefix, instance)| !prefix.is_empty() && !instance.is_empty())
        .ok_or_else(|| Error::MalformedName(format!("invalid function name {:?}", name)))?;
    let function_type: FunctionType = prefix.parse()?;
    Ok(FunctionId::new(function_type, instance))
}

/// Split `"<label>.<id>"` into a config identity
pub fn parse_config_name(name: &str) -> Result<ConfigId> {
    let malformed = || Error::MalformedName(format!("invalid config name {:?}", name));
    let (label, id) = name.rsplit_once('.').ok_or_else(malformed)?;
    if label.is_empty() || id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let id: u8 = id.parse().map_err(|_| malformed())?;
    if id == 0 {
        return Err(malformed());
    }
    Ok(ConfigId::new(id, label))
}

/// Compare two paths treating any run of `/` as a single separator
pub fn path_cmp(a: &str, b: &str) -> Ordering {
    collapse_separators(a).cmp(collapse_separators(b))
}

pub fn path_eq(a: &str, b: &str) -> bool {
    path_cmp(a, b) == Ordering::Equal
}

fn collapse_separators(path: &str) -> impl Iterator<Item = u8> + '_ {
    let bytes = path.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(move |&(i, &b)| !(b == b'/' && i > 0 && bytes[i - 1] == b'/'))
        .map(|(_, &b)| b)
}

/// Lexically resolve a symlink target against the directory holding the link
pub fn resolve_link_target(link: &Path, target: &Path) -> PathBuf {
    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        link.parent().unwrap_or(Path::new("/")).join(target)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
