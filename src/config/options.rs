use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::gadget::path::{DEFAULT_CONFIGFS_ROOT, DEFAULT_UDC_ROOT};

/// Environment variable overriding the configfs mount point
pub const CONFIGFS_ENV: &str = "USBGX_CONFIGFS";

/// Environment variable overriding the UDC class directory
pub const UDC_DIR_ENV: &str = "USBGX_UDC_DIR";

/// Where the gadget state lives on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateOptions {
    /// configfs mount point (`/sys/kernel/config`)
    pub configfs_root: PathBuf,
    /// Directory listing USB Device Controllers (`/sys/class/udc`)
    pub udc_root: PathBuf,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            configfs_root: PathBuf::from(DEFAULT_CONFIGFS_ROOT),
            udc_root: PathBuf::from(DEFAULT_UDC_ROOT),
        }
    }
}

impl StateOptions {
    pub fn new(configfs_root: impl Into<PathBuf>) -> Self {
        Self {
            configfs_root: configfs_root.into(),
            ..Default::default()
        }
    }

    pub fn with_udc_root(mut self, udc_root: impl Into<PathBuf>) -> Self {
        self.udc_root = udc_root.into();
        self
    }

    /// Defaults overridden by `USBGX_CONFIGFS` / `USBGX_UDC_DIR`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(root) = lookup(CONFIGFS_ENV).filter(|v| !v.is_empty()) {
            options.configfs_root = PathBuf::from(root);
        }
        if let Some(dir) = lookup(UDC_DIR_ENV).filter(|v| !v.is_empty()) {
            options.udc_root = PathBuf::from(dir);
        }
        options
    }
}
