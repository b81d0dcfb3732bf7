//! HID function attributes

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::attrs::AttrDir;
use super::configfs::ConfigFs;
use super::report_desc::{KEYBOARD, MOUSE, MOUSE_ABSOLUTE};
use crate::error::{Error, Result};

/// Attribute bundle of a `hid` function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HidAttrs {
    /// Boot protocol (1 = keyboard, 2 = mouse)
    pub protocol: u8,
    /// 1 = boot interface subclass
    pub subclass: u8,
    /// Report length in bytes
    pub report_length: u16,
    /// Raw report descriptor
    pub report_desc: Vec<u8>,
}

impl HidAttrs {
    pub fn preset(preset: HidPreset) -> Self {
        Self {
            protocol: preset.protocol(),
            subclass: preset.subclass(),
            report_length: preset.report_length(),
            report_desc: preset.report_desc().to_vec(),
        }
    }

    pub(crate) fn read<F: ConfigFs>(attrs: &AttrDir<'_, F>) -> Result<Self> {
        Ok(Self {
            protocol: attrs.read_dec("protocol")?,
            subclass: attrs.read_dec("subclass")?,
            report_length: attrs.read_dec("report_length")?,
            report_desc: attrs.read_bytes("report_desc")?,
        })
    }

    pub(crate) fn write<F: ConfigFs>(&self, attrs: &AttrDir<'_, F>) -> Result<()> {
        attrs.write_dec("protocol", self.protocol)?;
        attrs.write_dec("subclass", self.subclass)?;
        attrs.write_dec("report_length", self.report_length)?;

        // Descriptor is binary and goes out in one write
        attrs.write_bytes("report_desc", &self.report_desc)?;

        debug!(
            "Wrote HID attributes to {} ({} byte report descriptor)",
            attrs.dir().display(),
            self.report_desc.len()
        );
        Ok(())
    }
}

/// Built-in HID device profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidPreset {
    /// Boot keyboard
    Keyboard,
    /// Relative boot mouse
    Mouse,
    /// Absolute pointer (touchscreen-like positioning)
    MouseAbsolute,
}

impl HidPreset {
    /// Get HID protocol
    pub fn protocol(self) -> u8 {
        match self {
            HidPreset::Keyboard => 1,
            HidPreset::Mouse => 2,
            HidPreset::MouseAbsolute => 2,
        }
    }

    /// Get HID subclass
    pub fn subclass(self) -> u8 {
        match self {
            HidPreset::Keyboard => 1,
            HidPreset::Mouse => 1,
            HidPreset::MouseAbsolute => 0,
        }
    }

    pub fn report_length(self) -> u16 {
        match self {
            HidPreset::Keyboard => 8,
            HidPreset::Mouse => 4,
            HidPreset::MouseAbsolute => 6,
        }
    }

    pub fn report_desc(self) -> &'static [u8] {
        match self {
            HidPreset::Keyboard => KEYBOARD,
            HidPreset::Mouse => MOUSE,
            HidPreset::MouseAbsolute => MOUSE_ABSOLUTE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HidPreset::Keyboard => "keyboard",
            HidPreset::Mouse => "mouse",
            HidPreset::MouseAbsolute => "mouse-absolute",
        }
    }
}

impl FromStr for HidPreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keyboard" => Ok(HidPreset::Keyboard),
            "mouse" => Ok(HidPreset::Mouse),
            "mouse-absolute" => Ok(HidPreset::MouseAbsolute),
            other => Err(Error::InvalidAttributeValue(format!(
                "unknown HID preset {:?}",
                other
            ))),
        }
    }
}
