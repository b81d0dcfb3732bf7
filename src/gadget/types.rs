//! Value types for gadget, config and OS descriptor attributes

use serde::{Deserialize, Serialize};

use super::codec::Format;

/// US English LANGID
pub const LANG_US_ENG: u16 = 0x409;

/// USB device descriptor fields exposed as gadget attribute files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GadgetAttrs {
    pub bcd_usb: u16,
    pub device_class: u8,
    pub device_sub_class: u8,
    pub device_protocol: u8,
    pub max_packet_size0: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bcd_device: u16,
}

impl Default for GadgetAttrs {
    fn default() -> Self {
        Self {
            bcd_usb: 0x0200,
            device_class: 0,
            device_sub_class: 0,
            device_protocol: 0,
            max_packet_size0: 64,
            vendor_id: 0x1d6b,
            product_id: 0x0104,
            bcd_device: 0x0100,
        }
    }
}

impl GadgetAttrs {
    pub fn get(&self, attr: GadgetAttr) -> u16 {
        match attr {
            GadgetAttr::BcdUsb => self.bcd_usb,
            GadgetAttr::DeviceClass => self.device_class.into(),
            GadgetAttr::DeviceSubClass => self.device_sub_class.into(),
            GadgetAttr::DeviceProtocol => self.device_protocol.into(),
            GadgetAttr::MaxPacketSize0 => self.max_packet_size0.into(),
            GadgetAttr::VendorId => self.vendor_id,
            GadgetAttr::ProductId => self.product_id,
            GadgetAttr::BcdDevice => self.bcd_device,
        }
    }

    /// Values wider than the field are truncated to its width.
    /// [`GadgetAttr::max`] tells the caller the bound beforehand.
    pub(crate) fn set(&mut self, attr: GadgetAttr, value: u16) {
        let byte = value as u8;
        match attr {
            GadgetAttr::BcdUsb => self.bcd_usb = value,
            GadgetAttr::DeviceClass => self.device_class = byte,
            GadgetAttr::DeviceSubClass => self.device_sub_class = byte,
            GadgetAttr::DeviceProtocol => self.device_protocol = byte,
            GadgetAttr::MaxPacketSize0 => self.max_packet_size0 = byte,
            GadgetAttr::VendorId => self.vendor_id = value,
            GadgetAttr::ProductId => self.product_id = value,
            GadgetAttr::BcdDevice => self.bcd_device = value,
        }
    }
}

/// One gadget descriptor attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GadgetAttr {
    BcdUsb,
    DeviceClass,
    DeviceSubClass,
    DeviceProtocol,
    MaxPacketSize0,
    VendorId,
    ProductId,
    BcdDevice,
}

impl GadgetAttr {
    pub const ALL: [GadgetAttr; 8] = [
        GadgetAttr::BcdUsb,
        GadgetAttr::DeviceClass,
        GadgetAttr::DeviceSubClass,
        GadgetAttr::DeviceProtocol,
        GadgetAttr::MaxPacketSize0,
        GadgetAttr::VendorId,
        GadgetAttr::ProductId,
        GadgetAttr::BcdDevice,
    ];

    /// Attribute file name
    pub fn file_name(self) -> &'static str {
        match self {
            GadgetAttr::BcdUsb => "bcdUSB",
            GadgetAttr::DeviceClass => "bDeviceClass",
            GadgetAttr::DeviceSubClass => "bDeviceSubClass",
            GadgetAttr::DeviceProtocol => "bDeviceProtocol",
            GadgetAttr::MaxPacketSize0 => "bMaxPacketSize0",
            GadgetAttr::VendorId => "idVendor",
            GadgetAttr::ProductId => "idProduct",
            GadgetAttr::BcdDevice => "bcdDevice",
        }
    }

    /// Largest value the descriptor field holds
    pub fn max(self) -> u16 {
        match self {
            GadgetAttr::BcdUsb
            | GadgetAttr::VendorId
            | GadgetAttr::ProductId
            | GadgetAttr::BcdDevice => u16::MAX,
            _ => u8::MAX.into(),
        }
    }

    pub fn format(self) -> Format {
        Format::Hex
    }
}

/// Localized gadget strings for one language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GadgetStrings {
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
}

impl GadgetStrings {
    pub fn get(&self, which: GadgetStr) -> &str {
        match which {
            GadgetStr::Manufacturer => &self.manufacturer,
            GadgetStr::Product => &self.product,
            GadgetStr::Serial => &self.serial,
        }
    }

    pub(crate) fn set(&mut self, which: GadgetStr, value: String) {
        match which {
            GadgetStr::Manufacturer => self.manufacturer = value,
            GadgetStr::Product => self.product = value,
            GadgetStr::Serial => self.serial = value,
        }
    }
}

/// One gadget string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GadgetStr {
    Manufacturer,
    Product,
    Serial,
}

impl GadgetStr {
    pub const ALL: [GadgetStr; 3] = [
        GadgetStr::Manufacturer,
        GadgetStr::Product,
        GadgetStr::Serial,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            GadgetStr::Manufacturer => "manufacturer",
            GadgetStr::Product => "product",
            GadgetStr::Serial => "serialnumber",
        }
    }
}

/// Configuration descriptor attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigAttrs {
    /// MaxPower in mA, decimal on disk
    pub max_power: u16,
    /// bmAttributes, hex on disk
    pub bm_attributes: u8,
}

impl Default for ConfigAttrs {
    fn default() -> Self {
        Self {
            max_power: 2,
            bm_attributes: 0x80,
        }
    }
}

pub const CONFIG_MAX_POWER_FILE: &str = "MaxPower";
pub const CONFIG_ATTRIBUTES_FILE: &str = "bmAttributes";
pub const CONFIG_STRING_FILE: &str = "configuration";

/// Microsoft OS descriptor settings (`os_desc/`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OsDescs {
    #[serde(rename = "use")]
    pub use_os_desc: bool,
    pub b_vendor_code: u8,
    pub qw_sign: String,
}

pub const OS_DESC_USE_FILE: &str = "use";
pub const OS_DESC_VENDOR_CODE_FILE: &str = "b_vendor_code";
pub const OS_DESC_SIGN_FILE: &str = "qw_sign";
