//! USB Gadget function types and their attribute bundles

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use super::attrs::AttrDir;
use super::codec::MacAddr;
use super::configfs::ConfigFs;
use super::hid::HidAttrs;
use super::model::FunctionId;
use super::msd::MsdAttrs;
use crate::error::{Error, Result};

/// Closed set of function drivers the kernel exposes through configfs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FunctionType {
    Serial,
    Acm,
    Obex,
    Ecm,
    /// CDC subset ("geth")
    Subset,
    Ncm,
    Eem,
    Rndis,
    Phonet,
    Ffs,
    MassStorage,
    Midi,
    Loopback,
    Hid,
    Uac2,
    Uvc,
    Printer,
}

impl FunctionType {
    pub const ALL: [FunctionType; 17] = [
        FunctionType::Serial,
        FunctionType::Acm,
        FunctionType::Obex,
        FunctionType::Ecm,
        FunctionType::Subset,
        FunctionType::Ncm,
        FunctionType::Eem,
        FunctionType::Rndis,
        FunctionType::Phonet,
        FunctionType::Ffs,
        FunctionType::MassStorage,
        FunctionType::Midi,
        FunctionType::Loopback,
        FunctionType::Hid,
        FunctionType::Uac2,
        FunctionType::Uvc,
        FunctionType::Printer,
    ];

    /// Directory prefix used by the kernel (`hid` in `hid.usb0`)
    pub fn as_str(self) -> &'static str {
        match self {
            FunctionType::Serial => "gser",
            FunctionType::Acm => "acm",
            FunctionType::Obex => "obex",
            FunctionType::Ecm => "ecm",
            FunctionType::Subset => "geth",
            FunctionType::Ncm => "ncm",
            FunctionType::Eem => "eem",
            FunctionType::Rndis => "rndis",
            FunctionType::Phonet => "phonet",
            FunctionType::Ffs => "ffs",
            FunctionType::MassStorage => "mass_storage",
            FunctionType::Midi => "midi",
            FunctionType::Loopback => "Loopback",
            FunctionType::Hid => "hid",
            FunctionType::Uac2 => "uac2",
            FunctionType::Uvc => "uvc",
            FunctionType::Printer => "printer",
        }
    }

    /// Get description
    pub fn description(self) -> &'static str {
        match self {
            FunctionType::Serial => "Generic Serial",
            FunctionType::Acm => "CDC ACM Serial",
            FunctionType::Obex => "OBEX",
            FunctionType::Ecm => "CDC ECM Ethernet",
            FunctionType::Subset => "CDC Subset Ethernet",
            FunctionType::Ncm => "CDC NCM Ethernet",
            FunctionType::Eem => "CDC EEM Ethernet",
            FunctionType::Rndis => "RNDIS Ethernet",
            FunctionType::Phonet => "Phonet",
            FunctionType::Ffs => "FunctionFS",
            FunctionType::MassStorage => "Mass Storage",
            FunctionType::Midi => "MIDI",
            FunctionType::Loopback => "Loopback",
            FunctionType::Hid => "HID",
            FunctionType::Uac2 => "USB Audio Class 2",
            FunctionType::Uvc => "USB Video Class",
            FunctionType::Printer => "Printer",
        }
    }

    pub fn is_serial(self) -> bool {
        matches!(
            self,
            FunctionType::Serial | FunctionType::Acm | FunctionType::Obex
        )
    }

    pub fn is_net(self) -> bool {
        matches!(
            self,
            FunctionType::Ecm
                | FunctionType::Subset
                | FunctionType::Ncm
                | FunctionType::Eem
                | FunctionType::Rndis
        )
    }

    /// Whether the function has attributes managed by this crate
    pub fn has_attrs(self) -> bool {
        !matches!(
            self,
            FunctionType::Loopback | FunctionType::Uac2 | FunctionType::Uvc | FunctionType::Printer
        )
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FunctionType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::MalformedName(format!("unknown function type {:?}", s)))
    }
}

impl Serialize for FunctionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FunctionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Serial, ACM and OBEX functions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerialAttrs {
    /// TTY port number assigned by the kernel (read-only)
    pub port_num: u32,
}

/// ECM, subset, NCM, EEM and RNDIS functions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetAttrs {
    pub dev_addr: MacAddr,
    pub host_addr: MacAddr,
    /// Network interface name assigned by the kernel (read-only)
    #[serde(default)]
    pub ifname: Option<String>,
    /// Queue length multiplier for high speed
    #[serde(default = "default_qmult")]
    pub qmult: u32,
}

fn default_qmult() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhonetAttrs {
    /// Read-only
    pub ifname: Option<String>,
}

/// FunctionFS has nothing on disk; the device name is the instance name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FfsAttrs {
    pub dev_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MidiAttrs {
    pub index: i32,
    pub id: String,
    pub in_ports: u8,
    pub out_ports: u8,
    pub buflen: u32,
    pub qlen: u32,
}

impl Default for MidiAttrs {
    fn default() -> Self {
        Self {
            index: -1,
            id: String::new(),
            in_ports: 1,
            out_ports: 1,
            buflen: 512,
            qlen: 32,
        }
    }
}

/// Type-specific attribute bundle of a function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FunctionAttrs {
    Serial(SerialAttrs),
    Net(NetAttrs),
    Phonet(PhonetAttrs),
    Ffs(FfsAttrs),
    Midi(MidiAttrs),
    Hid(HidAttrs),
    MassStorage(MsdAttrs),
}

impl FunctionAttrs {
    /// Whether this bundle belongs to functions of the given type
    pub fn matches(&self, function_type: FunctionType) -> bool {
        match self {
            FunctionAttrs::Serial(_) => function_type.is_serial(),
            FunctionAttrs::Net(_) => function_type.is_net(),
            FunctionAttrs::Phonet(_) => function_type == FunctionType::Phonet,
            FunctionAttrs::Ffs(_) => function_type == FunctionType::Ffs,
            FunctionAttrs::Midi(_) => function_type == FunctionType::Midi,
            FunctionAttrs::Hid(_) => function_type == FunctionType::Hid,
            FunctionAttrs::MassStorage(_) => function_type == FunctionType::MassStorage,
        }
    }

    pub(crate) fn check_matches(&self, id: &FunctionId) -> Result<()> {
        if self.matches(id.function_type()) {
            Ok(())
        } else {
            Err(Error::IncompatibleType(format!(
                "attribute bundle does not apply to {} function {}",
                id.function_type().description(),
                id
            )))
        }
    }

    /// Read the bundle of a function from its directory.
    ///
    /// Returns `None` for function types without managed attributes.
    pub(crate) fn read<F: ConfigFs>(fs: &F, dir: &Path, id: &FunctionId) -> Result<Option<Self>> {
        let attrs = AttrDir::new(fs, dir);
        let function_type = id.function_type();

        let bundle = if function_type.is_serial() {
            FunctionAttrs::Serial(SerialAttrs {
                port_num: attrs.read_dec("port_num")?,
            })
        } else if function_type.is_net() {
            FunctionAttrs::Net(NetAttrs {
                dev_addr: attrs.read_mac("dev_addr")?,
                host_addr: attrs.read_mac("host_addr")?,
                ifname: attrs.read_optional_string("ifname")?,
                qmult: attrs.read_dec("qmult")?,
            })
        } else {
            match function_type {
                FunctionType::Phonet => FunctionAttrs::Phonet(PhonetAttrs {
                    ifname: attrs.read_optional_string("ifname")?,
                }),
                FunctionType::Ffs => FunctionAttrs::Ffs(FfsAttrs {
                    dev_name: id.instance().to_string(),
                }),
                FunctionType::Midi => FunctionAttrs::Midi(MidiAttrs {
                    index: attrs.read_dec("index")?,
                    id: attrs.read_string("id")?,
                    in_ports: attrs.read_dec("in_ports")?,
                    out_ports: attrs.read_dec("out_ports")?,
                    buflen: attrs.read_dec("buflen")?,
                    qlen: attrs.read_dec("qlen")?,
                }),
                FunctionType::Hid => FunctionAttrs::Hid(HidAttrs::read(&attrs)?),
                FunctionType::MassStorage => FunctionAttrs::MassStorage(MsdAttrs::read(&attrs)?),
                _ => return Ok(None),
            }
        };
        Ok(Some(bundle))
    }

    /// Write the writable attributes of the bundle.
    ///
    /// Read-only attributes (serial port number, interface names) and
    /// FunctionFS, which has nothing on disk, are skipped.
    pub(crate) fn write<F: ConfigFs>(&self, fs: &F, dir: &Path) -> Result<()> {
        let attrs = AttrDir::new(fs, dir);
        match self {
            FunctionAttrs::Serial(_) | FunctionAttrs::Phonet(_) | FunctionAttrs::Ffs(_) => {
                debug!("No writable attributes for {}", dir.display());
            }
            FunctionAttrs::Net(net) => {
                attrs.write_mac("dev_addr", &net.dev_addr)?;
                attrs.write_mac("host_addr", &net.host_addr)?;
                attrs.write_dec("qmult", net.qmult)?;
            }
            FunctionAttrs::Midi(midi) => {
                attrs.write_dec("index", midi.index)?;
                attrs.write_text("id", &midi.id)?;
                attrs.write_dec("in_ports", midi.in_ports)?;
                attrs.write_dec("out_ports", midi.out_ports)?;
                attrs.write_dec("buflen", midi.buflen)?;
                attrs.write_dec("qlen", midi.qlen)?;
            }
            FunctionAttrs::Hid(hid) => hid.write(&attrs)?,
            FunctionAttrs::MassStorage(msd) => msd.write(&attrs)?,
        }
        Ok(())
    }
}
