//! Declarative gadget description (TOML)
//!
//! ```toml
//! name = "g1"
//! udc = "dummy_udc.0"
//!
//! [attrs]
//! vendor_id = 0x1d6b
//! product_id = 0x0104
//!
//! [[strings]]
//! manufacturer = "Foundation"
//! product = "Keyboard"
//! serial = "0001"
//!
//! [[functions]]
//! type = "hid"
//! instance = "usb0"
//! preset = "keyboard"
//!
//! [[configs]]
//! id = 1
//! label = "config"
//! bindings = [{ function = "hid.usb0", name = "keyboard" }]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::gadget::path::{parse_config_name, parse_function_name};
use crate::gadget::{
    ConfigAttrs, ConfigFs, ConfigId, FunctionAttrs, FunctionId, FunctionType, GadgetAttrs,
    GadgetStrings, HidAttrs, HidPreset, MidiAttrs, MsdAttrs, NetAttrs, OsDescs, State,
    LANG_US_ENG,
};

fn default_lang() -> u16 {
    LANG_US_ENG
}

fn default_label() -> String {
    "c".to_string()
}

/// One gadget and everything it contains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GadgetScheme {
    pub name: String,
    /// Controller to enable the gadget on after it is built
    #[serde(default)]
    pub udc: Option<String>,
    /// Device descriptors; kernel defaults when absent
    #[serde(default)]
    pub attrs: Option<GadgetAttrs>,
    #[serde(default)]
    pub strings: Vec<GadgetStringsScheme>,
    #[serde(default)]
    pub functions: Vec<FunctionScheme>,
    #[serde(default)]
    pub configs: Vec<ConfigScheme>,
    #[serde(default)]
    pub os_descs: Option<OsDescs>,
    /// `label.id` of the config used for OS descriptors
    #[serde(default)]
    pub os_desc_config: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GadgetStringsScheme {
    #[serde(default = "default_lang")]
    pub lang: u16,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub serial: String,
}

impl GadgetStringsScheme {
    fn to_strings(&self) -> GadgetStrings {
        GadgetStrings {
            manufacturer: self.manufacturer.clone(),
            product: self.product.clone(),
            serial: self.serial.clone(),
        }
    }
}

/// A function; at most one attribute table may be given
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionScheme {
    #[serde(rename = "type")]
    pub function_type: FunctionType,
    pub instance: String,
    /// Built-in HID profile (`keyboard`, `mouse`, `mouse-absolute`)
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub hid: Option<HidAttrs>,
    #[serde(default)]
    pub net: Option<NetAttrs>,
    #[serde(default)]
    pub midi: Option<MidiAttrs>,
    #[serde(default)]
    pub mass_storage: Option<MsdAttrs>,
}

impl FunctionScheme {
    pub fn id(&self) -> FunctionId {
        FunctionId::new(self.function_type, self.instance.as_str())
    }

    /// The attribute bundle this entry describes, if any
    pub fn to_attrs(&self) -> Result<Option<FunctionAttrs>> {
        let mut bundles = Vec::new();
        if let Some(preset) = &self.preset {
            let preset: HidPreset = preset.parse()?;
            bundles.push(FunctionAttrs::Hid(HidAttrs::preset(preset)));
        }
        if let Some(hid) = &self.hid {
            bundles.push(FunctionAttrs::Hid(hid.clone()));
        }
        if let Some(net) = &self.net {
            bundles.push(FunctionAttrs::Net(net.clone()));
        }
        if let Some(midi) = &self.midi {
            bundles.push(FunctionAttrs::Midi(midi.clone()));
        }
        if let Some(msd) = &self.mass_storage {
            bundles.push(FunctionAttrs::MassStorage(msd.clone()));
        }

        if bundles.len() > 1 {
            return Err(Error::InvalidAttributeValue(format!(
                "function {}: more than one attribute table",
                self.id()
            )));
        }
        Ok(bundles.pop())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigScheme {
    pub id: u8,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default)]
    pub attrs: Option<ConfigAttrs>,
    #[serde(default)]
    pub strings: Vec<ConfigStringScheme>,
    #[serde(default)]
    pub bindings: Vec<BindingScheme>,
}

impl ConfigScheme {
    pub fn config_id(&self) -> ConfigId {
        ConfigId::new(self.id, self.label.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigStringScheme {
    #[serde(default = "default_lang")]
    pub lang: u16,
    pub configuration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingScheme {
    /// Function directory name (`hid.usb0`)
    pub function: String,
    /// Link name; the function name when absent
    #[serde(default)]
    pub name: Option<String>,
}

impl GadgetScheme {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| Error::InvalidAttributeValue(format!("gadget scheme: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Loaded gadget scheme from {}", path.display());
        Self::from_toml(&text)
    }

    /// Check cross references before anything touches the filesystem
    fn validate(&self) -> Result<Option<ConfigId>> {
        let functions: Vec<FunctionId> = self.functions.iter().map(FunctionScheme::id).collect();
        for function in &self.functions {
            if let Some(attrs) = function.to_attrs()? {
                attrs.check_matches(&function.id())?;
            }
        }
        for config in &self.configs {
            for binding in &config.bindings {
                let target = parse_function_name(&binding.function)?;
                if !functions.contains(&target) {
                    return Err(Error::NotFound(format!(
                        "config {} binds undeclared function {}",
                        config.config_id(),
                        target
                    )));
                }
            }
        }
        self.os_desc_config
            .as_deref()
            .map(|name| {
                let id = parse_config_name(name)?;
                if !self.configs.iter().any(|c| c.config_id() == id) {
                    return Err(Error::NotFound(format!("OS descriptor config {}", id)));
                }
                Ok(id)
            })
            .transpose()
    }

    /// Build the gadget: gadget, functions, configs, bindings, OS
    /// descriptors, then enable when a UDC is given (`udc` wins over the
    /// scheme's own). Returns the UDC the gadget was enabled on.
    pub fn apply<F: ConfigFs>(
        &self,
        state: &mut State<F>,
        udc: Option<&str>,
    ) -> Result<Option<String>> {
        let os_desc_config = self.validate()?;

        let strings: Vec<(u16, GadgetStrings)> = self
            .strings
            .iter()
            .map(|s| (s.lang, s.to_strings()))
            .collect();
        state.create_gadget(&self.name, self.attrs.as_ref(), &strings)?;

        for function in &self.functions {
            state.create_function(
                &self.name,
                function.function_type,
                &function.instance,
                function.to_attrs()?.as_ref(),
            )?;
        }

        for config in &self.configs {
            let strings: Vec<(u16, String)> = config
                .strings
                .iter()
                .map(|s| (s.lang, s.configuration.clone()))
                .collect();
            let id = state.create_config(
                &self.name,
                config.id,
                &config.label,
                config.attrs.as_ref(),
                &strings,
            )?;
            for binding in &config.bindings {
                let target = parse_function_name(&binding.function)?;
                state.add_binding(&self.name, &id, &target, binding.name.as_deref())?;
            }
        }

        if let Some(descs) = &self.os_descs {
            state.set_os_descs(&self.name, descs)?;
        }
        if let Some(config) = &os_desc_config {
            state.set_os_desc_config(&self.name, Some(config))?;
        }

        let udc = match udc.or(self.udc.as_deref()) {
            Some(udc) => Some(state.enable_gadget(&self.name, Some(udc))?),
            None => None,
        };
        info!(
            "Applied scheme for gadget {} ({} function(s), {} config(s))",
            self.name,
            self.functions.len(),
            self.configs.len()
        );
        Ok(udc)
    }
}
