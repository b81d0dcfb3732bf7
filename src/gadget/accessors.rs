//! Typed attribute and string accessors
//!
//! Descriptor values and function attributes are read from configfs on
//! every call; the kernel may rewrite them at any time. Strings and config
//! attributes are also cached on the entity tree, and setters keep that
//! cache current.

use std::path::Path;

use tracing::debug;

use super::attrs::AttrDir;
use super::codec;
use super::configfs::ConfigFs;
use super::function::FunctionAttrs;
use super::model::{ConfigId, FunctionId};
use super::path::Paths;
use super::types::{
    ConfigAttrs, GadgetAttr, GadgetAttrs, GadgetStr, GadgetStrings, OsDescs,
    CONFIG_ATTRIBUTES_FILE, CONFIG_MAX_POWER_FILE, CONFIG_STRING_FILE, OS_DESC_SIGN_FILE,
    OS_DESC_USE_FILE, OS_DESC_VENDOR_CODE_FILE,
};
use super::State;
use crate::error::{Error, Result};

/// Create a directory unless the kernel (or an earlier call) already did
fn ensure_dir<F: ConfigFs>(fs: &F, path: &Path) -> Result<()> {
    match fs.make_directory(path) {
        Ok(()) => {
            debug!("Created {}", path.display());
            Ok(())
        }
        Err(Error::AlreadyExists(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

pub(crate) fn write_gadget_attrs<F: ConfigFs>(
    fs: &F,
    dir: &Path,
    attrs: &GadgetAttrs,
) -> Result<()> {
    let files = AttrDir::new(fs, dir);
    for attr in GadgetAttr::ALL {
        files.write_int(attr.file_name(), attrs.get(attr), attr.format())?;
    }
    debug!("Set device descriptors of {}", dir.display());
    Ok(())
}

fn read_gadget_attrs<F: ConfigFs>(fs: &F, dir: &Path) -> Result<GadgetAttrs> {
    let files = AttrDir::new(fs, dir);
    let mut attrs = GadgetAttrs::default();
    for attr in GadgetAttr::ALL {
        let value: u16 = files.read_int(attr.file_name(), attr.format())?;
        if value > attr.max() {
            return Err(Error::InvalidAttributeValue(format!(
                "{}/{}: {:#x} is out of range",
                dir.display(),
                attr.file_name(),
                value
            )));
        }
        attrs.set(attr, value);
    }
    Ok(attrs)
}

pub(crate) fn write_gadget_strings<F: ConfigFs>(
    fs: &F,
    paths: &Paths,
    gadget: &str,
    lang: u16,
    strings: &GadgetStrings,
) -> Result<()> {
    // Reject over-long values before the language directory appears
    for which in GadgetStr::ALL {
        codec::encode_string(strings.get(which))?;
    }
    let dir = paths.gadget_lang(gadget, lang)?;
    ensure_dir(fs, &dir)?;
    let files = AttrDir::new(fs, &dir);
    for which in GadgetStr::ALL {
        files.write_string(which.file_name(), strings.get(which))?;
    }
    Ok(())
}

pub(crate) fn write_config_attrs<F: ConfigFs>(
    fs: &F,
    dir: &Path,
    attrs: &ConfigAttrs,
) -> Result<()> {
    let files = AttrDir::new(fs, dir);
    files.write_dec(CONFIG_MAX_POWER_FILE, attrs.max_power)?;
    files.write_hex(CONFIG_ATTRIBUTES_FILE, attrs.bm_attributes)?;
    Ok(())
}

pub(crate) fn read_config_attrs<F: ConfigFs>(fs: &F, dir: &Path) -> Result<ConfigAttrs> {
    let files = AttrDir::new(fs, dir);
    Ok(ConfigAttrs {
        max_power: files.read_dec(CONFIG_MAX_POWER_FILE)?,
        bm_attributes: files.read_hex(CONFIG_ATTRIBUTES_FILE)?,
    })
}

pub(crate) fn write_config_string<F: ConfigFs>(
    fs: &F,
    paths: &Paths,
    gadget: &str,
    config: &ConfigId,
    lang: u16,
    value: &str,
) -> Result<()> {
    codec::encode_string(value)?;
    let dir = paths.config_lang(gadget, config, lang)?;
    ensure_dir(fs, &dir)?;
    AttrDir::new(fs, &dir).write_string(CONFIG_STRING_FILE, value)
}

impl<F: ConfigFs> State<F> {
    /// All eight device descriptor values, read from the gadget directory
    pub fn get_gadget_attrs(&self, gadget: &str) -> Result<GadgetAttrs> {
        self.gadget_ref(gadget)?;
        read_gadget_attrs(&self.fs, &self.paths.gadget(gadget)?)
    }

    pub fn set_gadget_attrs(&mut self, gadget: &str, attrs: &GadgetAttrs) -> Result<()> {
        self.gadget_ref(gadget)?;
        write_gadget_attrs(&self.fs, &self.paths.gadget(gadget)?, attrs)
    }

    pub fn get_gadget_attr(&self, gadget: &str, attr: GadgetAttr) -> Result<u16> {
        self.gadget_ref(gadget)?;
        let value: u16 = AttrDir::new(&self.fs, &self.paths.gadget(gadget)?)
            .read_int(attr.file_name(), attr.format())?;
        if value > attr.max() {
            return Err(Error::InvalidAttributeValue(format!(
                "{}: {:#x} is out of range",
                attr.file_name(),
                value
            )));
        }
        Ok(value)
    }

    pub fn set_gadget_attr(&mut self, gadget: &str, attr: GadgetAttr, value: u16) -> Result<()> {
        self.gadget_ref(gadget)?;
        if value > attr.max() {
            return Err(Error::InvalidAttributeValue(format!(
                "{}: {:#x} exceeds {:#x}",
                attr.file_name(),
                value,
                attr.max()
            )));
        }
        AttrDir::new(&self.fs, &self.paths.gadget(gadget)?).write_int(
            attr.file_name(),
            value,
            attr.format(),
        )
    }

    /// Strings for `lang`; `None` when that language is not materialised
    pub fn get_gadget_strings(&self, gadget: &str, lang: u16) -> Result<Option<GadgetStrings>> {
        self.gadget_ref(gadget)?;
        let files = AttrDir::new(&self.fs, &self.paths.gadget_lang(gadget, lang)?);
        let mut strings = GadgetStrings::default();
        for which in GadgetStr::ALL {
            match files.read_optional_string(which.file_name())? {
                Some(value) => strings.set(which, value),
                None => return Ok(None),
            }
        }
        Ok(Some(strings))
    }

    pub fn get_gadget_str(
        &self,
        gadget: &str,
        lang: u16,
        which: GadgetStr,
    ) -> Result<Option<String>> {
        self.gadget_ref(gadget)?;
        AttrDir::new(&self.fs, &self.paths.gadget_lang(gadget, lang)?)
            .read_optional_string(which.file_name())
    }

    /// Write all three strings, creating `strings/<lang>` on first use
    pub fn set_gadget_strings(
        &mut self,
        gadget: &str,
        lang: u16,
        strings: &GadgetStrings,
    ) -> Result<()> {
        self.gadget_ref(gadget)?;
        write_gadget_strings(&self.fs, &self.paths, gadget, lang, strings)?;
        self.gadget_mut(gadget)?
            .strings
            .insert(lang, strings.clone());
        Ok(())
    }

    pub fn set_gadget_str(
        &mut self,
        gadget: &str,
        lang: u16,
        which: GadgetStr,
        value: &str,
    ) -> Result<()> {
        self.gadget_ref(gadget)?;
        codec::encode_string(value)?;
        let dir = self.paths.gadget_lang(gadget, lang)?;
        ensure_dir(&self.fs, &dir)?;
        AttrDir::new(&self.fs, &dir).write_string(which.file_name(), value)?;

        self.gadget_mut(gadget)?
            .strings
            .entry(lang)
            .or_default()
            .set(which, value.to_string());
        Ok(())
    }

    pub fn get_config_attrs(&self, gadget: &str, config: &ConfigId) -> Result<ConfigAttrs> {
        self.config_ref(gadget, config)?;
        read_config_attrs(&self.fs, &self.paths.config(gadget, config)?)
    }

    pub fn set_config_attrs(
        &mut self,
        gadget: &str,
        config: &ConfigId,
        attrs: &ConfigAttrs,
    ) -> Result<()> {
        self.config_ref(gadget, config)?;
        write_config_attrs(&self.fs, &self.paths.config(gadget, config)?, attrs)?;
        if let Some(c) = self.gadget_mut(gadget)?.configs.get_mut(config) {
            c.attrs = *attrs;
        }
        Ok(())
    }

    /// Configuration string for `lang`; `None` when not materialised
    pub fn get_config_string(
        &self,
        gadget: &str,
        config: &ConfigId,
        lang: u16,
    ) -> Result<Option<String>> {
        self.config_ref(gadget, config)?;
        AttrDir::new(&self.fs, &self.paths.config_lang(gadget, config, lang)?)
            .read_optional_string(CONFIG_STRING_FILE)
    }

    pub fn set_config_string(
        &mut self,
        gadget: &str,
        config: &ConfigId,
        lang: u16,
        value: &str,
    ) -> Result<()> {
        self.config_ref(gadget, config)?;
        write_config_string(&self.fs, &self.paths, gadget, config, lang, value)?;
        if let Some(c) = self.gadget_mut(gadget)?.configs.get_mut(config) {
            c.strings.insert(lang, value.to_string());
        }
        Ok(())
    }

    /// Attribute bundle of a function; `None` for types without managed attributes
    pub fn get_function_attrs(
        &self,
        gadget: &str,
        function: &FunctionId,
    ) -> Result<Option<FunctionAttrs>> {
        self.function_ref(gadget, function)?;
        FunctionAttrs::read(&self.fs, &self.paths.function(gadget, function)?, function)
    }

    pub fn set_function_attrs(
        &mut self,
        gadget: &str,
        function: &FunctionId,
        attrs: &FunctionAttrs,
    ) -> Result<()> {
        self.function_ref(gadget, function)?;
        attrs.check_matches(function)?;
        attrs.write(&self.fs, &self.paths.function(gadget, function)?)
    }

    pub fn get_os_descs(&self, gadget: &str) -> Result<OsDescs> {
        self.gadget_ref(gadget)?;
        let files = AttrDir::new(&self.fs, &self.paths.os_desc_dir(gadget)?);
        Ok(OsDescs {
            use_os_desc: files.read_bool(OS_DESC_USE_FILE)?,
            b_vendor_code: files.read_hex(OS_DESC_VENDOR_CODE_FILE)?,
            qw_sign: files.read_string(OS_DESC_SIGN_FILE)?,
        })
    }

    pub fn set_os_descs(&mut self, gadget: &str, descs: &OsDescs) -> Result<()> {
        self.gadget_ref(gadget)?;
        let files = AttrDir::new(&self.fs, &self.paths.os_desc_dir(gadget)?);
        files.write_bool(OS_DESC_USE_FILE, descs.use_os_desc)?;
        files.write_hex(OS_DESC_VENDOR_CODE_FILE, descs.b_vendor_code)?;
        files.write_string(OS_DESC_SIGN_FILE, &descs.qw_sign)?;
        Ok(())
    }

    /// Designate the config used for OS descriptors, or clear it with `None`
    pub fn set_os_desc_config(&mut self, gadget: &str, config: Option<&ConfigId>) -> Result<()> {
        let current = self.gadget_ref(gadget)?.os_desc_config.clone();
        if let Some(config) = config {
            self.config_ref(gadget, config)?;
        }
        if current.as_ref() == config {
            return Ok(());
        }

        if let Some(old) = &current {
            self.fs
                .remove_file_or_link(&self.paths.os_desc_link(gadget, old)?)?;
            self.gadget_mut(gadget)?.os_desc_config = None;
            debug!("Cleared OS descriptor config {} of gadget {}", old, gadget);
        }
        if let Some(config) = config {
            let link = self.paths.os_desc_link(gadget, config)?;
            self.fs
                .make_symlink(&self.paths.config(gadget, config)?, &link)?;
            self.gadget_mut(gadget)?.os_desc_config = Some(config.clone());
            debug!("Set OS descriptor config of gadget {} to {}", gadget, config);
        }
        Ok(())
    }
}
