//! Gadget state and the mutation engine
//!
//! Every mutation checks its preconditions against the in-memory tree,
//! performs the filesystem steps in the order the kernel requires, and only
//! then updates the tree. A failed step leaves the tree as it was; partially
//! created directories are left on disk for the caller to clean up.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::accessors::{
    read_config_attrs, write_config_attrs, write_config_string, write_gadget_attrs,
    write_gadget_strings,
};
use super::attrs::AttrDir;
use super::codec;
use super::configfs::{ConfigFs, EntryKind, HostFs};
use super::function::{FunctionAttrs, FunctionType};
use super::loader;
use super::model::{Binding, Config, ConfigId, Function, FunctionId, Gadget};
use super::msd;
use super::path::{validate_name, Paths, UDC_FILE};
use super::types::{ConfigAttrs, GadgetAttrs, GadgetStrings};
use crate::config::StateOptions;
use crate::error::{Error, Result};

/// Root of the object model: every gadget under one configfs mount
#[derive(Debug)]
pub struct State<F: ConfigFs = HostFs> {
    pub(crate) fs: F,
    pub(crate) paths: Paths,
    udc_root: PathBuf,
    pub(crate) gadgets: BTreeMap<String, Gadget>,
    udcs: BTreeSet<String>,
}

impl State<HostFs> {
    /// Load the gadget tree under `configfs_root` from the host filesystem
    pub fn init(configfs_root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(StateOptions::new(configfs_root), HostFs::new())
    }
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })
}

impl<F: ConfigFs> State<F> {
    pub fn with_options(options: StateOptions, fs: F) -> Result<Self> {
        let paths = Paths::new(absolute(options.configfs_root)?);
        let udc_root = absolute(options.udc_root)?;
        let tree = loader::load(&fs, &paths, &udc_root)?;
        info!(
            "Loaded {} gadget(s) from {}",
            tree.gadgets.len(),
            paths.gadget_root().display()
        );
        Ok(Self {
            fs,
            paths,
            udc_root,
            gadgets: tree.gadgets,
            udcs: tree.udcs,
        })
    }

    /// Re-read the whole tree; on failure the current tree is kept
    pub fn reload(&mut self) -> Result<()> {
        let tree = loader::load(&self.fs, &self.paths, &self.udc_root)?;
        self.gadgets = tree.gadgets;
        self.udcs = tree.udcs;
        debug!("Reloaded gadget tree");
        Ok(())
    }

    /// Drop the in-memory tree. Nothing on disk changes.
    pub fn release(self) {
        debug!("Released state for {}", self.paths.configfs_root().display());
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn configfs_root(&self) -> &Path {
        self.paths.configfs_root()
    }

    pub fn gadget_root(&self) -> &Path {
        self.paths.gadget_root()
    }

    pub fn udc_root(&self) -> &Path {
        &self.udc_root
    }

    pub fn gadgets(&self) -> impl Iterator<Item = &Gadget> {
        self.gadgets.values()
    }

    pub fn gadget(&self, name: &str) -> Option<&Gadget> {
        self.gadgets.get(name)
    }

    pub fn first_gadget(&self) -> Option<&Gadget> {
        self.gadgets.values().next()
    }

    pub fn next_gadget(&self, after: &str) -> Option<&Gadget> {
        self.gadgets
            .range::<str, _>((Bound::Excluded(after), Bound::Unbounded))
            .next()
            .map(|(_, g)| g)
    }

    /// Available USB Device Controllers
    pub fn udcs(&self) -> impl Iterator<Item = &str> {
        self.udcs.iter().map(String::as_str)
    }

    /// Gadget currently bound to `udc`
    pub fn udc_owner(&self, udc: &str) -> Option<&Gadget> {
        self.gadgets.values().find(|g| g.udc() == Some(udc))
    }

    pub(crate) fn gadget_ref(&self, name: &str) -> Result<&Gadget> {
        self.gadgets
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("gadget {}", name)))
    }

    pub(crate) fn gadget_mut(&mut self, name: &str) -> Result<&mut Gadget> {
        self.gadgets
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("gadget {}", name)))
    }

    pub(crate) fn config_ref(&self, gadget: &str, id: &ConfigId) -> Result<&Config> {
        self.gadget_ref(gadget)?
            .configs
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("config {} in gadget {}", id, gadget)))
    }

    pub(crate) fn function_ref(&self, gadget: &str, id: &FunctionId) -> Result<&Function> {
        self.gadget_ref(gadget)?
            .functions
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("function {} in gadget {}", id, gadget)))
    }

    fn require_disabled(&self, gadget: &str) -> Result<()> {
        match self.gadget_ref(gadget)?.udc() {
            Some(udc) => Err(Error::Busy(format!(
                "gadget {} is enabled on {}",
                gadget, udc
            ))),
            None => Ok(()),
        }
    }

    /// Create a gadget directory, then write descriptors and strings.
    ///
    /// `attrs` of `None` keeps the kernel defaults.
    pub fn create_gadget(
        &mut self,
        name: &str,
        attrs: Option<&GadgetAttrs>,
        strings: &[(u16, GadgetStrings)],
    ) -> Result<()> {
        validate_name("gadget", name)?;
        if self.gadgets.contains_key(name) {
            return Err(Error::AlreadyExists(format!("gadget {}", name)));
        }

        let dir = self.paths.gadget(name)?;
        self.fs.make_directory(&dir)?;
        debug!("Created gadget directory {}", dir.display());

        if let Some(attrs) = attrs {
            write_gadget_attrs(&self.fs, &dir, attrs)?;
        }

        let mut gadget = Gadget::new(name);
        for (lang, value) in strings {
            write_gadget_strings(&self.fs, &self.paths, name, *lang, value)?;
            gadget.strings.insert(*lang, value.clone());
        }

        self.gadgets.insert(name.to_string(), gadget);
        info!("Created gadget {}", name);
        Ok(())
    }

    /// Create a function and write its attribute bundle, if given
    pub fn create_function(
        &mut self,
        gadget: &str,
        function_type: FunctionType,
        instance: &str,
        attrs: Option<&FunctionAttrs>,
    ) -> Result<FunctionId> {
        validate_name("function instance", instance)?;
        let id = FunctionId::new(function_type, instance);
        if self.gadget_ref(gadget)?.functions.contains_key(&id) {
            return Err(Error::AlreadyExists(format!(
                "function {} in gadget {}",
                id, gadget
            )));
        }
        if let Some(attrs) = attrs {
            attrs.check_matches(&id)?;
        }

        let dir = self.paths.function(gadget, &id)?;
        self.fs.make_directory(&dir)?;
        if let Some(attrs) = attrs {
            attrs.write(&self.fs, &dir)?;
        }

        self.gadget_mut(gadget)?
            .functions
            .insert(id.clone(), Function::new(id.clone()));
        info!(
            "Created {} function {} in gadget {}",
            function_type.description(),
            id,
            gadget
        );
        Ok(id)
    }

    /// Create a config; `attrs` of `None` keeps and records the kernel defaults
    pub fn create_config(
        &mut self,
        gadget: &str,
        id: u8,
        label: &str,
        attrs: Option<&ConfigAttrs>,
        strings: &[(u16, String)],
    ) -> Result<ConfigId> {
        validate_name("config label", label)?;
        if id == 0 {
            return Err(Error::MalformedName(format!(
                "config {}: id must be between 1 and 255",
                label
            )));
        }
        let config_id = ConfigId::new(id, label);
        if let Some(existing) = self
            .gadget_ref(gadget)?
            .configs
            .keys()
            .find(|c| c.id() == id)
        {
            return Err(Error::AlreadyExists(format!(
                "config id {} in gadget {} (used by {})",
                id, gadget, existing
            )));
        }

        let dir = self.paths.config(gadget, &config_id)?;
        self.fs.make_directory(&dir)?;
        let attrs = match attrs {
            Some(attrs) => {
                write_config_attrs(&self.fs, &dir, attrs)?;
                *attrs
            }
            None => read_config_attrs(&self.fs, &dir)?,
        };

        let mut config = Config::new(config_id.clone(), attrs);
        for (lang, value) in strings {
            write_config_string(&self.fs, &self.paths, gadget, &config_id, *lang, value)?;
            config.strings.insert(*lang, value.clone());
        }

        self.gadget_mut(gadget)?
            .configs
            .insert(config_id.clone(), config);
        info!("Created config {} in gadget {}", config_id, gadget);
        Ok(config_id)
    }

    /// Bind a function into a config.
    ///
    /// The binding is named after the function (`hid.usb0`) unless `name`
    /// says otherwise. Returns the binding name.
    pub fn add_binding(
        &mut self,
        gadget: &str,
        config: &ConfigId,
        target: &FunctionId,
        name: Option<&str>,
    ) -> Result<String> {
        let name = name.map(str::to_string).unwrap_or_else(|| target.name());
        validate_name("binding", &name)?;

        self.function_ref(gadget, target)?;
        if self.config_ref(gadget, config)?.bindings.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "binding {} in config {} of gadget {}",
                name, config, gadget
            )));
        }

        let link = self.paths.binding(gadget, config, &name)?;
        let function_dir = self.paths.function(gadget, target)?;
        self.fs
            .make_symlink(&function_dir, &link)
            .map_err(|e| e.into_incompatible(format_args!("binding {} -> {}", name, target)))?;

        self.gadget_mut(gadget)?
            .configs
            .get_mut(config)
            .ok_or_else(|| Error::NotFound(format!("config {} in gadget {}", config, gadget)))?
            .bindings
            .insert(
                name.clone(),
                Binding {
                    name: name.clone(),
                    target: target.clone(),
                },
            );
        debug!("Linked {} into {} as {}", target, config, name);
        Ok(name)
    }

    pub fn remove_binding(&mut self, gadget: &str, config: &ConfigId, name: &str) -> Result<()> {
        if !self.config_ref(gadget, config)?.bindings.contains_key(name) {
            return Err(Error::NotFound(format!(
                "binding {} in config {} of gadget {}",
                name, config, gadget
            )));
        }

        let link = self.paths.binding(gadget, config, name)?;
        self.fs.remove_file_or_link(&link)?;

        if let Some(c) = self.gadget_mut(gadget)?.configs.get_mut(config) {
            c.bindings.remove(name);
        }
        debug!("Unlinked {} from config {}", name, config);
        Ok(())
    }

    /// Remove a config. With `recursive` its bindings go first; otherwise
    /// bindings make this fail with `HasChildren`.
    pub fn remove_config(
        &mut self,
        gadget: &str,
        config: &ConfigId,
        recursive: bool,
    ) -> Result<()> {
        let bindings: Vec<String> = self
            .config_ref(gadget, config)?
            .bindings
            .keys()
            .cloned()
            .collect();
        self.require_disabled(gadget)?;
        if !bindings.is_empty() && !recursive {
            return Err(Error::HasChildren(format!(
                "config {} of gadget {} has {} binding(s)",
                config,
                gadget,
                bindings.len()
            )));
        }

        for name in &bindings {
            self.remove_binding(gadget, config, name)?;
        }
        if self.gadget_ref(gadget)?.os_desc_config.as_ref() == Some(config) {
            self.set_os_desc_config(gadget, None)?;
        }

        let strings_dir = self.paths.config_strings(gadget, config)?;
        remove_lang_dirs(&self.fs, &strings_dir)?;

        let dir = self.paths.config(gadget, config)?;
        self.fs.remove_directory(&dir)?;
        self.gadget_mut(gadget)?.configs.remove(config);
        info!("Removed config {} from gadget {}", config, gadget);
        Ok(())
    }

    /// Remove a function. With `recursive` every binding that targets it
    /// is removed first; otherwise such bindings make this fail with
    /// `HasChildren`.
    pub fn remove_function(
        &mut self,
        gadget: &str,
        id: &FunctionId,
        recursive: bool,
    ) -> Result<()> {
        self.function_ref(gadget, id)?;
        self.require_disabled(gadget)?;

        let bound: Vec<(ConfigId, String)> = self
            .gadget_ref(gadget)?
            .bindings_to(id)
            .map(|(config, binding)| (config.clone(), binding.name.clone()))
            .collect();
        if !bound.is_empty() && !recursive {
            return Err(Error::HasChildren(format!(
                "function {} of gadget {} is bound in {} config(s)",
                id,
                gadget,
                bound.len()
            )));
        }
        for (config, name) in &bound {
            self.remove_binding(gadget, config, name)?;
        }

        let dir = self.paths.function(gadget, id)?;
        if id.function_type() == FunctionType::MassStorage {
            msd::remove_extra_luns(&AttrDir::new(&self.fs, &dir))?;
        }
        self.fs.remove_directory(&dir)?;

        self.gadget_mut(gadget)?.functions.remove(id);
        info!("Removed function {} from gadget {}", id, gadget);
        Ok(())
    }

    /// Remove a gadget. With `recursive` it is disabled and emptied first,
    /// configs before functions.
    pub fn remove_gadget(&mut self, name: &str, recursive: bool) -> Result<()> {
        let gadget = self.gadget_ref(name)?;
        let enabled = gadget.is_enabled();
        let configs: Vec<ConfigId> = gadget.configs.keys().cloned().collect();
        let functions: Vec<FunctionId> = gadget.functions.keys().cloned().collect();

        if !recursive {
            self.require_disabled(name)?;
            if !configs.is_empty() || !functions.is_empty() {
                return Err(Error::HasChildren(format!(
                    "gadget {} has {} config(s) and {} function(s)",
                    name,
                    configs.len(),
                    functions.len()
                )));
            }
        } else if enabled {
            self.disable_gadget(name)?;
        }

        for config in &configs {
            self.remove_config(name, config, true)?;
        }
        for function in &functions {
            self.remove_function(name, function, true)?;
        }

        remove_lang_dirs(&self.fs, &self.paths.gadget_strings(name)?)?;
        let dir = self.paths.gadget(name)?;
        self.fs.remove_directory(&dir)?;

        self.gadgets.remove(name);
        info!("Removed gadget {}", name);
        Ok(())
    }

    /// Attach the gadget to a UDC, the first free one when `udc` is `None`.
    /// Returns the UDC used.
    pub fn enable_gadget(&mut self, name: &str, udc: Option<&str>) -> Result<String> {
        let gadget = self.gadget_ref(name)?;
        if let Some(current) = gadget.udc() {
            return Err(Error::Busy(format!(
                "gadget {} is already enabled on {}",
                name, current
            )));
        }
        if !gadget.has_bindings() {
            return Err(Error::NotConfigured(format!(
                "gadget {} has no config with a bound function",
                name
            )));
        }

        let udc = match udc {
            Some(udc) => {
                if !self.udcs.contains(udc) {
                    return Err(Error::NotFound(format!(
                        "UDC {} in {}",
                        udc,
                        self.udc_root.display()
                    )));
                }
                if let Some(owner) = self.udc_owner(udc) {
                    return Err(Error::Busy(format!(
                        "UDC {} is used by gadget {}",
                        udc,
                        owner.name()
                    )));
                }
                udc.to_string()
            }
            None => self
                .udcs
                .iter()
                .find(|u| self.udc_owner(u).is_none())
                .cloned()
                .ok_or_else(|| {
                    if self.udcs.is_empty() {
                        Error::NotFound(format!("no UDC in {}", self.udc_root.display()))
                    } else {
                        Error::Busy("every UDC is in use".to_string())
                    }
                })?,
        };

        let path = self.paths.gadget_file(name, UDC_FILE)?;
        self.fs
            .write_file(&path, &codec::encode_text(&udc)?)
            .map_err(|e| e.into_incompatible(format_args!("gadget {} on UDC {}", name, udc)))?;

        self.gadget_mut(name)?.udc = Some(udc.clone());
        info!("Enabled gadget {} on {}", name, udc);
        Ok(udc)
    }

    /// Detach the gadget from its UDC. Disabling a disabled gadget is a no-op
    /// apart from rewriting the empty UDC value.
    pub fn disable_gadget(&mut self, name: &str) -> Result<()> {
        self.gadget_ref(name)?;
        let path = self.paths.gadget_file(name, UDC_FILE)?;
        self.fs.write_file(&path, b"\n")?;

        if let Some(udc) = self.gadget_mut(name)?.udc.take() {
            info!("Disabled gadget {} (was on {})", name, udc);
        }
        Ok(())
    }
}

/// Remove every language directory under a `strings` group
fn remove_lang_dirs<F: ConfigFs>(fs: &F, strings_dir: &Path) -> Result<()> {
    let entries = match fs.list_directory(strings_dir) {
        Ok(entries) => entries,
        Err(Error::NotFound(_)) => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries.into_iter().filter(|e| e.kind == EntryKind::Directory) {
        fs.remove_directory(&strings_dir.join(&entry.name))?;
        debug!("Removed {}/{}", strings_dir.display(), entry.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gadget::hid::{HidAttrs, HidPreset};
    use crate::gadget::memfs::MemFs;
    use crate::gadget::msd::{LunAttrs, MsdAttrs};
    use crate::gadget::types::LANG_US_ENG;
    use nix::errno::Errno;

    const ROOT: &str = "/cfg";
    const UDC_ROOT: &str = "/sys/class/udc";

    fn state_with_udcs(udcs: &[&str]) -> State<MemFs> {
        let fs = MemFs::new(ROOT);
        fs.add_dir_all(Path::new(UDC_ROOT), true);
        for udc in udcs {
            fs.add_udc(Path::new(UDC_ROOT), udc);
        }
        State::with_options(StateOptions::new(ROOT).with_udc_root(UDC_ROOT), fs).unwrap()
    }

    fn g1(path: &str) -> PathBuf {
        Path::new("/cfg/usb_gadget/g1").join(path)
    }

    /// g1 with hid.usb0 bound into config.1 as "keyboard"
    fn keyboard_gadget(state: &mut State<MemFs>) -> (FunctionId, ConfigId) {
        let attrs = GadgetAttrs {
            vendor_id: 0x1d6b,
            ..Default::default()
        };
        state.create_gadget("g1", Some(&attrs), &[]).unwrap();
        let hid = FunctionAttrs::Hid(HidAttrs::preset(HidPreset::Keyboard));
        let f = state
            .create_function("g1", FunctionType::Hid, "usb0", Some(&hid))
            .unwrap();
        let c = state.create_config("g1", 1, "config", None, &[]).unwrap();
        state.add_binding("g1", &c, &f, Some("keyboard")).unwrap();
        (f, c)
    }

    #[test]
    fn test_keyboard_scenario() {
        let mut state = state_with_udcs(&["udc0"]);
        let (f, c) = keyboard_gadget(&mut state);
        assert_eq!(state.enable_gadget("g1", Some("udc0")).unwrap(), "udc0");

        let fs = state.fs();
        assert_eq!(fs.contents(&g1("UDC")).unwrap(), b"udc0\n");
        assert_eq!(fs.contents(&g1("idVendor")).unwrap(), b"0x1d6b\n");
        let target = fs.link_target(&g1("configs/config.1/keyboard")).unwrap();
        assert_eq!(
            crate::gadget::path::resolve_link_target(&g1("configs/config.1/keyboard"), &target),
            g1("functions/hid.usb0")
        );

        let before = state.gadget("g1").unwrap().clone();
        state.reload().unwrap();
        let g = state.gadget("g1").unwrap();
        assert_eq!(g, &before);
        assert_eq!(g.udc(), Some("udc0"));
        let config = g.config(&c).unwrap();
        let bindings: Vec<&Binding> = config.bindings().collect();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].name(), "keyboard");
        assert_eq!(bindings[0].target(), &f);
        assert_eq!(config.attrs().max_power, 2);
    }

    #[test]
    fn test_round_trip_through_loader() {
        let mut state = state_with_udcs(&[]);
        let strings = GadgetStrings {
            manufacturer: "Foundation".to_string(),
            product: "Composite".to_string(),
            serial: "0001".to_string(),
        };
        state
            .create_gadget("g1", None, &[(LANG_US_ENG, strings.clone())])
            .unwrap();
        let acm = state
            .create_function("g1", FunctionType::Acm, "GS0", None)
            .unwrap();
        let ecm = state
            .create_function("g1", FunctionType::Ecm, "usb0", None)
            .unwrap();
        let c2 = state
            .create_config(
                "g1",
                2,
                "c",
                Some(&ConfigAttrs {
                    max_power: 250,
                    bm_attributes: 0xc0,
                }),
                &[(LANG_US_ENG, "CDC 2xACM+ECM".to_string())],
            )
            .unwrap();
        state.create_config("g1", 1, "b", None, &[]).unwrap();
        state.add_binding("g1", &c2, &ecm, None).unwrap();
        state.add_binding("g1", &c2, &acm, Some("serial")).unwrap();

        let before = state.gadget("g1").unwrap().clone();
        state.reload().unwrap();
        let after = state.gadget("g1").unwrap();
        assert_eq!(after, &before);
        assert_eq!(after.strings(LANG_US_ENG), Some(&strings));

        let configs: Vec<String> = after.configs().map(|c| c.id().name()).collect();
        assert_eq!(configs, ["b.1", "c.2"]);
        let names: Vec<&str> = after
            .config(&c2)
            .unwrap()
            .bindings()
            .map(Binding::name)
            .collect();
        assert_eq!(names, ["ecm.usb0", "serial"]);
    }

    #[test]
    fn test_create_preconditions() {
        let mut state = state_with_udcs(&[]);
        state.create_gadget("g1", None, &[]).unwrap();

        let err = state.create_gadget("g1", None, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = state.create_gadget("a/b", None, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedName);

        let err = state
            .create_function("nope", FunctionType::Hid, "usb0", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let midi = FunctionAttrs::Midi(Default::default());
        let err = state
            .create_function("g1", FunctionType::Hid, "usb0", Some(&midi))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleType);
        // Rejected before anything reached the filesystem
        assert!(!state.fs().exists(&g1("functions/hid.usb0")));

        state.create_config("g1", 1, "c", None, &[]).unwrap();
        let err = state.create_config("g1", 1, "other", None, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = state.create_config("g1", 0, "c", None, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedName);

        let missing = FunctionId::new(FunctionType::Acm, "GS0");
        let err = state
            .add_binding("g1", &ConfigId::new(1, "c"), &missing, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_failed_step_leaves_tree_unchanged() {
        let mut state = state_with_udcs(&[]);
        state.create_gadget("g1", None, &[]).unwrap();

        state
            .fs()
            .fail_next(&g1("functions/acm.GS0"), Errno::EACCES);
        let err = state
            .create_function("g1", FunctionType::Acm, "GS0", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(state.gadget("g1").unwrap().functions().next().is_none());

        // A half-written gadget stays on disk but not in the tree
        state.fs().fail_next(&Path::new(ROOT).join("usb_gadget/g2/idVendor"), Errno::EIO);
        let err = state
            .create_gadget("g2", Some(&GadgetAttrs::default()), &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(state.gadget("g2").is_none());
        assert!(state.fs().is_dir(&Path::new(ROOT).join("usb_gadget/g2")));
    }

    #[test]
    fn test_enable_rules() {
        let mut state = state_with_udcs(&["udc0", "udc1"]);
        state.create_gadget("g1", None, &[]).unwrap();
        state.create_config("g1", 1, "c", None, &[]).unwrap();

        let err = state.enable_gadget("g1", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConfigured);

        let f = state
            .create_function("g1", FunctionType::Acm, "GS0", None)
            .unwrap();
        state
            .add_binding("g1", &ConfigId::new(1, "c"), &f, None)
            .unwrap();

        let err = state.enable_gadget("g1", Some("udc9")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert_eq!(state.enable_gadget("g1", None).unwrap(), "udc0");
        assert_eq!(state.udc_owner("udc0").unwrap().name(), "g1");
        let err = state.enable_gadget("g1", Some("udc1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);

        // Structural removal is refused while enabled
        let err = state.remove_function("g1", &f, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        let err = state
            .remove_config("g1", &ConfigId::new(1, "c"), true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
    }

    #[test]
    fn test_udc_cannot_be_shared() {
        let mut state = state_with_udcs(&["udc0"]);
        for name in ["g1", "g2"] {
            state.create_gadget(name, None, &[]).unwrap();
            let f = state
                .create_function(name, FunctionType::Acm, "GS0", None)
                .unwrap();
            let c = state.create_config(name, 1, "c", None, &[]).unwrap();
            state.add_binding(name, &c, &f, None).unwrap();
        }
        state.enable_gadget("g1", Some("udc0")).unwrap();

        let err = state.enable_gadget("g2", Some("udc0")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        let err = state.enable_gadget("g2", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
    }

    #[test]
    fn test_kernel_rejection_is_incompatible_type() {
        let mut state = state_with_udcs(&["udc0"]);
        let (_, _) = keyboard_gadget(&mut state);
        state.fs().fail_next(&g1("UDC"), Errno::EINVAL);
        let err = state.enable_gadget("g1", Some("udc0")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleType);
        assert!(!state.gadget("g1").unwrap().is_enabled());

        let f = state
            .create_function("g1", FunctionType::Uvc, "0", None)
            .unwrap();
        let c = ConfigId::new(1, "config");
        state
            .fs()
            .fail_next(&g1("configs/config.1/uvc.0"), Errno::EINVAL);
        let err = state.add_binding("g1", &c, &f, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleType);
        assert!(state.gadget("g1").unwrap().config(&c).unwrap().binding("uvc.0").is_none());
    }

    #[test]
    fn test_disable_is_idempotent() {
        let mut state = state_with_udcs(&["udc0"]);
        keyboard_gadget(&mut state);
        state.enable_gadget("g1", None).unwrap();

        state.fs().clear_writes();
        state.disable_gadget("g1").unwrap();
        state.disable_gadget("g1").unwrap();

        assert!(!state.gadget("g1").unwrap().is_enabled());
        assert_eq!(
            state.fs().writes(),
            vec![(g1("UDC"), b"\n".to_vec()), (g1("UDC"), b"\n".to_vec())]
        );
    }

    #[test]
    fn test_remove_config_requires_recursion() {
        let mut state = state_with_udcs(&[]);
        let (_, c) = keyboard_gadget(&mut state);
        state
            .set_config_string("g1", &c, LANG_US_ENG, "Keyboard")
            .unwrap();

        let err = state.remove_config("g1", &c, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HasChildren);
        assert!(state.fs().exists(&g1("configs/config.1/keyboard")));

        state.remove_config("g1", &c, true).unwrap();
        assert!(!state.fs().exists(&g1("configs/config.1")));
        assert!(state.gadget("g1").unwrap().config(&c).is_none());
    }

    #[test]
    fn test_remove_function_with_bindings() {
        let mut state = state_with_udcs(&[]);
        let (f, c) = keyboard_gadget(&mut state);
        let c2 = state.create_config("g1", 2, "config", None, &[]).unwrap();
        state.add_binding("g1", &c2, &f, None).unwrap();

        let err = state.remove_function("g1", &f, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HasChildren);

        state.remove_function("g1", &f, true).unwrap();
        let g = state.gadget("g1").unwrap();
        assert!(g.function(&f).is_none());
        assert!(g.config(&c).unwrap().bindings().next().is_none());
        assert!(g.config(&c2).unwrap().bindings().next().is_none());
        assert!(!state.fs().exists(&g1("functions/hid.usb0")));
    }

    #[test]
    fn test_remove_gadget() {
        let mut state = state_with_udcs(&["udc0"]);
        keyboard_gadget(&mut state);
        let msd = FunctionAttrs::MassStorage(MsdAttrs {
            stall: false,
            luns: vec![LunAttrs::default(), LunAttrs::cdrom("/images/boot.iso")],
        });
        state
            .create_function("g1", FunctionType::MassStorage, "0", Some(&msd))
            .unwrap();
        state
            .set_gadget_strings("g1", LANG_US_ENG, &GadgetStrings::default())
            .unwrap();
        state.set_os_desc_config("g1", Some(&ConfigId::new(1, "config"))).unwrap();
        state.enable_gadget("g1", None).unwrap();

        let err = state.remove_gadget("g1", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        state.disable_gadget("g1").unwrap();
        let err = state.remove_gadget("g1", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HasChildren);

        state.enable_gadget("g1", None).unwrap();
        state.remove_gadget("g1", true).unwrap();
        assert!(state.gadget("g1").is_none());
        assert_eq!(state.fs().descendants(state.paths().gadget_root()), 0);
        assert!(state.udc_owner("udc0").is_none());
    }

    #[test]
    fn test_remove_empty_gadget_non_recursive() {
        let mut state = state_with_udcs(&[]);
        state
            .create_gadget("g1", None, &[(LANG_US_ENG, GadgetStrings::default())])
            .unwrap();
        state.remove_gadget("g1", false).unwrap();
        assert!(!state.fs().exists(&g1("")));
    }

    #[test]
    fn test_iteration_cursors() {
        let mut state = state_with_udcs(&[]);
        for name in ["b", "a", "c"] {
            state.create_gadget(name, None, &[]).unwrap();
        }
        let mut seen = Vec::new();
        let mut cursor = state.first_gadget().map(|g| g.name().to_string());
        while let Some(name) = cursor {
            seen.push(name.clone());
            if name == "b" {
                state.remove_gadget("b", false).unwrap();
            }
            cursor = state.next_gadget(&name).map(|g| g.name().to_string());
        }
        assert_eq!(seen, ["a", "b", "c"]);
    }

    #[test]
    fn test_missing_configfs() {
        let fs = MemFs::new("/other");
        let err = State::with_options(StateOptions::new(ROOT), fs).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigfsUnavailable);
    }

    #[test]
    fn test_reload_keeps_tree_on_failure() {
        let mut state = state_with_udcs(&[]);
        state.create_gadget("g1", None, &[]).unwrap();
        state
            .fs()
            .fail_next(state.paths().gadget_root(), Errno::EACCES);
        assert!(state.reload().is_err());
        assert!(state.gadget("g1").is_some());
    }
}
