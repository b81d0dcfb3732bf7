//! Reconstruct the entity tree from configfs

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, warn};

use super::attrs::AttrDir;
use super::configfs::{ConfigFs, EntryKind};
use super::model::{Binding, Config, ConfigId, Function, FunctionId, Gadget};
use super::path::{
    parse_config_name, parse_function_name, parse_lang, path_eq, resolve_link_target, Paths,
    UDC_FILE,
};
use super::types::{
    ConfigAttrs, GadgetStr, GadgetStrings, CONFIG_ATTRIBUTES_FILE, CONFIG_MAX_POWER_FILE,
    CONFIG_STRING_FILE,
};
use crate::error::{Error, Result};

/// Everything the loader discovers
#[derive(Debug, Default)]
pub(crate) struct LoadedTree {
    pub gadgets: BTreeMap<String, Gadget>,
    pub udcs: BTreeSet<String>,
}

/// Walk the gadget root and the UDC directory
pub(crate) fn load<F: ConfigFs>(fs: &F, paths: &Paths, udc_root: &Path) -> Result<LoadedTree> {
    let entries = match fs.list_directory(paths.gadget_root()) {
        Ok(entries) => entries,
        Err(Error::NotFound(_)) => {
            return Err(Error::ConfigfsUnavailable(format!(
                "{} does not exist (is configfs mounted and libcomposite loaded?)",
                paths.gadget_root().display()
            )))
        }
        Err(e) => return Err(e),
    };

    let udcs = load_udcs(fs, udc_root)?;

    let mut gadgets = BTreeMap::new();
    for entry in entries {
        if entry.kind != EntryKind::Directory {
            warn!(
                "Ignoring non-directory {} in {}",
                entry.name,
                paths.gadget_root().display()
            );
            continue;
        }
        let gadget = load_gadget(fs, paths, &entry.name)?;
        gadgets.insert(entry.name, gadget);
    }

    debug!(
        "Loaded {} gadget(s), {} UDC(s) from {}",
        gadgets.len(),
        udcs.len(),
        paths.configfs_root().display()
    );
    Ok(LoadedTree { gadgets, udcs })
}

/// UDC names; a missing class directory means no controller
fn load_udcs<F: ConfigFs>(fs: &F, udc_root: &Path) -> Result<BTreeSet<String>> {
    match fs.list_directory(udc_root) {
        Ok(entries) => Ok(entries.into_iter().map(|e| e.name).collect()),
        Err(Error::NotFound(_)) => {
            warn!("No UDC directory at {}", udc_root.display());
            Ok(BTreeSet::new())
        }
        Err(e) => Err(e),
    }
}

/// Directory entries of an optional subtree; absent means empty
fn list_optional<F: ConfigFs>(fs: &F, dir: &Path) -> Result<Vec<super::configfs::DirEntry>> {
    match fs.list_directory(dir) {
        Ok(entries) => Ok(entries),
        Err(Error::NotFound(_)) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

fn load_gadget<F: ConfigFs>(fs: &F, paths: &Paths, name: &str) -> Result<Gadget> {
    let mut gadget = Gadget::new(name);
    let dir = paths.gadget(name)?;
    let attrs = AttrDir::new(fs, &dir);

    gadget.udc = attrs
        .read_optional_string(UDC_FILE)?
        .filter(|udc| !udc.is_empty());

    for entry in list_optional(fs, &paths.gadget_strings(name)?)? {
        if entry.kind != EntryKind::Directory {
            continue;
        }
        let lang = parse_lang(&entry.name)?;
        let lang_dir = AttrDir::new(fs, &paths.gadget_lang(name, lang)?);
        let mut strings = GadgetStrings::default();
        for which in GadgetStr::ALL {
            if let Some(value) = lang_dir.read_optional_string(which.file_name())? {
                strings.set(which, value);
            }
        }
        gadget.strings.insert(lang, strings);
    }

    for entry in fs.list_directory(&paths.functions_dir(name)?)? {
        if entry.kind != EntryKind::Directory {
            continue;
        }
        let id = parse_function_name(&entry.name)?;
        debug!("Found function {} in gadget {}", id, name);
        gadget.functions.insert(id.clone(), Function::new(id));
    }

    for entry in fs.list_directory(&paths.configs_dir(name)?)? {
        if entry.kind != EntryKind::Directory {
            continue;
        }
        let id = parse_config_name(&entry.name)?;
        let config = load_config(fs, paths, &gadget, id)?;
        debug!(
            "Found config {} in gadget {} with {} binding(s)",
            config.id,
            name,
            config.bindings.len()
        );
        gadget.configs.insert(config.id.clone(), config);
    }

    gadget.os_desc_config = load_os_desc_link(fs, paths, &gadget)?;
    Ok(gadget)
}

fn load_config<F: ConfigFs>(
    fs: &F,
    paths: &Paths,
    gadget: &Gadget,
    id: ConfigId,
) -> Result<Config> {
    let dir = paths.config(&gadget.name, &id)?;
    let attrs = AttrDir::new(fs, &dir);
    let mut config = Config::new(
        id,
        ConfigAttrs {
            max_power: attrs.read_dec(CONFIG_MAX_POWER_FILE)?,
            bm_attributes: attrs.read_hex(CONFIG_ATTRIBUTES_FILE)?,
        },
    );

    for entry in list_optional(fs, &paths.config_strings(&gadget.name, &config.id)?)? {
        if entry.kind != EntryKind::Directory {
            continue;
        }
        let lang = parse_lang(&entry.name)?;
        let lang_dir = AttrDir::new(fs, &paths.config_lang(&gadget.name, &config.id, lang)?);
        let value = lang_dir
            .read_optional_string(CONFIG_STRING_FILE)?
            .unwrap_or_default();
        config.strings.insert(lang, value);
    }

    for entry in fs.list_directory(&dir)? {
        if entry.kind != EntryKind::Symlink {
            continue;
        }
        let link = paths.binding(&gadget.name, &config.id, &entry.name)?;
        let target = resolve_function_link(fs, paths, gadget, &link)?;
        config.bindings.insert(
            entry.name.clone(),
            Binding {
                name: entry.name,
                target,
            },
        );
    }
    Ok(config)
}

/// Resolve a binding symlink to a function already loaded in `gadget`
fn resolve_function_link<F: ConfigFs>(
    fs: &F,
    paths: &Paths,
    gadget: &Gadget,
    link: &Path,
) -> Result<FunctionId> {
    let target = resolve_link_target(link, &fs.read_link(link)?);
    let dangling = || {
        Error::DanglingBinding(format!(
            "{} -> {} does not name a function of gadget {}",
            link.display(),
            target.display(),
            gadget.name
        ))
    };

    let functions_dir = paths.functions_dir(&gadget.name)?;
    let parent = target.parent().ok_or_else(dangling)?;
    if !path_eq(&parent.to_string_lossy(), &functions_dir.to_string_lossy()) {
        return Err(dangling());
    }
    let id = target
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| parse_function_name(n).ok())
        .ok_or_else(dangling)?;
    if !gadget.functions.contains_key(&id) {
        return Err(dangling());
    }
    Ok(id)
}

/// The config linked from `os_desc/`, if any
fn load_os_desc_link<F: ConfigFs>(
    fs: &F,
    paths: &Paths,
    gadget: &Gadget,
) -> Result<Option<ConfigId>> {
    let os_desc_dir = paths.os_desc_dir(&gadget.name)?;
    let configs_dir = paths.configs_dir(&gadget.name)?;

    for entry in list_optional(fs, &os_desc_dir)? {
        if entry.kind != EntryKind::Symlink {
            continue;
        }
        let link = os_desc_dir.join(&entry.name);
        let target = resolve_link_target(&link, &fs.read_link(&link)?);
        let id = target
            .parent()
            .filter(|p| path_eq(&p.to_string_lossy(), &configs_dir.to_string_lossy()))
            .and_then(|_| target.file_name())
            .and_then(|n| n.to_str())
            .and_then(|n| parse_config_name(n).ok())
            .filter(|id| gadget.configs.contains_key(id))
            .ok_or_else(|| {
                Error::DanglingBinding(format!(
                    "{} -> {} does not name a config of gadget {}",
                    link.display(),
                    target.display(),
                    gadget.name
                ))
            })?;
        return Ok(Some(id));
    }
    Ok(None)
}
