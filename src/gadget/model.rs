//! In-memory entity tree
//!
//! A [`Gadget`] owns its functions and configs outright; a [`Binding`] refers
//! to its target by [`FunctionId`], a key into the owning gadget's function
//! map. All children live in ordered maps keyed by composed name, so
//! iteration order does not depend on the kernel's directory scan order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

use serde::{Serialize, Serializer};

use super::function::FunctionType;
use super::path::lang_dir_name;
use super::types::{ConfigAttrs, GadgetStrings};

/// Identity of a function: `(type, instance)`, composed as `type.instance`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionId {
    function_type: FunctionType,
    instance: String,
}

impl FunctionId {
    pub fn new(function_type: FunctionType, instance: impl Into<String>) -> Self {
        Self {
            function_type,
            instance: instance.into(),
        }
    }

    pub fn function_type(&self) -> FunctionType {
        self.function_type
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Directory name (`hid.usb0`)
    pub fn name(&self) -> String {
        format!("{}.{}", self.function_type.as_str(), self.instance)
    }

    fn name_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.function_type
            .as_str()
            .bytes()
            .chain(std::iter::once(b'.'))
            .chain(self.instance.bytes())
    }
}

impl Ord for FunctionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name_bytes().cmp(other.name_bytes())
    }
}

impl PartialOrd for FunctionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.function_type, self.instance)
    }
}

impl Serialize for FunctionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Identity of a config: `(id, label)`, composed as `label.id`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigId {
    id: u8,
    label: String,
}

impl ConfigId {
    pub fn new(id: u8, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Directory name (`config.1`)
    pub fn name(&self) -> String {
        format!("{}.{}", self.label, self.id)
    }
}

impl Ord for ConfigId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name().cmp(&other.name())
    }
}

impl PartialOrd for ConfigId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.label, self.id)
    }
}

impl Serialize for ConfigId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn map_values<S, K, V>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    serializer.collect_seq(map.values())
}

fn lang_keys<S, V>(map: &BTreeMap<u16, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    serializer.collect_map(map.iter().map(|(lang, v)| (lang_dir_name(*lang), v)))
}

/// Entry following `after` in an ordered map
fn next_after<'a, K: Ord, V>(map: &'a BTreeMap<K, V>, after: &K) -> Option<&'a V> {
    map.range::<K, _>((Bound::Excluded(after), Bound::Unbounded))
        .next()
        .map(|(_, v)| v)
}

/// An emulated USB device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gadget {
    pub(crate) name: String,
    pub(crate) udc: Option<String>,
    #[serde(serialize_with = "lang_keys")]
    pub(crate) strings: BTreeMap<u16, GadgetStrings>,
    #[serde(serialize_with = "map_values")]
    pub(crate) functions: BTreeMap<FunctionId, Function>,
    #[serde(serialize_with = "map_values")]
    pub(crate) configs: BTreeMap<ConfigId, Config>,
    pub(crate) os_desc_config: Option<ConfigId>,
}

impl Gadget {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            udc: None,
            strings: BTreeMap::new(),
            functions: BTreeMap::new(),
            configs: BTreeMap::new(),
            os_desc_config: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound controller, `None` while disabled
    pub fn udc(&self) -> Option<&str> {
        self.udc.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.udc.is_some()
    }

    /// Strings for a language; `None` when the language is not materialised
    pub fn strings(&self, lang: u16) -> Option<&GadgetStrings> {
        self.strings.get(&lang)
    }

    pub fn langs(&self) -> impl Iterator<Item = u16> + '_ {
        self.strings.keys().copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn function(&self, id: &FunctionId) -> Option<&Function> {
        self.functions.get(id)
    }

    pub fn find_function(&self, function_type: FunctionType, instance: &str) -> Option<&Function> {
        self.function(&FunctionId::new(function_type, instance))
    }

    pub fn first_function(&self) -> Option<&Function> {
        self.functions.values().next()
    }

    pub fn next_function(&self, after: &FunctionId) -> Option<&Function> {
        next_after(&self.functions, after)
    }

    pub fn configs(&self) -> impl Iterator<Item = &Config> {
        self.configs.values()
    }

    pub fn config(&self, id: &ConfigId) -> Option<&Config> {
        self.configs.get(id)
    }

    pub fn find_config(&self, id: u8, label: &str) -> Option<&Config> {
        self.config(&ConfigId::new(id, label))
    }

    pub fn first_config(&self) -> Option<&Config> {
        self.configs.values().next()
    }

    pub fn next_config(&self, after: &ConfigId) -> Option<&Config> {
        next_after(&self.configs, after)
    }

    /// Config designated for Microsoft OS descriptors
    pub fn os_desc_config(&self) -> Option<&ConfigId> {
        self.os_desc_config.as_ref()
    }

    /// Whether any config holds at least one binding
    pub fn has_bindings(&self) -> bool {
        self.configs.values().any(|c| !c.bindings.is_empty())
    }

    /// Bindings across all configs that target `function`
    pub(crate) fn bindings_to<'a>(
        &'a self,
        function: &'a FunctionId,
    ) -> impl Iterator<Item = (&'a ConfigId, &'a Binding)> + 'a {
        self.configs.values().flat_map(move |c| {
            c.bindings
                .values()
                .filter(move |b| &b.target == function)
                .map(move |b| (&c.id, b))
        })
    }
}

/// One USB function instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Function {
    pub(crate) id: FunctionId,
}

impl Function {
    pub(crate) fn new(id: FunctionId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &FunctionId {
        &self.id
    }

    pub fn function_type(&self) -> FunctionType {
        self.id.function_type()
    }

    pub fn instance(&self) -> &str {
        self.id.instance()
    }
}

/// One USB configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub(crate) id: ConfigId,
    pub(crate) attrs: ConfigAttrs,
    #[serde(serialize_with = "lang_keys")]
    pub(crate) strings: BTreeMap<u16, String>,
    #[serde(serialize_with = "map_values")]
    pub(crate) bindings: BTreeMap<String, Binding>,
}

impl Config {
    pub(crate) fn new(id: ConfigId, attrs: ConfigAttrs) -> Self {
        Self {
            id,
            attrs,
            strings: BTreeMap::new(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &ConfigId {
        &self.id
    }

    pub fn attrs(&self) -> &ConfigAttrs {
        &self.attrs
    }

    /// Configuration string; `None` when the language is not materialised
    pub fn string(&self, lang: u16) -> Option<&str> {
        self.strings.get(&lang).map(String::as_str)
    }

    pub fn langs(&self) -> impl Iterator<Item = u16> + '_ {
        self.strings.keys().copied()
    }

    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn first_binding(&self) -> Option<&Binding> {
        self.bindings.values().next()
    }

    pub fn next_binding(&self, after: &str) -> Option<&Binding> {
        self.bindings
            .range::<str, _>((Bound::Excluded(after), Bound::Unbounded))
            .next()
            .map(|(_, b)| b)
    }
}

/// Association of a function into a config (a symlink on disk)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub(crate) name: String,
    pub(crate) target: FunctionId,
}

impl Binding {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &FunctionId {
        &self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_id_order_follows_composed_name() {
        let mut ids = vec![
            FunctionId::new(FunctionType::Hid, "usb1"),
            FunctionId::new(FunctionType::Acm, "GS0"),
            FunctionId::new(FunctionType::Hid, "usb0"),
            FunctionId::new(FunctionType::Loopback, "0"),
        ];
        ids.sort();
        let names: Vec<String> = ids.iter().map(FunctionId::name).collect();
        assert_eq!(names, ["Loopback.0", "acm.GS0", "hid.usb0", "hid.usb1"]);
    }

    #[test]
    fn test_config_id_order_follows_composed_name() {
        let mut ids = vec![
            ConfigId::new(2, "c"),
            ConfigId::new(10, "c"),
            ConfigId::new(1, "b"),
        ];
        ids.sort();
        let names: Vec<String> = ids.iter().map(ConfigId::name).collect();
        assert_eq!(names, ["b.1", "c.10", "c.2"]);
    }

    #[test]
    fn test_cursors() {
        let mut gadget = Gadget::new("g1");
        for instance in ["usb0", "usb1", "usb2"] {
            let id = FunctionId::new(FunctionType::Hid, instance);
            gadget.functions.insert(id.clone(), Function::new(id));
        }

        let first = gadget.first_function().unwrap();
        assert_eq!(first.instance(), "usb0");
        let second = gadget.next_function(first.id()).unwrap();
        assert_eq!(second.instance(), "usb1");

        // Cursor stays valid after its entry disappears
        let cursor = second.id().clone();
        gadget.functions.remove(&cursor);
        assert_eq!(gadget.next_function(&cursor).unwrap().instance(), "usb2");
        assert!(gadget
            .next_function(&FunctionId::new(FunctionType::Hid, "usb2"))
            .is_none());

        let mut config = Config::new(ConfigId::new(1, "c"), ConfigAttrs::default());
        for name in ["mouse", "keyboard"] {
            config.bindings.insert(
                name.to_string(),
                Binding {
                    name: name.to_string(),
                    target: FunctionId::new(FunctionType::Hid, "usb0"),
                },
            );
        }
        assert_eq!(config.first_binding().unwrap().name(), "keyboard");
        assert_eq!(config.next_binding("keyboard").unwrap().name(), "mouse");
        assert!(config.next_binding("mouse").is_none());
    }

    #[test]
    fn test_serialize_tree() {
        let mut gadget = Gadget::new("g1");
        gadget.strings.insert(0x409, GadgetStrings::default());
        let id = FunctionId::new(FunctionType::Ecm, "usb0");
        gadget.functions.insert(id.clone(), Function::new(id));

        let json = serde_json::to_value(&gadget).unwrap();
        assert_eq!(json["name"], "g1");
        assert_eq!(json["functions"][0]["id"], "ecm.usb0");
        assert!(json["strings"]["0x409"].is_object());
    }
}
