//! In-memory configfs emulation for tests
//!
//! Mirrors the parts of the kernel's behaviour the engine relies on:
//! `mkdir` of a gadget, config, string language or function materialises
//! the default groups and attribute files, `rmdir` drops attribute files
//! but refuses while user-created directories or symlinks remain, and
//! symlinks must point at an existing directory. Attribute files cannot be
//! created by writing; they exist only when the kernel would create them.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use nix::errno::Errno;

use super::configfs::{classify, ConfigFs, DirEntry, EntryKind};
use super::path::{resolve_link_target, GADGET_SUBDIR};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir { default: bool },
    Link(PathBuf),
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<PathBuf, Node>,
    writes: Vec<(PathBuf, Vec<u8>)>,
    failures: HashMap<PathBuf, Errno>,
}

#[derive(Debug)]
pub(crate) struct MemFs {
    gadget_root: PathBuf,
    inner: RefCell<Inner>,
}

fn os_error(errno: Errno, path: &Path) -> Error {
    classify(std::io::Error::from_raw_os_error(errno as i32), path)
}

const GADGET_FILES: &[(&str, &str)] = &[
    ("UDC", "\n"),
    ("bcdUSB", "0x200\n"),
    ("bDeviceClass", "0x0\n"),
    ("bDeviceSubClass", "0x0\n"),
    ("bDeviceProtocol", "0x0\n"),
    ("bMaxPacketSize0", "0x40\n"),
    ("idVendor", "0x0\n"),
    ("idProduct", "0x0\n"),
    ("bcdDevice", "0x0\n"),
];

const OS_DESC_FILES: &[(&str, &str)] = &[
    ("use", "0\n"),
    ("b_vendor_code", "0x00\n"),
    ("qw_sign", "\n"),
];

const LUN_FILES: &[(&str, &str)] = &[
    ("cdrom", "0\n"),
    ("ro", "0\n"),
    ("nofua", "0\n"),
    ("removable", "1\n"),
    ("file", "\n"),
];

fn function_files(type_prefix: &str) -> &'static [(&'static str, &'static str)] {
    match type_prefix {
        "gser" | "acm" | "obex" => &[("port_num", "0\n")],
        "ecm" | "geth" | "ncm" | "eem" | "rndis" => &[
            ("dev_addr", "02:00:00:00:00:01\n"),
            ("host_addr", "02:00:00:00:00:02\n"),
            ("ifname", "usb0\n"),
            ("qmult", "5\n"),
        ],
        "phonet" => &[("ifname", "upnlink0\n")],
        "midi" => &[
            ("index", "-1\n"),
            ("id", "\n"),
            ("in_ports", "1\n"),
            ("out_ports", "1\n"),
            ("buflen", "512\n"),
            ("qlen", "32\n"),
        ],
        "hid" => &[
            ("protocol", "0\n"),
            ("subclass", "0\n"),
            ("report_length", "0\n"),
            ("report_desc", ""),
        ],
        "mass_storage" => &[("stall", "1\n")],
        _ => &[],
    }
}

impl MemFs {
    /// An empty configfs mounted at `configfs_root` with the gadget subsystem loaded
    pub fn new(configfs_root: impl AsRef<Path>) -> Self {
        let configfs_root = configfs_root.as_ref();
        let gadget_root = configfs_root.join(GADGET_SUBDIR);
        let fs = Self {
            gadget_root: gadget_root.clone(),
            inner: RefCell::new(Inner::default()),
        };
        fs.add_dir_all(configfs_root, true);
        fs.add_dir_all(&gadget_root, true);
        fs
    }

    /// Make a directory (and its parents) outside the emulated kernel rules
    pub fn add_dir_all(&self, path: &Path, default: bool) {
        let mut inner = self.inner.borrow_mut();
        for ancestor in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            inner
                .nodes
                .entry(ancestor.to_path_buf())
                .or_insert(Node::Dir { default });
        }
    }

    /// Register a controller under `udc_root`
    pub fn add_udc(&self, udc_root: &Path, name: &str) {
        self.add_dir_all(&udc_root.join(name), true);
    }

    /// Make the next operation touching `path` fail with `errno`
    pub fn fail_next(&self, path: &Path, errno: Errno) {
        self.inner
            .borrow_mut()
            .failures
            .insert(path.to_path_buf(), errno);
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.inner.borrow().nodes.contains_key(path)
    }

    pub fn is_dir(&self, path: &Path) -> bool {
        matches!(self.inner.borrow().nodes.get(path), Some(Node::Dir { .. }))
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        match self.inner.borrow().nodes.get(path) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn link_target(&self, path: &Path) -> Option<PathBuf> {
        match self.inner.borrow().nodes.get(path) {
            Some(Node::Link(target)) => Some(target.clone()),
            _ => None,
        }
    }

    /// Every successful write, in order
    pub fn writes(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.inner.borrow().writes.clone()
    }

    pub fn writes_to(&self, path: &Path) -> Vec<Vec<u8>> {
        self.inner
            .borrow()
            .writes
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn clear_writes(&self) {
        self.inner.borrow_mut().writes.clear();
    }

    /// Number of nodes below `path`
    pub fn descendants(&self, path: &Path) -> usize {
        self.inner
            .borrow()
            .nodes
            .keys()
            .filter(|p| p.starts_with(path) && p.as_path() != path)
            .count()
    }

    fn injected(&self, path: &Path) -> Result<()> {
        match self.inner.borrow_mut().failures.remove(path) {
            Some(errno) => Err(os_error(errno, path)),
            None => Ok(()),
        }
    }

    fn require_dir(inner: &Inner, path: &Path) -> Result<()> {
        match inner.nodes.get(path) {
            Some(Node::Dir { .. }) => Ok(()),
            Some(_) => Err(os_error(Errno::ENOTDIR, path)),
            None => Err(os_error(Errno::ENOENT, path)),
        }
    }

    fn parent_of(path: &Path) -> Result<&Path> {
        path.parent().ok_or_else(|| os_error(Errno::EINVAL, path))
    }

    fn children<'a>(
        inner: &'a Inner,
        path: &'a Path,
    ) -> impl DoubleEndedIterator<Item = (&'a PathBuf, &'a Node)> {
        inner
            .nodes
            .iter()
            .filter(move |(p, _)| p.parent() == Some(path))
    }

    /// Default groups and attribute files the kernel creates along with `path`
    fn materialise(&self, inner: &mut Inner, path: &Path) {
        let rel = match path.strip_prefix(&self.gadget_root) {
            Ok(rel) => rel,
            Err(_) => return,
        };
        let parts: Vec<&str> = rel.iter().filter_map(|c| c.to_str()).collect();

        let mut add_file = |name: &str, data: &str| {
            inner
                .nodes
                .insert(path.join(name), Node::File(data.as_bytes().to_vec()));
        };
        let mut dirs: Vec<PathBuf> = Vec::new();

        match parts.as_slice() {
            [_gadget] => {
                for (name, data) in GADGET_FILES {
                    add_file(name, data);
                }
                for dir in ["functions", "configs", "strings", "os_desc"] {
                    dirs.push(path.join(dir));
                }
            }
            [_, "functions", function] => {
                let prefix = function.split('.').next().unwrap_or_default();
                for (name, data) in function_files(prefix) {
                    add_file(name, data);
                }
                if prefix == "mass_storage" {
                    dirs.push(path.join("lun.0"));
                }
            }
            [_, "functions", _, lun] if lun.starts_with("lun.") => {
                for (name, data) in LUN_FILES {
                    add_file(name, data);
                }
            }
            [_, "configs", _] => {
                add_file("MaxPower", "2\n");
                add_file("bmAttributes", "0x80\n");
                dirs.push(path.join("strings"));
            }
            [_, "strings", _] => {
                for name in ["manufacturer", "product", "serialnumber"] {
                    add_file(name, "\n");
                }
            }
            [_, "configs", _, "strings", _] => add_file("configuration", "\n"),
            _ => {}
        }

        for dir in dirs {
            inner.nodes.insert(dir.clone(), Node::Dir { default: true });
            self.materialise(inner, &dir);
        }
        if parts.len() == 1 {
            let os_desc = path.join("os_desc");
            for (name, data) in OS_DESC_FILES {
                inner
                    .nodes
                    .insert(os_desc.join(name), Node::File(data.as_bytes().to_vec()));
            }
        }
    }

    /// Whether `path` holds anything rmdir would refuse to drop
    fn has_user_entries(inner: &Inner, path: &Path) -> bool {
        Self::children(inner, path).any(|(child, node)| match node {
            Node::File(_) => false,
            Node::Link(_) => true,
            Node::Dir { default: false } => true,
            Node::Dir { default: true } => Self::has_user_entries(inner, child),
        })
    }
}

impl ConfigFs for MemFs {
    fn list_directory(&self, path: &Path) -> Result<Vec<DirEntry>> {
        self.injected(path)?;
        let inner = self.inner.borrow();
        Self::require_dir(&inner, path)?;
        Ok(Self::children(&inner, path)
            .filter_map(|(child, node)| {
                let name = child.file_name()?.to_str()?.to_string();
                let kind = match node {
                    Node::File(_) => EntryKind::File,
                    Node::Dir { .. } => EntryKind::Directory,
                    Node::Link(_) => EntryKind::Symlink,
                };
                Some(DirEntry::new(name, kind))
            })
            // Reverse order to catch any reliance on scan order
            .rev()
            .collect())
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        self.injected(path)?;
        match self.inner.borrow().nodes.get(path) {
            Some(Node::Link(target)) => Ok(target.clone()),
            Some(_) => Err(os_error(Errno::EINVAL, path)),
            None => Err(os_error(Errno::ENOENT, path)),
        }
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.injected(path)?;
        match self.inner.borrow().nodes.get(path) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(_) => Err(os_error(Errno::EISDIR, path)),
            None => Err(os_error(Errno::ENOENT, path)),
        }
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.injected(path)?;
        let mut inner = self.inner.borrow_mut();
        match inner.nodes.get_mut(path) {
            Some(Node::File(contents)) => *contents = data.to_vec(),
            Some(_) => return Err(os_error(Errno::EISDIR, path)),
            None => return Err(os_error(Errno::ENOENT, path)),
        }
        inner.writes.push((path.to_path_buf(), data.to_vec()));
        Ok(())
    }

    fn make_directory(&self, path: &Path) -> Result<()> {
        self.injected(path)?;
        let mut inner = self.inner.borrow_mut();
        Self::require_dir(&inner, Self::parent_of(path)?)?;
        if inner.nodes.contains_key(path) {
            return Err(os_error(Errno::EEXIST, path));
        }
        inner
            .nodes
            .insert(path.to_path_buf(), Node::Dir { default: false });
        self.materialise(&mut inner, path);
        Ok(())
    }

    fn make_symlink(&self, target: &Path, link: &Path) -> Result<()> {
        self.injected(link)?;
        let mut inner = self.inner.borrow_mut();
        Self::require_dir(&inner, Self::parent_of(link)?)?;
        if inner.nodes.contains_key(link) {
            return Err(os_error(Errno::EEXIST, link));
        }
        let resolved = resolve_link_target(link, target);
        if !matches!(inner.nodes.get(&resolved), Some(Node::Dir { .. })) {
            return Err(os_error(Errno::ENOENT, link));
        }
        inner
            .nodes
            .insert(link.to_path_buf(), Node::Link(target.to_path_buf()));
        Ok(())
    }

    fn remove_directory(&self, path: &Path) -> Result<()> {
        self.injected(path)?;
        let mut inner = self.inner.borrow_mut();
        match inner.nodes.get(path) {
            Some(Node::Dir { default: false }) => {}
            Some(Node::Dir { default: true }) => return Err(os_error(Errno::EPERM, path)),
            Some(_) => return Err(os_error(Errno::ENOTDIR, path)),
            None => return Err(os_error(Errno::ENOENT, path)),
        }
        if Self::has_user_entries(&inner, path) {
            return Err(os_error(Errno::ENOTEMPTY, path));
        }
        inner.nodes.retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn remove_file_or_link(&self, path: &Path) -> Result<()> {
        self.injected(path)?;
        let mut inner = self.inner.borrow_mut();
        match inner.nodes.get(path) {
            Some(Node::Link(_)) | Some(Node::File(_)) => {
                inner.nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(os_error(Errno::EISDIR, path)),
            None => Err(os_error(Errno::ENOENT, path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_gadget_mkdir_materialises_defaults() {
        let fs = MemFs::new("/cfg");
        let g = Path::new("/cfg/usb_gadget/g1");
        fs.make_directory(g).unwrap();

        assert!(fs.is_dir(&g.join("functions")));
        assert!(fs.is_dir(&g.join("configs")));
        assert_eq!(fs.contents(&g.join("UDC")).unwrap(), b"\n");
        assert_eq!(fs.contents(&g.join("os_desc/use")).unwrap(), b"0\n");

        fs.make_directory(&g.join("functions/mass_storage.0")).unwrap();
        assert!(fs.is_dir(&g.join("functions/mass_storage.0/lun.0")));
        assert_eq!(
            fs.contents(&g.join("functions/mass_storage.0/lun.0/removable")).unwrap(),
            b"1\n"
        );

        let err = fs.write_file(&g.join("bogus"), b"1\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_listing_is_reverse_sorted() {
        let fs = MemFs::new("/cfg");
        let g = Path::new("/cfg/usb_gadget/g1");
        fs.make_directory(g).unwrap();
        fs.make_directory(&g.join("functions/acm.GS0")).unwrap();
        fs.make_directory(&g.join("functions/hid.usb0")).unwrap();

        let names: Vec<String> = fs
            .list_directory(&g.join("functions"))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["hid.usb0", "acm.GS0"]);
    }

    #[test]
    fn test_rmdir_semantics() {
        let fs = MemFs::new("/cfg");
        let g = Path::new("/cfg/usb_gadget/g1");
        fs.make_directory(g).unwrap();
        fs.make_directory(&g.join("functions/hid.usb0")).unwrap();
        fs.make_directory(&g.join("configs/c.1")).unwrap();

        let err = fs
            .make_symlink(&g.join("functions/hid.usb9"), &g.join("configs/c.1/x"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        fs.make_symlink(&g.join("functions/hid.usb0"), &g.join("configs/c.1/kbd"))
            .unwrap();

        let err = fs.remove_directory(&g.join("configs/c.1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotEmpty);
        let err = fs.remove_directory(g).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotEmpty);

        fs.remove_file_or_link(&g.join("configs/c.1/kbd")).unwrap();
        fs.remove_directory(&g.join("configs/c.1")).unwrap();
        fs.remove_directory(&g.join("functions/hid.usb0")).unwrap();
        fs.remove_directory(g).unwrap();
        assert_eq!(fs.descendants(Path::new("/cfg/usb_gadget")), 0);
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let fs = MemFs::new("/cfg");
        let g = Path::new("/cfg/usb_gadget/g1");
        fs.fail_next(g, Errno::EACCES);
        let err = fs.make_directory(g).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        fs.make_directory(g).unwrap();
    }
}
