//! USB gadget configfs management
//!
//! Keeps an in-memory model of every USB gadget under a configfs mount and
//! applies changes to both the model and the kernel's directory tree.
//!
//! Architecture:
//! ```text
//! State (root, owns the tree)
//!     ├── loader (configfs -> tree, on init and reload)
//!     ├── manager (create / remove / enable / disable)
//!     ├── accessors (typed get / set of attributes and strings)
//!     │       └── attrs + codec (attribute files and their encodings)
//!     ├── path (entity identity -> configfs path)
//!     └── ConfigFs (filesystem seam, HostFs in production)
//!
//! Gadget
//!     ├── Function (type.instance)
//!     └── Config (label.id)
//!             └── Binding (symlink -> Function of the same Gadget)
//! ```
//!
//! On disk:
//! ```text
//! <configfs>/usb_gadget/<gadget>/
//!     UDC, idVendor, ...               descriptors, "0x%x\n"
//!     strings/0x409/{manufacturer,product,serialnumber}
//!     functions/<type>.<instance>/
//!     configs/<label>.<id>/{MaxPower,bmAttributes,<binding> -> function}
//!     os_desc/{use,b_vendor_code,qw_sign,<label>.<id> -> config}
//! ```
//!
//! Operations are synchronous and unsynchronised; serialise access to a
//! [`State`] yourself and call [`State::reload`] when something else may
//! have changed the tree.

mod accessors;
mod attrs;
pub mod codec;
pub mod configfs;
pub mod function;
pub mod hid;
mod loader;
mod manager;
#[cfg(test)]
pub(crate) mod memfs;
pub mod model;
pub mod msd;
pub mod path;
pub mod report_desc;
pub mod types;

pub use codec::MacAddr;
pub use configfs::{ConfigFs, DirEntry, EntryKind, HostFs};
pub use function::{
    FfsAttrs, FunctionAttrs, FunctionType, MidiAttrs, NetAttrs, PhonetAttrs, SerialAttrs,
};
pub use hid::{HidAttrs, HidPreset};
pub use manager::State;
pub use model::{Binding, Config, ConfigId, Function, FunctionId, Gadget};
pub use msd::{LunAttrs, MsdAttrs};
pub use types::{
    ConfigAttrs, GadgetAttr, GadgetAttrs, GadgetStr, GadgetStrings, OsDescs, LANG_US_ENG,
};
