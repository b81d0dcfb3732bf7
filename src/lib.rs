//! usbgx - USB gadget management over Linux configfs
//!
//! Loads the gadgets under `<configfs>/usb_gadget` into an in-memory tree,
//! and creates, edits, binds, enables and removes them while keeping the
//! tree and the kernel's directory structure in step.

pub mod config;
pub mod error;
pub mod gadget;

pub use config::{GadgetScheme, StateOptions};
pub use error::{Error, ErrorKind, Result};
pub use gadget::State;
