//! Host options and declarative gadget descriptions

mod options;
mod schema;

pub use options::{StateOptions, CONFIGFS_ENV, UDC_DIR_ENV};
pub use schema::{
    BindingScheme, ConfigScheme, ConfigStringScheme, FunctionScheme, GadgetScheme,
    GadgetStringsScheme,
};
