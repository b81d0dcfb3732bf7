//! Typed access to the attribute files of one configfs directory

use std::fmt;
use std::path::{Path, PathBuf};

use super::codec::{self, Format, MacAddr};
use super::configfs::ConfigFs;
use super::path::checked;
use crate::error::{Error, Result};

/// One configfs directory seen as a set of typed attribute files
pub(crate) struct AttrDir<'a, F: ConfigFs> {
    fs: &'a F,
    dir: PathBuf,
}

impl<'a, F: ConfigFs> AttrDir<'a, F> {
    pub fn new(fs: &'a F, dir: &Path) -> Self {
        Self {
            fs,
            dir: dir.to_path_buf(),
        }
    }

    pub fn fs(&self) -> &'a F {
        self.fs
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Attribute directory of a subdirectory (`lun.1`, `strings/0x409`)
    pub fn child(&self, name: &str) -> Result<AttrDir<'a, F>> {
        Ok(AttrDir {
            fs: self.fs,
            dir: checked(self.dir.join(name))?,
        })
    }

    pub fn path(&self, name: &str) -> Result<PathBuf> {
        checked(self.dir.join(name))
    }

    pub fn read_bytes(&self, name: &str) -> Result<Vec<u8>> {
        self.fs.read_file(&self.path(name)?)
    }

    pub fn read_dec<T: TryFrom<i64>>(&self, name: &str) -> Result<T> {
        let path = self.path(name)?;
        codec::decode_dec(&self.fs.read_file(&path)?).map_err(|e| at(e, &path))
    }

    pub fn read_hex<T: TryFrom<u64>>(&self, name: &str) -> Result<T> {
        let path = self.path(name)?;
        codec::decode_hex(&self.fs.read_file(&path)?).map_err(|e| at(e, &path))
    }

    pub fn read_int<T: TryFrom<i64> + TryFrom<u64>>(
        &self,
        name: &str,
        format: Format,
    ) -> Result<T> {
        match format {
            Format::Decimal => self.read_dec(name),
            Format::Hex => self.read_hex(name),
        }
    }

    pub fn read_bool(&self, name: &str) -> Result<bool> {
        let path = self.path(name)?;
        codec::decode_bool(&self.fs.read_file(&path)?).map_err(|e| at(e, &path))
    }

    pub fn read_string(&self, name: &str) -> Result<String> {
        let path = self.path(name)?;
        codec::decode_string(&self.fs.read_file(&path)?).map_err(|e| at(e, &path))
    }

    /// `None` when the file does not exist
    pub fn read_optional_string(&self, name: &str) -> Result<Option<String>> {
        match self.read_string(name) {
            Ok(value) => Ok(Some(value)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn read_mac(&self, name: &str) -> Result<MacAddr> {
        let path = self.path(name)?;
        codec::decode_mac(&self.fs.read_file(&path)?).map_err(|e| at(e, &path))
    }

    pub fn write_bytes(&self, name: &str, data: &[u8]) -> Result<()> {
        self.fs.write_file(&self.path(name)?, data)
    }

    pub fn write_dec<T: fmt::Display>(&self, name: &str, value: T) -> Result<()> {
        self.write_bytes(name, &codec::encode_dec(value))
    }

    pub fn write_hex<T: fmt::LowerHex>(&self, name: &str, value: T) -> Result<()> {
        self.write_bytes(name, &codec::encode_hex(value))
    }

    pub fn write_int<T: fmt::Display + fmt::LowerHex>(
        &self,
        name: &str,
        value: T,
        format: Format,
    ) -> Result<()> {
        self.write_bytes(name, &codec::encode_int(value, format))
    }

    pub fn write_bool(&self, name: &str, value: bool) -> Result<()> {
        self.write_bytes(name, &codec::encode_bool(value))
    }

    /// USB string descriptor (length limited)
    pub fn write_string(&self, name: &str, value: &str) -> Result<()> {
        let data = codec::encode_string(value).map_err(|e| at(e, &self.dir.join(name)))?;
        self.write_bytes(name, &data)
    }

    /// Free-form text such as a backing file path
    pub fn write_text(&self, name: &str, value: &str) -> Result<()> {
        let data = codec::encode_text(value).map_err(|e| at(e, &self.dir.join(name)))?;
        self.write_bytes(name, &data)
    }

    pub fn write_mac(&self, name: &str, value: &MacAddr) -> Result<()> {
        self.write_bytes(name, &codec::encode_mac(value))
    }
}

/// Attach the file path to a decoding error
fn at(err: Error, path: &Path) -> Error {
    match err {
        Error::InvalidAttributeValue(msg) => {
            Error::InvalidAttributeValue(format!("{}: {}", path.display(), msg))
        }
        other => other,
    }
}
