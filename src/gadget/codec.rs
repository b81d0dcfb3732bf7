//! Textual encodings used by configfs attribute files
//!
//! - `DECIMAL`: `"%d\n"`
//! - `HEX`: `"0x%x\n"` (lowercase on write, prefix case-insensitive on read)
//! - MAC address: six colon-separated hex octets
//! - strings: text plus a trailing newline
//!
//! Decoders accept and drop exactly one trailing newline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Longest string accepted for a USB string descriptor
pub const MAX_STRING_LENGTH: usize = 126;

/// Numeric attribute encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Decimal,
    Hex,
}

fn strip_newline(raw: &str) -> &str {
    raw.strip_suffix('\n').unwrap_or(raw)
}

fn utf8(raw: &[u8]) -> Result<&str> {
    std::str::from_utf8(raw)
        .map_err(|e| Error::InvalidAttributeValue(format!("not valid UTF-8: {}", e)))
}

pub fn encode_dec<T: fmt::Display>(value: T) -> Vec<u8> {
    format!("{}\n", value).into_bytes()
}

pub fn encode_hex<T: fmt::LowerHex>(value: T) -> Vec<u8> {
    format!("0x{:x}\n", value).into_bytes()
}

pub fn encode_int<T: fmt::Display + fmt::LowerHex>(value: T, format: Format) -> Vec<u8> {
    match format {
        Format::Decimal => encode_dec(value),
        Format::Hex => encode_hex(value),
    }
}

pub fn decode_dec<T: TryFrom<i64>>(raw: &[u8]) -> Result<T> {
    let text = strip_newline(utf8(raw)?);
    let value: i64 = text
        .parse()
        .map_err(|_| Error::InvalidAttributeValue(format!("{:?} is not a decimal number", text)))?;
    T::try_from(value)
        .map_err(|_| Error::InvalidAttributeValue(format!("{} is out of range", value)))
}

pub fn decode_hex<T: TryFrom<u64>>(raw: &[u8]) -> Result<T> {
    let text = strip_newline(utf8(raw)?);
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_hexdigit()))
        .ok_or_else(|| {
            Error::InvalidAttributeValue(format!("{:?} is not a 0x-prefixed hex number", text))
        })?;
    let value = u64::from_str_radix(digits, 16)
        .map_err(|_| Error::InvalidAttributeValue(format!("{:?} is out of range", text)))?;
    T::try_from(value)
        .map_err(|_| Error::InvalidAttributeValue(format!("{:#x} is out of range", value)))
}

pub fn decode_int<T: TryFrom<i64> + TryFrom<u64>>(raw: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Decimal => decode_dec(raw),
        Format::Hex => decode_hex(raw),
    }
}

pub fn encode_bool(value: bool) -> Vec<u8> {
    encode_dec(u8::from(value))
}

pub fn decode_bool(raw: &[u8]) -> Result<bool> {
    match strip_newline(utf8(raw)?) {
        "1" | "Y" | "y" => Ok(true),
        "0" | "N" | "n" => Ok(false),
        other => Err(Error::InvalidAttributeValue(format!(
            "{:?} is not a boolean",
            other
        ))),
    }
}

pub fn encode_string(value: &str) -> Result<Vec<u8>> {
    if value.chars().count() > MAX_STRING_LENGTH {
        return Err(Error::InvalidAttributeValue(format!(
            "string longer than {} characters",
            MAX_STRING_LENGTH
        )));
    }
    encode_text(value)
}

/// Newline-terminated text without the USB string length limit (file paths, ids)
pub fn encode_text(value: &str) -> Result<Vec<u8>> {
    if value.contains('\n') {
        return Err(Error::InvalidAttributeValue(
            "value must not contain a newline".to_string(),
        ));
    }
    let mut out = Vec::with_capacity(value.len() + 1);
    out.extend_from_slice(value.as_bytes());
    out.push(b'\n');
    Ok(out)
}

pub fn decode_string(raw: &[u8]) -> Result<String> {
    Ok(strip_newline(utf8(raw)?).to_string())
}

/// Ethernet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidAttributeValue(format!("{:?} is not a MAC address", s));
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(MacAddr(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

pub fn encode_mac(value: &MacAddr) -> Vec<u8> {
    format!("{}\n", value).into_bytes()
}

pub fn decode_mac(raw: &[u8]) -> Result<MacAddr> {
    strip_newline(utf8(raw)?).parse()
}
