use std::fmt;
use std::str::FromStr;

use crate::error::{FrameError, Result};

/// A radio device address (EUI-64).
///
/// Accepts hex digits with optional `:` or `-` separators. Displays in the
/// normalized form (16 lowercase hex digits); [`Eui64::dashed`] renders the
/// form used in downlink topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Eui64([u8; 8]);

impl Eui64 {
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Parse an address, ignoring `:` and `-` separators.
    pub fn parse(s: &str) -> Result<Self> {
        let digits: Vec<u8> = s.bytes().filter(|b| *b != b':' && *b != b'-').collect();
        if digits.len() != 16 {
            return Err(FrameError::InvalidAddress(s.to_string()));
        }

        let mut bytes = [0u8; 8];
        for (byte, pair) in bytes.iter_mut().zip(digits.chunks_exact(2)) {
            let hi = hex_value(pair[0]).ok_or_else(|| FrameError::InvalidAddress(s.to_string()))?;
            let lo = hex_value(pair[1]).ok_or_else(|| FrameError::InvalidAddress(s.to_string()))?;
            *byte = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }

    /// Dash-separated byte pairs, e.g. `00-11-22-33-44-55-66-77`.
    pub fn dashed(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for Eui64 {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
