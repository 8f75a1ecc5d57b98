//! Source format identification.

use crate::vmf::VMF_MAGIC;
use interop_core::InteropError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Wire formats the engine can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// VMF binary frame
    Vmf,
    /// Cursor on Target XML
    Cot,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Vmf => "vmf",
            SourceFormat::Cot => "cot",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceFormat {
    type Err = InteropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vmf" | "binary" => Ok(SourceFormat::Vmf),
            "cot" | "xml" => Ok(SourceFormat::Cot),
            _ => Err(InteropError::unsupported_format(s)),
        }
    }
}

/// Identifies the format of a payload by its leading bytes.
///
/// The binary magic is checked before XML so a payload that could be read
/// either way always resolves to VMF.
pub fn detect_signature(payload: &[u8]) -> Option<SourceFormat> {
    if payload.starts_with(VMF_MAGIC) {
        return Some(SourceFormat::Vmf);
    }

    let text = payload.strip_prefix(UTF8_BOM).unwrap_or(payload);
    let start = text
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(text.len());
    let text = &text[start..];

    if text.starts_with(b"<?xml") || text.starts_with(b"<event") {
        Some(SourceFormat::Cot)
    } else {
        None
    }
}
