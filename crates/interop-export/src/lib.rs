//! # Interop Export
//!
//! Serializes batches of validated messages for downstream systems.
//!
//! | format   | output                                                     |
//! |----------|------------------------------------------------------------|
//! | `json`   | one pretty-printed JSON array                              |
//! | `ndjson` | one compact JSON object per line, newline-terminated       |
//! | `csv`    | fixed columns, then one `meta_<key>` column per metadata key |
//!
//! Exporters take [`ValidatedMessage`] only, so nothing unvalidated can be
//! written, and they never modify what they are given.

pub mod json;
pub mod ndjson;
pub mod tabular;

pub use ndjson::NdjsonWriter;
pub use tabular::{csv_columns, CSV_FIXED_COLUMNS, CSV_METADATA_PREFIX};

use interop_core::{InteropError, Result, ValidatedMessage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Export targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Ndjson,
    Csv,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [ExportFormat::Json, ExportFormat::Ndjson, ExportFormat::Csv];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Ndjson => "ndjson",
            ExportFormat::Csv => "csv",
        }
    }

    /// MIME type of the serialized output.
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Ndjson => "application/x-ndjson",
            ExportFormat::Csv => "text/csv",
        }
    }

    /// Conventional file extension, without the dot.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = InteropError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "ndjson" | "jsonl" => Ok(ExportFormat::Ndjson),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(InteropError::unsupported_format(s)),
        }
    }
}

/// Serializes a batch into the requested format.
///
/// # Examples
///
/// ```
/// use interop_export::{export, ExportFormat};
///
/// let bytes = export(&[], ExportFormat::Ndjson).unwrap();
/// assert!(bytes.is_empty());
/// ```
pub fn export(messages: &[ValidatedMessage], format: ExportFormat) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    export_to_writer(messages, format, &mut out)?;
    Ok(out)
}

/// Serializes a batch into any writer.
pub fn export_to_writer<W: Write>(
    messages: &[ValidatedMessage],
    format: ExportFormat,
    writer: W,
) -> Result<()> {
    match format {
        ExportFormat::Json => json::write_json(messages, writer),
        ExportFormat::Ndjson => {
            let mut ndjson = NdjsonWriter::new(writer);
            ndjson.write_all(messages)?;
            ndjson.flush()
        }
        ExportFormat::Csv => tabular::write_csv(messages, writer),
    }
}

/// Writes a batch to a file, replacing any existing content.
pub fn export_to_path<P: AsRef<Path>>(
    messages: &[ValidatedMessage],
    format: ExportFormat,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .map_err(|e| InteropError::io(format!("creating {}", path.display()), e))?;
    let mut writer = BufWriter::new(file);
    export_to_writer(messages, format, &mut writer)?;
    writer
        .flush()
        .map_err(|e| InteropError::io(format!("flushing {}", path.display()), e))?;

    info!(
        path = %path.display(),
        format = %format,
        messages = messages.len(),
        "export written"
    );
    Ok(())
}

pub(crate) fn export_error(err: impl fmt::Display) -> InteropError {
    InteropError::Export {
        reason: err.to_string(),
    }
}
