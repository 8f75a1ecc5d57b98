//! Error types for the interop normalization engine.
//!
//! Every variant is serializable so a REST layer can hand errors back as
//! JSON without re-wrapping them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using InteropError as the error type.
pub type Result<T> = std::result::Result<T, InteropError>;

/// Top-level error type for all engine operations.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum InteropError {
    /// A single message could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A candidate message was rejected by the schema
    #[error("{0}")]
    Schema(#[from] SchemaViolation),

    /// A message cannot be represented in the requested wire format
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Unknown export target or source format; a caller bug, never retried
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// A capture frame carried nothing decodable (non-fatal)
    #[error("Frame {frame} skipped: {reason}")]
    ExtractionSkipped { frame: usize, reason: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Export sink failures
    #[error("Export error: {reason}")]
    Export { reason: String },

    /// Pub/sub channel failures
    #[error("Stream error: {reason}")]
    Stream { reason: String },

    /// I/O errors
    #[error("I/O error while {context}: {reason}")]
    Io { context: String, reason: String },
}

impl InteropError {
    /// Creates an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Wraps an I/O error with a short description of the operation.
    pub fn io(context: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            reason: err.to_string(),
        }
    }

    /// Stable name of the error class, used in per-item reports.
    pub fn kind(&self) -> &'static str {
        match self {
            InteropError::Decode(e) => e.kind(),
            InteropError::Schema(_) => "SchemaViolation",
            InteropError::Encode(_) => "Encode",
            InteropError::UnsupportedFormat { .. } => "UnsupportedFormat",
            InteropError::ExtractionSkipped { .. } => "ExtractionSkipped",
            InteropError::Config(_) => "Config",
            InteropError::Export { .. } => "Export",
            InteropError::Stream { .. } => "Stream",
            InteropError::Io { .. } => "Io",
        }
    }
}

/// Structural failures raised while decoding one message.
///
/// Each variant carries enough context (byte offset, field name, or XML
/// path) to locate the problem in the input.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum DecodeError {
    /// Binary buffer too short, bad magic, or inconsistent length field
    #[error("Malformed binary at offset {offset}: {reason}")]
    MalformedBinary { offset: usize, reason: String },

    /// XML could not be parsed or has the wrong root
    #[error("Malformed XML at byte {position}: {reason}")]
    MalformedXml { position: u64, reason: String },

    /// A required element or attribute is absent
    #[error("Missing required field '{field}' at {path}")]
    MissingField { field: String, path: String },

    /// Coordinate text is not a number or is out of range
    #[error("Invalid coordinate '{field}' ({value:?}): {reason}")]
    InvalidCoordinate {
        field: String,
        value: String,
        reason: String,
    },

    /// Timestamp text is not a valid ISO-8601 instant
    #[error("Invalid timestamp '{field}': {value:?}")]
    InvalidTimestamp { field: String, value: String },
}

impl DecodeError {
    /// Creates a malformed binary error.
    pub fn malformed_binary(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedBinary {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a malformed XML error.
    pub fn malformed_xml(position: u64, reason: impl Into<String>) -> Self {
        Self::MalformedXml {
            position,
            reason: reason.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>, path: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            path: path.into(),
        }
    }

    /// Creates an invalid coordinate error.
    pub fn invalid_coordinate(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidCoordinate {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::MalformedBinary { .. } => "MalformedBinary",
            DecodeError::MalformedXml { .. } => "MalformedXML",
            DecodeError::MissingField { .. } => "MissingField",
            DecodeError::InvalidCoordinate { .. } => "InvalidCoordinate",
            DecodeError::InvalidTimestamp { .. } => "InvalidTimestamp",
        }
    }
}

/// Failure to represent a canonical message in a binary layout.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("Cannot encode '{field}': {reason}")]
pub struct EncodeError {
    pub field: String,
    pub reason: String,
}

impl EncodeError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// The schema keyword a value failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Constraint {
    Required,
    Type,
    Minimum,
    Maximum,
    Enum,
    Const,
    Format,
    MinLength,
    MaxLength,
    MaxProperties,
    PropertyNames,
    AdditionalProperties,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Constraint::Required => "required",
            Constraint::Type => "type",
            Constraint::Minimum => "minimum",
            Constraint::Maximum => "maximum",
            Constraint::Enum => "enum",
            Constraint::Const => "const",
            Constraint::Format => "format",
            Constraint::MinLength => "minLength",
            Constraint::MaxLength => "maxLength",
            Constraint::MaxProperties => "maxProperties",
            Constraint::PropertyNames => "propertyNames",
            Constraint::AdditionalProperties => "additionalProperties",
        };
        f.write_str(name)
    }
}

/// One violated schema constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// JSON pointer of the offending value (`""` for the root)
    pub path: String,
    pub constraint: Constraint,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{} [{}]: {}", path, self.constraint, self.message)
    }
}

/// A candidate message failed schema validation.
///
/// Always carries at least one violation; callers never see a coerced
/// message in its place.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub violations: Vec<Violation>,
}

impl SchemaViolation {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// True if any violation is of the given kind.
    pub fn has(&self, constraint: Constraint) -> bool {
        self.violations.iter().any(|v| v.constraint == constraint)
    }

    /// True if any violation points at `path`.
    pub fn at(&self, path: &str) -> bool {
        self.violations.iter().any(|v| v.path == path)
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema violation: ")?;
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Schema document could not be loaded
    #[error("Invalid schema document: {reason}")]
    InvalidSchema { reason: String },
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
