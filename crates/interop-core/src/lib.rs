//! # Interop Core
//!
//! Canonical message model, error taxonomy, configuration and the schema
//! validation gate shared by every decoder, exporter and stream in the
//! interop workspace.
//!
//! - **Message**: [`CanonicalMessage`] is what decoders produce;
//!   [`ValidatedMessage`] is what leaves the engine.
//! - **Schema**: a closed JSON Schema document loaded once and applied per
//!   message.
//! - **Errors**: one `thiserror` taxonomy, serializable for API responses.
//!
//! ## Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use interop_core::{CanonicalMessage, MessageType, Validator};
//!
//! let validator = Validator::with_embedded_schema().unwrap();
//! let candidate = CanonicalMessage::new(
//!     MessageType::Cot,
//!     "ANDROID-1",
//!     Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
//!     37.7749,
//!     -122.4194,
//! );
//!
//! let accepted = validator.validate(candidate).unwrap();
//! assert_eq!(accepted.uid, "ANDROID-1");
//! ```

pub mod config;
pub mod error;
pub mod message;
pub mod schema;
pub mod validate;

pub use config::AppConfig;
pub use error::{
    ConfigError, Constraint, DecodeError, EncodeError, InteropError, Result, SchemaViolation,
    Violation,
};
pub use message::{CanonicalMessage, MessageType, MetadataValue, RawMetadata, ValidatedMessage};
pub use schema::Schema;
pub use validate::Validator;
