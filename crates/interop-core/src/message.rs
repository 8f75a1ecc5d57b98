//! Canonical message model shared by every decoder.
//!
//! A [`CanonicalMessage`] is the unvalidated candidate a decoder produces. Only
//! the [`Validator`](crate::validate::Validator) can turn it into a
//! [`ValidatedMessage`], which is the sole type the exporter and the pub/sub
//! channel accept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Format-specific extra fields preserved for traceability.
///
/// A `BTreeMap` keeps key order stable, which makes JSON and CSV output
/// deterministic for the same input.
pub type RawMetadata = BTreeMap<String, MetadataValue>;

/// Source format tag of a canonical message.
///
/// Doubles as the pub/sub topic string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Cursor on Target XML event
    Cot,
    /// Fixed-layout binary positional report
    Vmf,
}

impl MessageType {
    /// All known message types, in topic order.
    pub const ALL: [MessageType; 2] = [MessageType::Cot, MessageType::Vmf];

    /// Wire/topic name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Cot => "cot",
            MessageType::Vmf => "vmf",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cot" => Ok(MessageType::Cot),
            "vmf" => Ok(MessageType::Vmf),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// A single metadata value: text or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Integer(v) => write!(f, "{v}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

/// Normalized message produced by every decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    /// Source format tag
    pub message_type: MessageType,
    /// Identifier unique within its source
    pub uid: String,
    /// Event time in UTC
    pub timestamp: DateTime<Utc>,
    /// Latitude in decimal degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in decimal degrees (-180 to 180)
    pub longitude: f64,
    /// Altitude in meters, when the format carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Format-specific detail
    #[serde(default)]
    pub raw_metadata: RawMetadata,
}

impl CanonicalMessage {
    /// Creates a message with no altitude and empty metadata.
    pub fn new(
        message_type: MessageType,
        uid: impl Into<String>,
        timestamp: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            message_type,
            uid: uid.into(),
            timestamp,
            latitude,
            longitude,
            altitude: None,
            raw_metadata: RawMetadata::new(),
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.raw_metadata.insert(key.into(), value.into());
        self
    }

    /// Pub/sub topic for this message.
    pub fn topic(&self) -> &'static str {
        self.message_type.as_str()
    }
}

/// A canonical message accepted by the schema validator.
///
/// Cannot be built outside this crate except through
/// [`Validator::validate`](crate::validate::Validator::validate); it only
/// hands out shared references, so an accepted message stays immutable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedMessage(CanonicalMessage);

impl ValidatedMessage {
    pub(crate) fn new_unchecked(message: CanonicalMessage) -> Self {
        Self(message)
    }

    pub fn message(&self) -> &CanonicalMessage {
        &self.0
    }

    /// Gives the message back, dropping the validation proof.
    pub fn into_inner(self) -> CanonicalMessage {
        self.0
    }
}

impl Deref for ValidatedMessage {
    type Target = CanonicalMessage;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<CanonicalMessage> for ValidatedMessage {
    fn as_ref(&self) -> &CanonicalMessage {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_message_type_roundtrip() {
        for ty in MessageType::ALL {
            assert_eq!(ty.as_str().parse::<MessageType>().unwrap(), ty);
        }
        assert_eq!("VMF".parse::<MessageType>().unwrap(), MessageType::Vmf);
        assert!("ais".parse::<MessageType>().is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let msg = CanonicalMessage::new(
            MessageType::Vmf,
            "T-123",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            38.8977,
            -77.0365,
        )
        .with_altitude(150.0)
        .with_metadata("msg_type", 7i64);

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["message_type"], "vmf");
        assert_eq!(value["timestamp"], "2024-01-01T00:00:00Z");
        assert_eq!(value["altitude"], 150.0);
        assert_eq!(value["raw_metadata"]["msg_type"], 7);
    }

    #[test]
    fn test_missing_altitude_not_serialized() {
        let msg = CanonicalMessage::new(
            MessageType::Cot,
            "c-1",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            0.0,
            0.0,
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("altitude").is_none());
    }

    #[test]
    fn test_metadata_value_untagged() {
        let parsed: RawMetadata =
            serde_json::from_str(r#"{"a": 1, "b": 2.5, "c": "x"}"#).unwrap();
        assert_eq!(parsed["a"], MetadataValue::Integer(1));
        assert_eq!(parsed["b"], MetadataValue::Float(2.5));
        assert_eq!(parsed["c"], MetadataValue::Text("x".into()));
    }
}
