//! Pretty-printed JSON array export.

use crate::export_error;
use interop_core::{Result, ValidatedMessage};
use std::io::Write;

/// Writes the whole batch as one indented JSON array.
pub fn write_json<W: Write>(messages: &[ValidatedMessage], writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, messages).map_err(export_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use interop_core::{CanonicalMessage, MessageType, Validator};
    use serde_json::{json, Value};

    fn validated() -> ValidatedMessage {
        let candidate = CanonicalMessage::new(
            MessageType::Cot,
            "ANDROID-1",
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            37.7749,
            -122.4194,
        )
        .with_metadata("callsign", "Alpha-1");
        Validator::with_embedded_schema().unwrap().validate(candidate).unwrap()
    }

    #[test]
    fn test_pretty_array() {
        let mut out = Vec::new();
        write_json(&[validated()], &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("[\n  {"));

        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            parsed,
            json!([{
                "message_type": "cot",
                "uid": "ANDROID-1",
                "timestamp": "2024-01-15T10:30:00Z",
                "latitude": 37.7749,
                "longitude": -122.4194,
                "raw_metadata": { "callsign": "Alpha-1" }
            }])
        );
    }
}
