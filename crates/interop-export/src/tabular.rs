//! CSV export.
//!
//! The first six columns are fixed. Metadata keys follow as `meta_<key>`
//! columns, sorted and unioned across the batch; a message without a given
//! key leaves that cell empty, as does a message without altitude.

use crate::export_error;
use chrono::SecondsFormat;
use interop_core::{Result, ValidatedMessage};
use std::collections::BTreeSet;
use std::io::Write;

pub const CSV_FIXED_COLUMNS: [&str; 6] = [
    "message_type",
    "uid",
    "timestamp",
    "latitude",
    "longitude",
    "altitude",
];

pub const CSV_METADATA_PREFIX: &str = "meta_";

/// Metadata keys present anywhere in the batch, in column order.
fn metadata_keys(messages: &[ValidatedMessage]) -> Vec<&str> {
    messages
        .iter()
        .flat_map(|m| m.raw_metadata.keys().map(String::as_str))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Header row for a batch.
pub fn csv_columns(messages: &[ValidatedMessage]) -> Vec<String> {
    CSV_FIXED_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(
            metadata_keys(messages)
                .into_iter()
                .map(|k| format!("{CSV_METADATA_PREFIX}{k}")),
        )
        .collect()
}

pub fn write_csv<W: Write>(messages: &[ValidatedMessage], writer: W) -> Result<()> {
    let keys = metadata_keys(messages);
    let mut csv = csv::Writer::from_writer(writer);

    csv.write_record(csv_columns(messages)).map_err(export_error)?;

    for message in messages {
        let mut record = Vec::with_capacity(CSV_FIXED_COLUMNS.len() + keys.len());
        record.push(message.message_type.to_string());
        record.push(message.uid.clone());
        record.push(message.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        record.push(message.latitude.to_string());
        record.push(message.longitude.to_string());
        record.push(message.altitude.map(|a| a.to_string()).unwrap_or_default());
        for key in &keys {
            record.push(
                message
                    .raw_metadata
                    .get(*key)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        csv.write_record(&record).map_err(export_error)?;
    }

    csv.flush().map_err(export_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use interop_core::{CanonicalMessage, MessageType, Validator};

    fn batch() -> Vec<ValidatedMessage> {
        let validator = Validator::with_embedded_schema().unwrap();
        let time = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();

        let cot = CanonicalMessage::new(MessageType::Cot, "ANDROID-1", time, 37.7749, -122.4194)
            .with_metadata("callsign", "Alpha, 1")
            .with_metadata("cot_type", "a-f-G");
        let vmf = CanonicalMessage::new(MessageType::Vmf, "VMF-1", time, 1.5, 2.5)
            .with_altitude(100.0)
            .with_metadata("msg_type", 3i64);

        vec![
            validator.validate(cot).unwrap(),
            validator.validate(vmf).unwrap(),
        ]
    }

    #[test]
    fn test_columns_sorted_across_batch() {
        assert_eq!(
            csv_columns(&batch()),
            [
                "message_type",
                "uid",
                "timestamp",
                "latitude",
                "longitude",
                "altitude",
                "meta_callsign",
                "meta_cot_type",
                "meta_msg_type",
            ]
        );
    }

    #[test]
    fn test_rows() {
        let mut out = Vec::new();
        write_csv(&batch(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            r#"cot,ANDROID-1,2024-01-15T10:30:00Z,37.7749,-122.4194,,"Alpha, 1",a-f-G,"#
        );
        assert_eq!(lines[2], "vmf,VMF-1,2024-01-15T10:30:00Z,1.5,2.5,100,,,3");
    }
}
