use chrono::{TimeZone, Utc};
use interop_core::{CanonicalMessage, MessageType, ValidatedMessage, Validator};
use interop_export::{export, export_to_path, ExportFormat, NdjsonWriter};
use std::fs::OpenOptions;

fn batch() -> Vec<ValidatedMessage> {
    let validator = Validator::with_embedded_schema().unwrap();
    let time = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();

    (0..5)
        .map(|i| {
            let candidate = if i % 2 == 0 {
                CanonicalMessage::new(MessageType::Cot, format!("COT-{i}"), time, 10.0 + i as f64, 20.0)
                    .with_metadata("how", "m-g")
            } else {
                CanonicalMessage::new(MessageType::Vmf, format!("VMF-{i}"), time, -10.0, -20.0 - i as f64)
                    .with_altitude(i as f64 * 10.0)
                    .with_metadata("msg_type", i as i64)
            };
            validator.validate(candidate).unwrap()
        })
        .collect()
}

#[test]
fn test_export_is_deterministic() {
    let messages = batch();
    let before = messages.clone();

    for format in ExportFormat::ALL {
        let first = export(&messages, format).unwrap();
        let second = export(&messages, format).unwrap();
        assert_eq!(first, second, "{format} export differs between runs");
    }
    assert_eq!(messages, before);
}

#[test]
fn test_ndjson_preserves_order() {
    let messages = batch();
    let bytes = export(&messages, ExportFormat::Ndjson).unwrap();
    let text = String::from_utf8(bytes).unwrap();

    let uids: Vec<String> = text
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["uid"].as_str().unwrap().to_string()
        })
        .collect();
    let expected: Vec<String> = messages.iter().map(|m| m.uid.clone()).collect();
    assert_eq!(uids, expected);
}

#[test]
fn test_json_matches_ndjson() {
    let messages = batch();

    let array: Vec<serde_json::Value> =
        serde_json::from_slice(&export(&messages, ExportFormat::Json).unwrap()).unwrap();
    let lines: Vec<serde_json::Value> =
        String::from_utf8(export(&messages, ExportFormat::Ndjson).unwrap())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

    assert_eq!(array, lines);
}

#[test]
fn test_export_to_path() {
    let dir = tempfile::tempdir().unwrap();
    let messages = batch();

    for format in ExportFormat::ALL {
        let path = dir.path().join(format!("out.{}", format.extension()));
        export_to_path(&messages, format, &path).unwrap();
        assert_eq!(
            std::fs::read(&path).unwrap(),
            export(&messages, format).unwrap()
        );
    }
}

#[test]
fn test_ndjson_append_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.ndjson");
    let messages = batch();

    for chunk in messages.chunks(2) {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        let mut writer = NdjsonWriter::new(file);
        writer.write_all(chunk).unwrap();
        writer.flush().unwrap();
    }

    assert_eq!(
        std::fs::read(&path).unwrap(),
        export(&messages, ExportFormat::Ndjson).unwrap()
    );
}

#[test]
fn test_export_to_missing_directory() {
    let err = export_to_path(&batch(), ExportFormat::Json, "/nonexistent/dir/out.json").unwrap_err();
    assert_eq!(err.kind(), "Io");
}
