//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use interop::sample::SampleSpec;
use interop::Engine;

pub fn engine() -> Engine {
    Engine::with_defaults().expect("Failed to build engine with embedded schema")
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// VMF track used by the end-to-end scenario.
pub fn vmf_track() -> SampleSpec {
    SampleSpec {
        uid: Some("T-123".into()),
        latitude: 38.8977,
        longitude: -77.0365,
        altitude: 150.0,
        timestamp: Some(fixed_time()),
        ..Default::default()
    }
}

pub fn cot_track(uid: &str) -> SampleSpec {
    SampleSpec {
        uid: Some(uid.into()),
        latitude: 37.7749,
        longitude: -122.4194,
        altitude: 100.0,
        callsign: Some("Alpha-1".into()),
        timestamp: Some(fixed_time()),
        ..Default::default()
    }
}

pub const COT_WITHOUT_POINT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<event version="2.0" uid="NO-POINT" type="a-f-G" time="2024-01-01T00:00:00Z">
    <detail>
        <contact callsign="Lost"/>
    </detail>
</event>"#;

/// A tighter schema: latitude limited to the northern hemisphere.
pub fn northern_schema() -> interop::Schema {
    let embedded = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/crates/interop-core/schema/canonical_message.schema.json"
    ));
    let mut doc: serde_json::Value = serde_json::from_str(embedded).unwrap();
    doc["properties"]["latitude"]["minimum"] = serde_json::json!(0);
    interop::Schema::from_json(&doc.to_string()).unwrap()
}
