//! Sample payload generation for demos and tests.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use interop_codec::vmf::{encode_vmf, MSG_TYPE_KEY};
use interop_core::{CanonicalMessage, MessageType, Result};
use quick_xml::escape::escape;
use uuid::Uuid;

/// Parameters for a generated sample.
#[derive(Debug, Clone)]
pub struct SampleSpec {
    /// Generated when unset
    pub uid: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub msg_type: u16,
    pub callsign: Option<String>,
    /// Current time when unset
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            uid: None,
            latitude: 38.7,
            longitude: -77.2,
            altitude: 0.0,
            msg_type: 42,
            callsign: None,
            timestamp: None,
        }
    }
}

impl SampleSpec {
    fn uid(&self, prefix: &str) -> String {
        self.uid
            .clone()
            .unwrap_or_else(|| format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..12]))
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
            .unwrap_or_else(Utc::now)
            .trunc_subsecs(6)
    }

    /// Candidate message for the VMF encoder.
    pub fn vmf_message(&self) -> CanonicalMessage {
        CanonicalMessage::new(
            MessageType::Vmf,
            self.uid("VMF"),
            self.timestamp(),
            self.latitude,
            self.longitude,
        )
        .with_altitude(self.altitude)
        .with_metadata(MSG_TYPE_KEY, i64::from(self.msg_type))
    }

    /// Encoded VMF buffer.
    pub fn vmf_bytes(&self) -> Result<Vec<u8>> {
        Ok(encode_vmf(&self.vmf_message())?)
    }

    /// CoT event document.
    pub fn cot_xml(&self) -> String {
        let timestamp = self.timestamp();
        let time = timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        let stale = (timestamp + Duration::minutes(5)).to_rfc3339_opts(SecondsFormat::Millis, true);
        let callsign = self.callsign.as_deref().unwrap_or("SAMPLE");

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<event version="2.0" uid="{uid}" type="a-f-G-U-C" time="{time}" start="{time}" stale="{stale}" how="m-g">
    <point lat="{lat}" lon="{lon}" hae="{hae}" ce="9999999.0" le="9999999.0"/>
    <detail>
        <contact callsign="{callsign}"/>
    </detail>
</event>
"#,
            uid = escape(&self.uid("COT")),
            lat = self.latitude,
            lon = self.longitude,
            hae = self.altitude,
            callsign = escape(callsign),
        )
    }
}
