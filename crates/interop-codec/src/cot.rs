//! Cursor on Target (CoT) XML decoder.
//!
//! Extraction is driven by [`COT_FIELDS`], a fixed table mapping each
//! canonical field to the element path and attribute it comes from. Nothing
//! outside the table is read; a handful of secondary attributes are kept in
//! `raw_metadata`, everything else is dropped.

use chrono::{DateTime, Utc};
use interop_core::{CanonicalMessage, DecodeError, MessageType, MetadataValue, RawMetadata};
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use tracing::trace;

/// Value CoT producers use for "unknown" height and error estimates.
pub const COT_UNKNOWN: f64 = 9_999_999.0;

/// Where an extracted attribute lands in the canonical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Uid,
    Timestamp,
    Latitude,
    Longitude,
    Altitude,
    /// Text kept verbatim under the given metadata key
    Text(&'static str),
    /// Numeric estimate kept under the given metadata key
    Number(&'static str),
}

/// One entry of the extraction table.
#[derive(Debug, Clone, Copy)]
pub struct FieldPath {
    /// Element path from the root, e.g. `["event", "point"]`
    pub element: &'static [&'static str],
    pub attribute: &'static str,
    pub target: Target,
    pub required: bool,
}

impl FieldPath {
    const fn required(element: &'static [&'static str], attribute: &'static str, target: Target) -> Self {
        Self { element, attribute, target, required: true }
    }

    const fn optional(element: &'static [&'static str], attribute: &'static str, target: Target) -> Self {
        Self { element, attribute, target, required: false }
    }

    /// `/event/point`
    pub fn element_path(&self) -> String {
        format!("/{}", self.element.join("/"))
    }

    /// `/event/point/@lat`
    pub fn attribute_path(&self) -> String {
        format!("{}/@{}", self.element_path(), self.attribute)
    }

    fn name(&self) -> &'static str {
        self.element.last().copied().unwrap_or("event")
    }
}

const EVENT: &[&str] = &["event"];
const POINT: &[&str] = &["event", "point"];
const CONTACT: &[&str] = &["event", "detail", "contact"];
const GROUP: &[&str] = &["event", "detail", "__group"];

/// Fields read from a CoT event, in the order missing ones are reported.
pub const COT_FIELDS: &[FieldPath] = &[
    FieldPath::required(EVENT, "uid", Target::Uid),
    FieldPath::required(EVENT, "time", Target::Timestamp),
    FieldPath::required(EVENT, "type", Target::Text("cot_type")),
    FieldPath::required(POINT, "lat", Target::Latitude),
    FieldPath::required(POINT, "lon", Target::Longitude),
    FieldPath::optional(POINT, "hae", Target::Altitude),
    FieldPath::optional(POINT, "ce", Target::Number("ce")),
    FieldPath::optional(POINT, "le", Target::Number("le")),
    FieldPath::optional(EVENT, "how", Target::Text("how")),
    FieldPath::optional(EVENT, "version", Target::Text("version")),
    FieldPath::optional(EVENT, "start", Target::Text("start")),
    FieldPath::optional(EVENT, "stale", Target::Text("stale")),
    FieldPath::optional(CONTACT, "callsign", Target::Text("callsign")),
    FieldPath::optional(GROUP, "name", Target::Text("group_name")),
    FieldPath::optional(GROUP, "role", Target::Text("group_role")),
];

/// Raw attribute text captured for each table entry, plus which table
/// elements were seen at all.
struct Captured {
    values: Vec<Option<String>>,
    seen: Vec<bool>,
}

impl Captured {
    fn new() -> Self {
        Self {
            values: vec![None; COT_FIELDS.len()],
            seen: vec![false; COT_FIELDS.len()],
        }
    }

    fn visit(&mut self, path: &[Vec<u8>], element: &BytesStart<'_>, position: u64) -> Result<(), DecodeError> {
        let matching: Vec<usize> = COT_FIELDS
            .iter()
            .enumerate()
            .filter(|(_, f)| path_matches(f.element, path))
            .map(|(i, _)| i)
            .collect();
        if matching.is_empty() {
            return Ok(());
        }

        for &i in &matching {
            self.seen[i] = true;
        }

        for attr in element.attributes() {
            let attr = attr.map_err(|e| DecodeError::malformed_xml(position, e.to_string()))?;
            let key = attr.key.as_ref();
            for &i in &matching {
                // First occurrence wins for repeated elements.
                if COT_FIELDS[i].attribute.as_bytes() == key && self.values[i].is_none() {
                    let value = attr
                        .unescape_value()
                        .map_err(|e| DecodeError::malformed_xml(position, e.to_string()))?;
                    self.values[i] = Some(value.into_owned());
                }
            }
        }
        Ok(())
    }
}

fn path_matches(expected: &[&str], actual: &[Vec<u8>]) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(e, a)| e.as_bytes() == a.as_slice())
}

/// Decodes a CoT XML document from a string.
pub fn decode_cot(xml: &str) -> Result<CanonicalMessage, DecodeError> {
    decode_cot_bytes(xml.as_bytes())
}

/// Decodes a CoT XML document.
pub fn decode_cot_bytes(xml: &[u8]) -> Result<CanonicalMessage, DecodeError> {
    let captured = scan(xml)?;
    build(captured)
}

fn scan(xml: &[u8]) -> Result<Captured, DecodeError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut root_closed = false;
    let mut captured = Captured::new();

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| DecodeError::malformed_xml(reader.error_position() as u64, e.to_string()))?;

        match event {
            XmlEvent::Start(e) | XmlEvent::Empty(e) if root_closed => {
                return Err(DecodeError::malformed_xml(
                    position,
                    format!(
                        "element <{}> after the root element",
                        String::from_utf8_lossy(e.name().as_ref())
                    ),
                ));
            }
            XmlEvent::Start(e) => {
                check_root(&stack, &e, position)?;
                stack.push(e.name().as_ref().to_vec());
                captured.visit(&stack, &e, position)?;
            }
            XmlEvent::Empty(e) => {
                check_root(&stack, &e, position)?;
                stack.push(e.name().as_ref().to_vec());
                captured.visit(&stack, &e, position)?;
                stack.pop();
                root_closed = stack.is_empty();
            }
            XmlEvent::End(_) => {
                stack.pop();
                root_closed = stack.is_empty();
            }
            XmlEvent::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(DecodeError::malformed_xml(
            reader.buffer_position() as u64,
            format!(
                "document ended inside <{}>",
                String::from_utf8_lossy(stack.last().map(Vec::as_slice).unwrap_or_default())
            ),
        ));
    }
    if !root_closed {
        return Err(DecodeError::malformed_xml(0, "document has no root element"));
    }

    trace!(fields = captured.values.iter().filter(|v| v.is_some()).count(), "CoT document scanned");
    Ok(captured)
}

fn check_root(stack: &[Vec<u8>], element: &BytesStart<'_>, position: u64) -> Result<(), DecodeError> {
    if stack.is_empty() && element.name().as_ref() != b"event" {
        return Err(DecodeError::malformed_xml(
            position,
            format!(
                "expected <event> root element, found <{}>",
                String::from_utf8_lossy(element.name().as_ref())
            ),
        ));
    }
    Ok(())
}

fn build(captured: Captured) -> Result<CanonicalMessage, DecodeError> {
    for (i, field) in COT_FIELDS.iter().enumerate() {
        if !field.required || captured.values[i].is_some() {
            continue;
        }
        return Err(if captured.seen[i] {
            DecodeError::missing_field(field.attribute, field.attribute_path())
        } else {
            DecodeError::missing_field(field.name(), field.element_path())
        });
    }

    let mut uid = String::new();
    let mut timestamp: Option<DateTime<Utc>> = None;
    let mut latitude = 0.0;
    let mut longitude = 0.0;
    let mut altitude = None;
    let mut raw_metadata = RawMetadata::new();

    for (field, value) in COT_FIELDS.iter().zip(captured.values) {
        let Some(value) = value else { continue };
        match field.target {
            Target::Uid => uid = value,
            Target::Timestamp => timestamp = Some(parse_datetime(field, &value)?),
            Target::Latitude => latitude = parse_coordinate(field, &value, 90.0)?,
            Target::Longitude => longitude = parse_coordinate(field, &value, 180.0)?,
            Target::Altitude => altitude = parse_estimate(field, &value)?,
            Target::Number(key) => {
                if let Some(n) = parse_estimate(field, &value)? {
                    raw_metadata.insert(key.to_string(), MetadataValue::Float(n));
                }
            }
            Target::Text(key) => {
                raw_metadata.insert(key.to_string(), MetadataValue::Text(value));
            }
        }
    }

    let timestamp = timestamp.ok_or_else(|| DecodeError::missing_field("time", "/event/@time"))?;

    Ok(CanonicalMessage {
        message_type: MessageType::Cot,
        uid,
        timestamp,
        latitude,
        longitude,
        altitude,
        raw_metadata,
    })
}

fn parse_datetime(field: &FieldPath, s: &str) -> Result<DateTime<Utc>, DecodeError> {
    s.parse::<DateTime<Utc>>()
        .map_err(|_| DecodeError::InvalidTimestamp {
            field: field.attribute_path(),
            value: s.to_string(),
        })
}

fn parse_number(field: &FieldPath, s: &str) -> Result<f64, DecodeError> {
    let n: f64 = s
        .trim()
        .parse()
        .map_err(|_| DecodeError::invalid_coordinate(field.attribute, s, "not a number"))?;
    if !n.is_finite() {
        return Err(DecodeError::invalid_coordinate(field.attribute, s, "not finite"));
    }
    Ok(n)
}

fn parse_coordinate(field: &FieldPath, s: &str, limit: f64) -> Result<f64, DecodeError> {
    let n = parse_number(field, s)?;
    if !(-limit..=limit).contains(&n) {
        return Err(DecodeError::invalid_coordinate(
            field.attribute,
            s,
            format!("outside [-{limit}, {limit}]"),
        ));
    }
    Ok(n)
}

/// Height or error estimate; the CoT "unknown" marker maps to `None`.
fn parse_estimate(field: &FieldPath, s: &str) -> Result<Option<f64>, DecodeError> {
    let n = parse_number(field, s)?;
    Ok((n != COT_UNKNOWN).then_some(n))
}
