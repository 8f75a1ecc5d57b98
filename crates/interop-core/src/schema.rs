//! Closed JSON Schema model for canonical messages.
//!
//! Only the subset of JSON Schema the canonical schema needs is understood:
//! `type`, `enum`, `const`, `minimum`/`maximum`, `minLength`/`maxLength`,
//! `format: date-time`, `properties`, `required`, `additionalProperties`,
//! `maxProperties`, `propertyNames` and `allOf` with `if`/`then`/`else`.
//! Documents using any other keyword are rejected at load. The model is storage-agnostic: it can come from the embedded document,
//! a file, or any JSON string.

use crate::error::{ConfigError, Constraint, Violation};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Schema document shipped with the crate.
pub const EMBEDDED_SCHEMA: &str = include_str!("../schema/canonical_message.schema.json");

/// JSON value kinds usable in `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl JsonType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            JsonType::Object => value.is_object(),
            JsonType::Array => value.is_array(),
            JsonType::String => value.is_string(),
            JsonType::Number => value.is_number(),
            JsonType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
            }
            JsonType::Boolean => value.is_boolean(),
            JsonType::Null => value.is_null(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Null => "null",
        }
    }
}

/// `type` is either a single kind or a list of kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSet {
    One(JsonType),
    Many(Vec<JsonType>),
}

impl TypeSet {
    fn matches(&self, value: &Value) -> bool {
        match self {
            TypeSet::One(t) => t.matches(value),
            TypeSet::Many(ts) => ts.iter().any(|t| t.matches(value)),
        }
    }

    fn describe(&self) -> String {
        match self {
            TypeSet::One(t) => t.name().to_string(),
            TypeSet::Many(ts) => ts.iter().map(JsonType::name).collect::<Vec<_>>().join(" or "),
        }
    }
}

/// `additionalProperties`: a flat allow/deny or a schema for the extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<SchemaNode>),
}

/// `allOf` entry of the form `{ "if": …, "then": …, "else": … }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditional {
    #[serde(rename = "if")]
    pub condition: SchemaNode,
    #[serde(rename = "then", default, skip_serializing_if = "Option::is_none")]
    pub then: Option<SchemaNode>,
    #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<SchemaNode>,
}

/// One (sub)schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TypeSet>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(rename = "const", default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_properties: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_names: Option<Box<SchemaNode>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<Conditional>,
}

impl SchemaNode {
    /// Appends every constraint `value` breaks to `out`.
    pub fn check(&self, value: &Value, path: &str, out: &mut Vec<Violation>) {
        if let Some(kind) = &self.kind {
            if !kind.matches(value) {
                out.push(violation(
                    path,
                    Constraint::Type,
                    format!("expected {}, found {}", kind.describe(), describe_value(value)),
                ));
                // Keyword checks below assume the declared type.
                return;
            }
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|candidate| json_equal(candidate, value)) {
                out.push(violation(
                    path,
                    Constraint::Enum,
                    format!("{value} is not one of {}", Value::Array(allowed.clone())),
                ));
            }
        }

        if let Some(constant) = &self.constant {
            if !json_equal(constant, value) {
                out.push(violation(
                    path,
                    Constraint::Const,
                    format!("expected {constant}, found {value}"),
                ));
            }
        }

        match value {
            Value::Number(n) => self.check_number(n.as_f64(), path, out),
            Value::String(s) => self.check_string(s, path, out),
            Value::Object(map) => self.check_object(map, path, out),
            _ => {}
        }

        for conditional in &self.all_of {
            if conditional.condition.accepts(value) {
                if let Some(then) = &conditional.then {
                    then.check(value, path, out);
                }
            } else if let Some(otherwise) = &conditional.otherwise {
                otherwise.check(value, path, out);
            }
        }
    }

    /// True if `value` satisfies this node.
    pub fn accepts(&self, value: &Value) -> bool {
        let mut scratch = Vec::new();
        self.check(value, "", &mut scratch);
        scratch.is_empty()
    }

    fn check_number(&self, n: Option<f64>, path: &str, out: &mut Vec<Violation>) {
        let Some(n) = n else { return };
        if let Some(min) = self.minimum {
            if n < min {
                out.push(violation(
                    path,
                    Constraint::Minimum,
                    format!("{n} is less than {min}"),
                ));
            }
        }
        if let Some(max) = self.maximum {
            if n > max {
                out.push(violation(
                    path,
                    Constraint::Maximum,
                    format!("{n} is greater than {max}"),
                ));
            }
        }
    }

    fn check_string(&self, s: &str, path: &str, out: &mut Vec<Violation>) {
        let len = s.chars().count();
        if let Some(min) = self.min_length {
            if len < min {
                out.push(violation(
                    path,
                    Constraint::MinLength,
                    format!("length {len} is shorter than {min}"),
                ));
            }
        }
        if let Some(max) = self.max_length {
            if len > max {
                out.push(violation(
                    path,
                    Constraint::MaxLength,
                    format!("length {len} is longer than {max}"),
                ));
            }
        }
        if self.format.as_deref() == Some("date-time") && DateTime::parse_from_rfc3339(s).is_err() {
            out.push(violation(
                path,
                Constraint::Format,
                format!("{s:?} is not an RFC 3339 date-time"),
            ));
        }
    }

    fn check_object(
        &self,
        map: &serde_json::Map<String, Value>,
        path: &str,
        out: &mut Vec<Violation>,
    ) {
        for name in &self.required {
            if !map.contains_key(name) {
                out.push(violation(
                    &child_path(path, name),
                    Constraint::Required,
                    format!("missing required property '{name}'"),
                ));
            }
        }

        if let Some(max) = self.max_properties {
            if map.len() > max {
                out.push(violation(
                    path,
                    Constraint::MaxProperties,
                    format!("{} properties exceed the limit of {max}", map.len()),
                ));
            }
        }

        for (key, item) in map {
            let item_path = child_path(path, key);

            if let Some(names) = &self.property_names {
                let mut name_violations = Vec::new();
                names.check(&Value::String(key.clone()), &item_path, &mut name_violations);
                out.extend(name_violations.into_iter().map(|mut v| {
                    v.constraint = Constraint::PropertyNames;
                    v.message = format!("property name '{key}': {}", v.message);
                    v
                }));
            }

            if let Some(node) = self.properties.get(key) {
                node.check(item, &item_path, out);
                continue;
            }

            match &self.additional_properties {
                Some(AdditionalProperties::Allowed(false)) => out.push(violation(
                    &item_path,
                    Constraint::AdditionalProperties,
                    format!("unexpected property '{key}'"),
                )),
                Some(AdditionalProperties::Schema(node)) => node.check(item, &item_path, out),
                Some(AdditionalProperties::Allowed(true)) | None => {}
            }
        }
    }
}

/// A loaded canonical schema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    #[serde(rename = "$id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub root: SchemaNode,
}

impl Schema {
    /// Parses the schema shipped with the crate.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json(EMBEDDED_SCHEMA)
    }

    /// Parses a schema document from a JSON string.
    ///
    /// The root must be a closed object schema (`additionalProperties: false`).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let invalid = |e: serde_json::Error| ConfigError::InvalidSchema {
            reason: e.to_string(),
        };
        let document: Value = serde_json::from_str(json).map_err(invalid)?;
        check_keywords(&document, "")?;
        let schema: Schema = serde_json::from_value(document).map_err(invalid)?;
        schema.ensure_closed()?;
        Ok(schema)
    }

    /// Reads and parses a schema document from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&contents)
    }

    /// Validates `value`, returning every violation found.
    pub fn violations(&self, value: &Value) -> Vec<Violation> {
        let mut out = Vec::new();
        self.root.check(value, "", &mut out);
        out
    }

    /// Top-level property names the schema declares.
    pub fn declared_fields(&self) -> impl Iterator<Item = &str> {
        self.root.properties.keys().map(String::as_str)
    }

    fn ensure_closed(&self) -> Result<(), ConfigError> {
        if self.root.kind != Some(TypeSet::One(JsonType::Object)) {
            return Err(ConfigError::InvalidSchema {
                reason: "root schema must have type \"object\"".to_string(),
            });
        }
        if self.root.additional_properties != Some(AdditionalProperties::Allowed(false)) {
            return Err(ConfigError::InvalidSchema {
                reason: "root schema must set additionalProperties to false".to_string(),
            });
        }
        Ok(())
    }
}

/// Keywords a schema node may use.
const NODE_KEYWORDS: &[&str] = &[
    "type",
    "enum",
    "const",
    "minimum",
    "maximum",
    "minLength",
    "maxLength",
    "format",
    "properties",
    "required",
    "additionalProperties",
    "maxProperties",
    "propertyNames",
    "allOf",
];

/// Keywords that carry no constraint.
const ANNOTATION_KEYWORDS: &[&str] = &["$schema", "$id", "$comment", "title", "description"];

const CONDITIONAL_KEYWORDS: &[&str] = &["if", "then", "else"];

/// Rejects keywords the validator would otherwise silently ignore.
fn check_keywords(node: &Value, path: &str) -> Result<(), ConfigError> {
    let Value::Object(map) = node else {
        return Err(unsupported(path, "a schema must be a JSON object".to_string()));
    };

    for (keyword, value) in map {
        let keyword_path = child_path(path, keyword);
        if ANNOTATION_KEYWORDS.contains(&keyword.as_str()) {
            continue;
        }
        if !NODE_KEYWORDS.contains(&keyword.as_str()) {
            return Err(unsupported(&keyword_path, format!("unsupported keyword '{keyword}'")));
        }

        match (keyword.as_str(), value) {
            ("properties", Value::Object(properties)) => {
                for (name, sub) in properties {
                    check_keywords(sub, &child_path(&keyword_path, name))?;
                }
            }
            ("additionalProperties", Value::Object(_)) | ("propertyNames", _) => {
                check_keywords(value, &keyword_path)?;
            }
            ("allOf", Value::Array(entries)) => {
                for (i, entry) in entries.iter().enumerate() {
                    check_conditional(entry, &child_path(&keyword_path, &i.to_string()))?;
                }
            }
            ("format", Value::String(format)) if format != "date-time" => {
                return Err(unsupported(&keyword_path, format!("unsupported format '{format}'")));
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_conditional(entry: &Value, path: &str) -> Result<(), ConfigError> {
    let Value::Object(map) = entry else {
        return Err(unsupported(path, "allOf entries must be objects".to_string()));
    };
    for (keyword, sub) in map {
        let keyword_path = child_path(path, keyword);
        if !CONDITIONAL_KEYWORDS.contains(&keyword.as_str()) {
            return Err(unsupported(
                &keyword_path,
                format!("allOf entries support only if/then/else, found '{keyword}'"),
            ));
        }
        check_keywords(sub, &keyword_path)?;
    }
    Ok(())
}

fn unsupported(path: &str, reason: String) -> ConfigError {
    let at = if path.is_empty() { "/" } else { path };
    ConfigError::InvalidSchema {
        reason: format!("{reason} at {at}"),
    }
}

/// JSON equality with numbers compared by value, so `1` equals `1.0`.
fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

fn violation(path: &str, constraint: Constraint, message: String) -> Violation {
    Violation {
        path: path.to_string(),
        constraint,
        message,
    }
}

/// JSON pointer of `key` under `parent` (RFC 6901 escaping).
fn child_path(parent: &str, key: &str) -> String {
    format!("{parent}/{}", key.replace('~', "~0").replace('/', "~1"))
}

fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
