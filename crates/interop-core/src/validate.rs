//! Schema validation gate for canonical messages.

use crate::error::{ConfigError, Constraint, SchemaViolation, Violation};
use crate::message::{CanonicalMessage, ValidatedMessage};
use crate::schema::Schema;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Checks candidate messages against the canonical schema.
///
/// Validation is pure: the same input always yields the same verdict. The
/// schema can be swapped at runtime with [`Validator::reload`]; in-flight
/// validations keep the schema they started with.
#[derive(Debug)]
pub struct Validator {
    schema: RwLock<Arc<Schema>>,
}

impl Validator {
    /// Creates a validator for the given schema.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: RwLock::new(Arc::new(schema)),
        }
    }

    /// Creates a validator using the schema shipped with the crate.
    pub fn with_embedded_schema() -> Result<Self, ConfigError> {
        Ok(Self::new(Schema::embedded()?))
    }

    /// Replaces the schema used by subsequent validations.
    pub fn reload(&self, schema: Schema) {
        info!(schema_id = ?schema.id, "Reloading canonical schema");
        *self.schema.write() = Arc::new(schema);
    }

    /// Current schema snapshot.
    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema.read())
    }

    /// Validates a candidate message and wraps it on success.
    pub fn validate(&self, message: CanonicalMessage) -> Result<ValidatedMessage, SchemaViolation> {
        self.check(&message)?;
        Ok(ValidatedMessage::new_unchecked(message))
    }

    /// Validates a candidate message without taking ownership.
    pub fn check(&self, message: &CanonicalMessage) -> Result<(), SchemaViolation> {
        let value = match serde_json::to_value(message) {
            Ok(value) => value,
            Err(e) => {
                return Err(SchemaViolation::new(vec![Violation {
                    path: String::new(),
                    constraint: Constraint::Type,
                    message: format!("message is not representable as JSON: {e}"),
                }]))
            }
        };
        self.validate_value(&value)
    }

    /// Validates a pre-validation field mapping, e.g. a JSON body received
    /// by a REST collaborator.
    pub fn validate_value(&self, value: &Value) -> Result<(), SchemaViolation> {
        let schema = self.schema();
        let violations = schema.violations(value);
        if violations.is_empty() {
            Ok(())
        } else {
            debug!(count = violations.len(), "Candidate message rejected by schema");
            Err(SchemaViolation::new(violations))
        }
    }

    /// Parses and validates a JSON mapping in one step.
    pub fn validate_json(&self, value: Value) -> Result<ValidatedMessage, SchemaViolation> {
        self.validate_value(&value)?;
        let message: CanonicalMessage = serde_json::from_value(value).map_err(|e| {
            SchemaViolation::new(vec![Violation {
                path: String::new(),
                constraint: Constraint::Type,
                message: e.to_string(),
            }])
        })?;
        Ok(ValidatedMessage::new_unchecked(message))
    }

    /// Returns true if the message would be accepted.
    pub fn is_valid(&self, message: &CanonicalMessage) -> bool {
        self.check(message).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn validator() -> Validator {
        Validator::with_embedded_schema().unwrap()
    }

    fn vmf_message() -> CanonicalMessage {
        CanonicalMessage::new(
            MessageType::Vmf,
            "T-123",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            38.8977,
            -77.0365,
        )
        .with_altitude(150.0)
        .with_metadata("msg_type", 7i64)
    }

    fn cot_message() -> CanonicalMessage {
        CanonicalMessage::new(
            MessageType::Cot,
            "ANDROID-1",
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            37.7749,
            -122.4194,
        )
        .with_metadata("how", "h-e")
    }

    #[test]
    fn test_valid_messages() {
        let v = validator();
        let accepted = v.validate(vmf_message()).unwrap();
        assert_eq!(accepted.uid, "T-123");
        assert!(v.is_valid(&cot_message()));
    }

    #[test]
    fn test_vmf_requires_altitude() {
        let mut msg = vmf_message();
        msg.altitude = None;
        let err = validator().validate(msg).unwrap_err();
        assert!(err.has(Constraint::Required));
        assert!(err.at("/altitude"));
    }

    #[test]
    fn test_coordinate_bounds() {
        let v = validator();
        for (lat, lon) in [(-90.0, -180.0), (90.0, 180.0), (0.0, 0.0)] {
            let mut msg = cot_message();
            msg.latitude = lat;
            msg.longitude = lon;
            assert!(v.is_valid(&msg), "{lat},{lon} should be accepted");
        }

        for (lat, lon) in [(-90.0001, 0.0), (90.5, 0.0), (0.0, -180.01), (0.0, 181.0)] {
            let mut msg = cot_message();
            msg.latitude = lat;
            msg.longitude = lon;
            let err = v.check(&msg).unwrap_err();
            assert!(err.has(Constraint::Minimum) || err.has(Constraint::Maximum));
        }
    }

    #[test]
    fn test_non_finite_coordinate_rejected() {
        let mut msg = cot_message();
        msg.latitude = f64::NAN;
        let err = validator().check(&msg).unwrap_err();
        assert!(err.at("/latitude"));
        assert!(err.has(Constraint::Type));
    }

    #[test]
    fn test_additional_field_rejected() {
        let mut value = serde_json::to_value(cot_message()).unwrap();
        value["extra_field"] = json!("should_not_be_allowed");
        let err = validator().validate_value(&value).unwrap_err();
        assert!(err.has(Constraint::AdditionalProperties));
        assert!(err.at("/extra_field"));
    }

    #[test]
    fn test_reports_every_violation() {
        let value = json!({
            "message_type": "ais",
            "uid": "",
            "timestamp": "not-a-time",
            "latitude": 120.0,
            "longitude": -200.0,
            "raw_metadata": {}
        });
        let err = validator().validate_value(&value).unwrap_err();
        assert!(err.has(Constraint::Enum));
        assert!(err.has(Constraint::MinLength));
        assert!(err.has(Constraint::Format));
        assert!(err.has(Constraint::Maximum));
        assert!(err.has(Constraint::Minimum));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let v = validator();
        let mut msg = vmf_message();
        msg.latitude = 95.0;
        let first = v.check(&msg).unwrap_err();
        let second = v.check(&msg).unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn test_metadata_bounds() {
        let mut msg = cot_message();
        for i in 0..40 {
            msg.raw_metadata.insert(format!("k{i}"), (i as i64).into());
        }
        let err = validator().check(&msg).unwrap_err();
        assert!(err.has(Constraint::MaxProperties));
    }

    #[test]
    fn test_reload_schema() {
        let v = validator();
        let mut stricter = Schema::embedded().unwrap();
        stricter.root.properties.get_mut("latitude").unwrap().maximum = Some(30.0);
        v.reload(stricter);

        assert!(!v.is_valid(&vmf_message()));
        let mut south = vmf_message();
        south.latitude = 10.0;
        assert!(v.is_valid(&south));
    }

    #[test]
    fn test_validate_json() {
        let value = serde_json::to_value(vmf_message()).unwrap();
        let accepted = validator().validate_json(value).unwrap();
        assert_eq!(accepted.message(), &vmf_message());
    }
}
