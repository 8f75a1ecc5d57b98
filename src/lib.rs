//! # Interop
//!
//! Tactical message normalization engine. Heterogeneous inputs (VMF binary
//! frames, CoT XML events, payloads recovered from packet captures) are
//! decoded into one canonical message shape, gated by a JSON schema, and
//! then exported in batch or streamed to subscribers.
//!
//! ```text
//! bytes ──decode──▶ CanonicalMessage ──validate──▶ ValidatedMessage ──▶ export
//!                                                                   └──▶ publish
//! ```
//!
//! [`Engine`] wires the member crates together:
//!
//! - `interop-core`: message model, errors, config, schema validator
//! - `interop-codec`: VMF and CoT decoders, PCAP extraction
//! - `interop-export`: JSON, NDJSON and CSV writers
//! - `interop-stream`: topic-filtered pub/sub, in-process and over TCP

pub mod sample;

pub use interop_codec::pcap::{Capture, ExtractionReport, Frame, LinkType};
pub use interop_codec::{detect_signature, SourceFormat};
pub use interop_core::{
    AppConfig, CanonicalMessage, DecodeError, InteropError, MessageType, Result, Schema,
    SchemaViolation, ValidatedMessage, Validator,
};
pub use interop_export::ExportFormat;
pub use interop_stream::{
    CancellationToken, Delivery, PublishSummary, Publisher, Subscription, TopicFilter,
};

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome for one input that did not make it through the pipeline.
#[derive(Debug, Serialize)]
pub struct ItemFailure {
    /// Input position (frame index for captures)
    pub index: usize,
    /// Stable error class name
    pub kind: &'static str,
    pub error: InteropError,
}

impl ItemFailure {
    fn new(index: usize, error: InteropError) -> Self {
        Self {
            index,
            kind: error.kind(),
            error,
        }
    }
}

/// Result of running many inputs through decode and validation.
///
/// One bad input never prevents the others from being processed.
#[derive(Debug, Default, Serialize)]
pub struct BatchOutcome {
    pub accepted: Vec<ValidatedMessage>,
    pub failures: Vec<ItemFailure>,
    /// Capture frames with nothing decodable
    pub skipped: usize,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.accepted.len() + self.failures.len() + self.skipped
    }
}

/// Decode, validate, export and publish behind one handle.
///
/// # Examples
///
/// ```
/// use interop::{Engine, ExportFormat, SourceFormat};
///
/// let engine = Engine::with_defaults().unwrap();
/// let xml = br#"<event uid="A-1" type="a-f-G" time="2024-01-15T10:30:00Z">
///     <point lat="37.7749" lon="-122.4194"/>
/// </event>"#;
///
/// let message = engine.ingest(xml, SourceFormat::Cot).unwrap();
/// let json = engine.export(&[message], ExportFormat::Ndjson).unwrap();
/// assert!(String::from_utf8(json).unwrap().contains("\"uid\":\"A-1\""));
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<AppConfig>,
    validator: Arc<Validator>,
    publisher: Publisher,
}

impl Engine {
    /// Builds an engine from a validated configuration.
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let validator = Arc::new(Validator::new(config.load_schema()?));
        let publisher = Publisher::from_config(Arc::clone(&validator), &config.stream);

        info!(
            app = %config.app.name,
            schema = ?config.schema.path,
            "Engine initialized"
        );
        Ok(Self {
            config: Arc::new(config),
            validator,
            publisher,
        })
    }

    /// Engine with the embedded schema and default settings.
    pub fn with_defaults() -> Result<Self> {
        Self::new(AppConfig::default())
    }

    /// Loads configuration from an optional file plus `INTEROP__*` overrides.
    pub fn from_config_path<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        Self::new(AppConfig::from_config_builder(path)?)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn validator(&self) -> &Arc<Validator> {
        &self.validator
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Swaps the schema used by every later validation.
    pub fn reload_schema(&self, schema: Schema) {
        self.validator.reload(schema);
    }

    /// Decodes one payload into an unvalidated candidate.
    pub fn decode(&self, bytes: &[u8], format: SourceFormat) -> Result<CanonicalMessage> {
        Ok(interop_codec::decode(bytes, format)?)
    }

    /// Decodes one payload whose format is identified by signature.
    pub fn decode_detected(&self, bytes: &[u8]) -> Result<(SourceFormat, CanonicalMessage)> {
        interop_codec::decode_detected(bytes)
    }

    /// Runs a candidate through the schema gate.
    pub fn validate(&self, message: CanonicalMessage) -> Result<ValidatedMessage> {
        Ok(self.validator.validate(message)?)
    }

    /// Decode followed by validate.
    pub fn ingest(&self, bytes: &[u8], format: SourceFormat) -> Result<ValidatedMessage> {
        let candidate = self.decode(bytes, format)?;
        self.validate(candidate)
    }

    /// Ingests many payloads of one format, collecting per-item failures.
    pub fn ingest_batch<'a, I>(&self, payloads: I, format: SourceFormat) -> BatchOutcome
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut outcome = BatchOutcome::default();
        for (index, bytes) in payloads.into_iter().enumerate() {
            match self.ingest(bytes, format) {
                Ok(message) => outcome.accepted.push(message),
                Err(error) => {
                    debug!(index, error = %error, "input rejected");
                    outcome.failures.push(ItemFailure::new(index, error));
                }
            }
        }
        outcome
    }

    /// Raw extraction pass over a capture, before validation.
    pub fn extract(&self, capture: &Capture) -> ExtractionReport {
        capture.report()
    }

    /// Extracts, decodes and validates every frame of a capture.
    pub fn ingest_capture(&self, capture: &Capture) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for item in capture.extract() {
            match item {
                Ok(extracted) => match self.validate(extracted.message) {
                    Ok(message) => outcome.accepted.push(message),
                    Err(error) => outcome.failures.push(ItemFailure::new(extracted.frame, error)),
                },
                Err(issue) if issue.is_skip() => outcome.skipped += 1,
                Err(issue) => {
                    let frame = issue.frame;
                    outcome.failures.push(ItemFailure::new(frame, issue.into_error()));
                }
            }
        }

        info!(
            frames = capture.len(),
            accepted = outcome.accepted.len(),
            failed = outcome.failures.len(),
            skipped = outcome.skipped,
            "Capture ingested"
        );
        outcome
    }

    /// Serializes validated messages.
    pub fn export(&self, messages: &[ValidatedMessage], format: ExportFormat) -> Result<Vec<u8>> {
        interop_export::export(messages, format)
    }

    /// Writes the export to a file, replacing it.
    pub fn export_to_path<P: AsRef<Path>>(
        &self,
        messages: &[ValidatedMessage],
        format: ExportFormat,
        path: P,
    ) -> Result<()> {
        interop_export::export_to_path(messages, format, path)
    }

    /// Export format named by `export.format` in the configuration.
    pub fn default_export_format(&self) -> Result<ExportFormat> {
        self.config.export.format.parse()
    }

    /// Validates and broadcasts a candidate; returns the number of
    /// subscribers reached.
    pub fn publish(&self, message: CanonicalMessage) -> Result<usize> {
        Ok(self.publisher.publish(message)?)
    }

    /// Subscribes to the in-process channel.
    pub fn subscribe(&self, filter: TopicFilter) -> Subscription {
        self.publisher.subscribe(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleSpec;

    #[test]
    fn test_engine_defaults() {
        let engine = Engine::with_defaults().unwrap();
        assert_eq!(engine.default_export_format().unwrap(), ExportFormat::Json);
        assert_eq!(engine.publisher().delivery(), Delivery::AtMostOnce);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = AppConfig::default();
        config.stream.channel_capacity = 0;
        assert!(Engine::new(config).is_err());
    }

    #[test]
    fn test_unsupported_default_export_format() {
        let mut config = AppConfig::default();
        config.export.format = "parquet".into();
        let engine = Engine::new(config).unwrap();
        assert_eq!(
            engine.default_export_format().unwrap_err().kind(),
            "UnsupportedFormat"
        );
    }

    #[test]
    fn test_ingest_batch_partial_failure() {
        let engine = Engine::with_defaults().unwrap();
        let good = SampleSpec::default().vmf_bytes().unwrap();
        let out_of_range = SampleSpec {
            latitude: 95.0,
            ..Default::default()
        }
        .vmf_bytes()
        .unwrap();
        let truncated = good[..20].to_vec();

        let outcome = engine.ingest_batch(
            [good.as_slice(), out_of_range.as_slice(), truncated.as_slice()],
            SourceFormat::Vmf,
        );

        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failures[0].kind, "SchemaViolation");
        assert_eq!(outcome.failures[1].kind, "MalformedBinary");
    }
}
