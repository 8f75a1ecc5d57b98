use interop_core::{CanonicalMessage, DecodeError, InteropError};
use serde::Serialize;
use tracing::{debug, warn};

use super::frame::Frame;
use crate::detect::{detect_signature, SourceFormat};

/// A message recovered from one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedMessage {
    pub frame: usize,
    pub format: SourceFormat,
    pub message: CanonicalMessage,
}

/// Why a frame produced no message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IssueKind {
    /// Nothing recognizable in the frame
    Skipped { reason: String },
    /// Recognized, but the decoder rejected it
    Failed {
        format: SourceFormat,
        error: DecodeError,
    },
}

/// Per-frame outcome that is not a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionIssue {
    pub frame: usize,
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl ExtractionIssue {
    pub fn is_skip(&self) -> bool {
        matches!(self.kind, IssueKind::Skipped { .. })
    }

    pub fn into_error(self) -> InteropError {
        match self.kind {
            IssueKind::Skipped { reason } => InteropError::ExtractionSkipped {
                frame: self.frame,
                reason,
            },
            IssueKind::Failed { error, .. } => InteropError::Decode(error),
        }
    }
}

pub type ExtractionItem = Result<ExtractedMessage, ExtractionIssue>;

/// Lazy pass over captured frames.
///
/// Each frame is decoded on its own; a failure is yielded as an item and the
/// pass carries on with the next frame.
#[derive(Debug, Clone)]
pub struct Extraction<'a> {
    frames: std::slice::Iter<'a, Frame>,
}

impl<'a> Extraction<'a> {
    pub fn new(frames: &'a [Frame]) -> Self {
        Self {
            frames: frames.iter(),
        }
    }
}

impl Iterator for Extraction<'_> {
    type Item = ExtractionItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.frames.next().map(extract_frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.frames.size_hint()
    }
}

impl ExactSizeIterator for Extraction<'_> {}

/// Decodes whatever application payload a single frame carries.
pub fn extract_frame(frame: &Frame) -> ExtractionItem {
    let skip = |reason: String| {
        debug!(frame = frame.index, %reason, "frame skipped");
        ExtractionIssue {
            frame: frame.index,
            kind: IssueKind::Skipped { reason },
        }
    };

    let payload = frame.application_payload().map_err(skip)?;
    let format = detect_signature(payload)
        .ok_or_else(|| skip("no VMF or CoT signature".to_string()))?;

    crate::decode(payload, format)
        .map(|message| ExtractedMessage {
            frame: frame.index,
            format,
            message,
        })
        .map_err(|error| {
            warn!(frame = frame.index, %format, error = %error, "frame failed to decode");
            ExtractionIssue {
                frame: frame.index,
                kind: IssueKind::Failed { format, error },
            }
        })
}

/// Every outcome of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionReport {
    pub messages: Vec<ExtractedMessage>,
    pub issues: Vec<ExtractionIssue>,
    pub frames_seen: usize,
    pub skipped: usize,
}

impl ExtractionReport {
    pub fn failed(&self) -> usize {
        self.issues.len() - self.skipped
    }

    pub fn add(&mut self, item: ExtractionItem) {
        self.frames_seen += 1;
        match item {
            Ok(message) => self.messages.push(message),
            Err(issue) => {
                if issue.is_skip() {
                    self.skipped += 1;
                }
                self.issues.push(issue);
            }
        }
    }
}

impl FromIterator<ExtractionItem> for ExtractionReport {
    fn from_iter<I: IntoIterator<Item = ExtractionItem>>(iter: I) -> Self {
        let mut report = ExtractionReport::default();
        for item in iter {
            report.add(item);
        }
        debug!(
            frames = report.frames_seen,
            messages = report.messages.len(),
            skipped = report.skipped,
            failed = report.failed(),
            "extraction finished"
        );
        report
    }
}
