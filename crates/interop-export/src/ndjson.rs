//! Newline-delimited JSON export.

use crate::export_error;
use interop_core::{InteropError, Result, ValidatedMessage};
use std::io::Write;

/// Streams validated messages as compact JSON, one per line.
///
/// Lines are written in call order and every line ends with `\n`, so
/// output from several writers over the same file can be concatenated.
#[derive(Debug)]
pub struct NdjsonWriter<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn write(&mut self, message: &ValidatedMessage) -> Result<()> {
        serde_json::to_writer(&mut self.writer, message).map_err(export_error)?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| InteropError::io("writing NDJSON line", e))?;
        self.written += 1;
        Ok(())
    }

    pub fn write_all<'a, I>(&mut self, messages: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a ValidatedMessage>,
    {
        for message in messages {
            self.write(message)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| InteropError::io("flushing NDJSON output", e))
    }

    /// Number of lines written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use interop_core::{CanonicalMessage, MessageType, Validator};

    fn validated(uid: &str) -> ValidatedMessage {
        let candidate = CanonicalMessage::new(
            MessageType::Vmf,
            uid,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            10.0,
            20.0,
        )
        .with_altitude(5.0)
        .with_metadata("msg_type", 1i64);
        Validator::with_embedded_schema().unwrap().validate(candidate).unwrap()
    }

    #[test]
    fn test_one_line_per_message() {
        let mut writer = NdjsonWriter::new(Vec::new());
        writer.write_all(&[validated("a"), validated("b")]).unwrap();
        assert_eq!(writer.written(), 2);

        let text = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(text.ends_with('\n'));
        assert!(lines[0].contains(r#""uid":"a""#));
        assert!(lines[1].contains(r#""uid":"b""#));
        assert!(!lines[0].contains('\n'));
    }

    #[test]
    fn test_append_across_writers() {
        let mut first = NdjsonWriter::new(Vec::new());
        first.write(&validated("a")).unwrap();
        let mut buffer = first.into_inner();

        let mut second = NdjsonWriter::new(&mut buffer);
        second.write(&validated("b")).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
