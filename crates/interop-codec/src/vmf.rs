//! Binary positional report ("VMF") codec.
//!
//! # Wire layout
//!
//! All multi-byte fields are little-endian.
//!
//! | offset | width | field        | encoding                                            |
//! |-------:|------:|--------------|-----------------------------------------------------|
//! | 0      | 4     | magic        | ASCII `VMF1`                                        |
//! | 4      | 2     | msg_type     | `u16`, stored as `raw_metadata.msg_type`            |
//! | 6      | 1     | flags        | bit 0: altitude present; bits 1-7 must be zero      |
//! | 7      | 1     | reserved     | must be zero                                        |
//! | 8      | 2     | total_length | `u16`, length of the whole buffer incl. padding     |
//! | 10     | 32    | uid          | UTF-8, NUL-padded on the right, non-empty           |
//! | 42     | 8     | timestamp    | `i64` microseconds since the Unix epoch (UTC)       |
//! | 50     | 8     | latitude     | `f64` IEEE-754 degrees, scale factor 1              |
//! | 58     | 8     | longitude    | `f64` IEEE-754 degrees, scale factor 1              |
//! | 66     | 8     | altitude     | `f64` IEEE-754 meters; all zero when flag bit 0 = 0 |
//!
//! The body is [`VMF_BODY_LEN`] (74) bytes. Bytes after the body are padding
//! and are accepted only when `total_length` equals the buffer length.
//!
//! Every field maps to exactly one bit pattern, so encoding a decoded
//! unpadded buffer reproduces it byte for byte.

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, Timelike, Utc};
use interop_core::{CanonicalMessage, DecodeError, EncodeError, MessageType, MetadataValue};

/// Magic header identifying a VMF buffer.
pub const VMF_MAGIC: &[u8; 4] = b"VMF1";

/// Length of the fixed body in bytes.
pub const VMF_BODY_LEN: usize = 74;

/// Width of the NUL-padded UID field.
pub const VMF_UID_LEN: usize = 32;

/// Metadata key carrying the header type tag.
pub const MSG_TYPE_KEY: &str = "msg_type";

const FLAG_ALTITUDE: u8 = 0x01;

const OFFSET_MSG_TYPE: usize = 4;
const OFFSET_FLAGS: usize = 6;
const OFFSET_RESERVED: usize = 7;
const OFFSET_LENGTH: usize = 8;
const OFFSET_UID: usize = 10;
const OFFSET_TIMESTAMP: usize = 42;
const OFFSET_ALTITUDE: usize = 66;

/// Decodes a VMF buffer into a canonical message.
///
/// Coordinates are taken verbatim; range checks belong to the validator.
pub fn decode_vmf(data: &[u8]) -> Result<CanonicalMessage, DecodeError> {
    if data.len() < VMF_BODY_LEN {
        return Err(DecodeError::malformed_binary(
            data.len(),
            format!(
                "buffer is {} bytes, need at least {}",
                data.len(),
                VMF_BODY_LEN
            ),
        ));
    }

    if &data[..4] != VMF_MAGIC {
        return Err(DecodeError::malformed_binary(
            0,
            format!("bad magic {:02x?}, expected \"VMF1\"", &data[..4]),
        ));
    }

    let mut buf = &data[OFFSET_MSG_TYPE..VMF_BODY_LEN];
    let msg_type = buf.get_u16_le();

    let flags = buf.get_u8();
    if flags & !FLAG_ALTITUDE != 0 {
        return Err(DecodeError::malformed_binary(
            OFFSET_FLAGS,
            format!("unknown flag bits {flags:#04x}"),
        ));
    }

    let reserved = buf.get_u8();
    if reserved != 0 {
        return Err(DecodeError::malformed_binary(
            OFFSET_RESERVED,
            format!("reserved byte is {reserved:#04x}, expected 0"),
        ));
    }

    let total_length = buf.get_u16_le() as usize;
    if total_length != data.len() {
        return Err(DecodeError::malformed_binary(
            OFFSET_LENGTH,
            format!(
                "length field says {} bytes but buffer is {} bytes",
                total_length,
                data.len()
            ),
        ));
    }

    let uid = decode_uid(&buf[..VMF_UID_LEN])?;
    buf.advance(VMF_UID_LEN);

    let micros = buf.get_i64_le();
    let timestamp = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        DecodeError::malformed_binary(
            OFFSET_TIMESTAMP,
            format!("timestamp {micros}us is out of range"),
        )
    })?;

    let latitude = buf.get_f64_le();
    let longitude = buf.get_f64_le();

    let altitude_bits = buf.get_u64_le();
    let altitude = if flags & FLAG_ALTITUDE != 0 {
        Some(f64::from_bits(altitude_bits))
    } else if altitude_bits != 0 {
        return Err(DecodeError::malformed_binary(
            OFFSET_ALTITUDE,
            "altitude bytes set without the altitude flag",
        ));
    } else {
        None
    };

    let mut message = CanonicalMessage::new(MessageType::Vmf, uid, timestamp, latitude, longitude)
        .with_metadata(MSG_TYPE_KEY, i64::from(msg_type));
    message.altitude = altitude;
    Ok(message)
}

fn decode_uid(field: &[u8]) -> Result<String, DecodeError> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    if end == 0 {
        return Err(DecodeError::malformed_binary(OFFSET_UID, "uid is empty"));
    }
    if let Some(stray) = field[end..].iter().position(|&b| b != 0) {
        return Err(DecodeError::malformed_binary(
            OFFSET_UID + end + stray,
            "non-NUL byte in uid padding",
        ));
    }
    std::str::from_utf8(&field[..end])
        .map(str::to_owned)
        .map_err(|e| {
            DecodeError::malformed_binary(OFFSET_UID + e.valid_up_to(), "uid is not valid UTF-8")
        })
}

/// Encodes a canonical message into an unpadded VMF buffer.
pub fn encode_vmf(message: &CanonicalMessage) -> Result<Vec<u8>, EncodeError> {
    encode_vmf_padded(message, 0)
}

/// Encodes a canonical message followed by `padding` zero bytes, with the
/// length field covering the padding.
pub fn encode_vmf_padded(message: &CanonicalMessage, padding: usize) -> Result<Vec<u8>, EncodeError> {
    if message.message_type != MessageType::Vmf {
        return Err(EncodeError::new(
            "message_type",
            format!("expected vmf, found {}", message.message_type),
        ));
    }

    let total_length = VMF_BODY_LEN + padding;
    let total_length_u16 = u16::try_from(total_length).map_err(|_| {
        EncodeError::new("total_length", format!("{total_length} bytes exceeds u16"))
    })?;

    let msg_type = encode_msg_type(message)?;
    let uid = encode_uid(&message.uid)?;
    let micros = encode_timestamp(&message.timestamp)?;

    let mut buf = BytesMut::with_capacity(total_length);
    buf.put_slice(VMF_MAGIC);
    buf.put_u16_le(msg_type);
    buf.put_u8(if message.altitude.is_some() { FLAG_ALTITUDE } else { 0 });
    buf.put_u8(0);
    buf.put_u16_le(total_length_u16);
    buf.put_slice(&uid);
    buf.put_i64_le(micros);
    buf.put_f64_le(message.latitude);
    buf.put_f64_le(message.longitude);
    match message.altitude {
        Some(alt) => buf.put_f64_le(alt),
        None => buf.put_u64_le(0),
    }
    buf.put_bytes(0, padding);

    debug_assert_eq!(buf.len(), total_length);
    Ok(buf.to_vec())
}

fn encode_msg_type(message: &CanonicalMessage) -> Result<u16, EncodeError> {
    if let Some(key) = message.raw_metadata.keys().find(|k| *k != MSG_TYPE_KEY) {
        return Err(EncodeError::new(
            format!("raw_metadata.{key}"),
            "key has no slot in the VMF layout",
        ));
    }

    match message.raw_metadata.get(MSG_TYPE_KEY) {
        Some(MetadataValue::Integer(v)) => u16::try_from(*v).map_err(|_| {
            EncodeError::new("raw_metadata.msg_type", format!("{v} does not fit in u16"))
        }),
        Some(other) => Err(EncodeError::new(
            "raw_metadata.msg_type",
            format!("expected an integer, found {other}"),
        )),
        None => Err(EncodeError::new("raw_metadata.msg_type", "missing")),
    }
}

fn encode_uid(uid: &str) -> Result<[u8; VMF_UID_LEN], EncodeError> {
    let bytes = uid.as_bytes();
    if bytes.is_empty() {
        return Err(EncodeError::new("uid", "empty"));
    }
    if bytes.len() > VMF_UID_LEN {
        return Err(EncodeError::new(
            "uid",
            format!("{} bytes exceeds {}", bytes.len(), VMF_UID_LEN),
        ));
    }
    if bytes.contains(&0) {
        return Err(EncodeError::new("uid", "contains a NUL byte"));
    }
    let mut field = [0u8; VMF_UID_LEN];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

fn encode_timestamp(timestamp: &DateTime<Utc>) -> Result<i64, EncodeError> {
    // chrono keeps a leap second as nanosecond() >= 1_000_000_000
    if timestamp.nanosecond() >= 1_000_000_000 {
        return Err(EncodeError::new("timestamp", "leap seconds cannot be represented"));
    }
    if timestamp.nanosecond() % 1_000 != 0 {
        return Err(EncodeError::new(
            "timestamp",
            "sub-microsecond precision cannot be represented",
        ));
    }
    Ok(timestamp.timestamp_micros())
}
