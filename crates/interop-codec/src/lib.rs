//! # Interop Codec
//!
//! Decoders that turn wire payloads into candidate canonical messages:
//!
//! - **VMF**: fixed little-endian binary frames ([`vmf`])
//! - **CoT**: Cursor on Target XML events ([`cot`])
//! - **PCAP**: payload recovery from captured frames ([`pcap`])
//!
//! Decoders only check structure. Range and well-formedness rules belong to
//! the schema validator in `interop-core`.
//!
//! ## Example
//!
//! ```
//! use interop_codec::{decode, SourceFormat};
//!
//! let xml = br#"<event uid="A-1" type="a-f-G" time="2024-01-15T10:30:00Z">
//!     <point lat="37.7749" lon="-122.4194"/>
//! </event>"#;
//!
//! let message = decode(xml, SourceFormat::Cot).unwrap();
//! assert_eq!(message.uid, "A-1");
//! ```

pub mod cot;
pub mod detect;
pub mod pcap;
pub mod vmf;

pub use cot::{decode_cot, decode_cot_bytes};
pub use detect::{detect_signature, SourceFormat};
pub use pcap::{Capture, Frame, LinkType};
pub use vmf::{decode_vmf, encode_vmf};

use interop_core::{CanonicalMessage, DecodeError};

/// Decodes one payload in the given format.
pub fn decode(bytes: &[u8], format: SourceFormat) -> Result<CanonicalMessage, DecodeError> {
    match format {
        SourceFormat::Vmf => decode_vmf(bytes),
        SourceFormat::Cot => decode_cot_bytes(bytes),
    }
}

/// Decodes one payload, identifying its format by signature first.
pub fn decode_detected(bytes: &[u8]) -> Result<(SourceFormat, CanonicalMessage), interop_core::InteropError> {
    let format = detect_signature(bytes)
        .ok_or_else(|| interop_core::InteropError::unsupported_format("unrecognized payload signature"))?;
    Ok((format, decode(bytes, format)?))
}
