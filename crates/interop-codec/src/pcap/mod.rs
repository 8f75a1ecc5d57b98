//! Application payload extraction from captured frames.
//!
//! A [`Capture`] holds frames read from a pcap/pcapng file (or built in
//! memory); [`Capture::extract`] walks them lazily, recovering the TCP/UDP
//! payload of each frame, identifying it by signature and decoding it.

mod capture;
mod extract;
mod frame;

pub use capture::Capture;
pub use extract::{
    extract_frame, ExtractedMessage, Extraction, ExtractionIssue, ExtractionItem,
    ExtractionReport, IssueKind,
};
pub use frame::{Frame, LinkType};
