use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use interop_core::{InteropError, Result};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{
    build_ts_resolution, Block, LegacyPcapReader, Linktype, PcapBlockOwned, PcapError, PcapNGReader,
};
use tracing::debug;

use super::extract::{Extraction, ExtractionReport};
use super::frame::{Frame, LinkType};

const READER_BUFFER_SIZE: usize = 65536;
const PCAPNG_MAGIC: [u8; 4] = [0x0A, 0x0D, 0x0D, 0x0A];

/// An ordered, in-memory list of captured frames.
///
/// Extraction borrows the capture, so it can be restarted from the first
/// frame any number of times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capture {
    frames: Vec<Frame>,
}

impl Capture {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Wraps raw application payloads, one frame each.
    pub fn from_payloads<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let frames = payloads
            .into_iter()
            .enumerate()
            .map(|(index, data)| Frame::payload(index, data))
            .collect();
        Self { frames }
    }

    /// Reads a legacy pcap or pcapng file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| InteropError::io(format!("opening {}", path.display()), e))?;
        let capture = Self::from_reader(file)?;
        debug!(path = %path.display(), frames = capture.len(), "capture loaded");
        Ok(capture)
    }

    /// Reads a legacy pcap or pcapng capture held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }

    /// Reads a capture, picking the container by its leading magic.
    ///
    /// The magic is peeked from a buffered reader and left in place, so the
    /// container reader sees the complete file header on its first read.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = BufReader::with_capacity(READER_BUFFER_SIZE, reader);
        let head = reader
            .fill_buf()
            .map_err(|e| InteropError::io("reading capture magic", e))?;
        if head.len() < PCAPNG_MAGIC.len() {
            return Err(pcap_error(
                "reading capture magic",
                format!("only {} bytes of input", head.len()),
            ));
        }

        let is_pcapng = head.starts_with(&PCAPNG_MAGIC);

        let frames = if is_pcapng {
            read_pcapng(reader)?
        } else {
            read_legacy(reader)?
        };
        Ok(Self { frames })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push(&mut self, link: LinkType, data: impl Into<Vec<u8>>) {
        let index = self.frames.len();
        self.frames.push(Frame::new(index, link, data));
    }

    /// Starts a fresh lazy pass over the frames.
    pub fn extract(&self) -> Extraction<'_> {
        Extraction::new(&self.frames)
    }

    /// Runs a full pass and collects every outcome.
    pub fn report(&self) -> ExtractionReport {
        self.extract().collect()
    }
}

fn pcap_error(context: &str, err: impl std::fmt::Display) -> InteropError {
    InteropError::Io {
        context: context.to_string(),
        reason: err.to_string(),
    }
}

fn read_legacy<R: Read>(reader: R) -> Result<Vec<Frame>> {
    let mut reader = LegacyPcapReader::new(READER_BUFFER_SIZE, reader)
        .map_err(|e| pcap_error("pcap reader init", e))?;
    let mut linktype = Linktype::ETHERNET;
    let mut fraction_units = 1e6;
    let mut frames = Vec::new();

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        linktype = header.network;
                        if header.is_nanosecond_precision() {
                            fraction_units = 1e9;
                        }
                    }
                    PcapBlockOwned::Legacy(packet) => {
                        // ts_usec holds nanoseconds in nanosecond-precision files
                        let ts = packet.ts_sec as f64 + (packet.ts_usec as f64 / fraction_units);
                        frames.push(
                            Frame::new(frames.len(), linktype.into(), packet.data.to_vec())
                                .with_timestamp(ts),
                        );
                    }
                    _ => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| pcap_error("pcap reader refill", e))?;
            }
            Err(e) => return Err(pcap_error("pcap reader next", e)),
        }
    }
    Ok(frames)
}

/// Link type and clock of one pcapng interface.
#[derive(Debug, Clone, Copy)]
struct Interface {
    linktype: Linktype,
    /// Timestamp units per second, `None` when `if_tsresol` is out of range
    resolution: Option<u64>,
    offset: i64,
}

impl Interface {
    fn timestamp(&self, ts_high: u32, ts_low: u32) -> Option<f64> {
        let resolution = self.resolution?;
        let ts = ((ts_high as u64) << 32) | (ts_low as u64);
        let seconds = (ts / resolution) as f64;
        let fraction = (ts % resolution) as f64 / resolution as f64;
        Some(self.offset as f64 + seconds + fraction)
    }
}

fn read_pcapng<R: Read>(reader: R) -> Result<Vec<Frame>> {
    let mut reader = PcapNGReader::new(READER_BUFFER_SIZE, reader)
        .map_err(|e| pcap_error("pcapng reader init", e))?;
    let mut interfaces: Vec<Interface> = Vec::new();
    let mut frames = Vec::new();

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::NG(Block::SectionHeader(_)) => interfaces.clear(),
                    PcapBlockOwned::NG(Block::InterfaceDescription(intf)) => {
                        let resolution = build_ts_resolution(intf.if_tsresol);
                        if resolution.is_none() {
                            debug!(
                                if_tsresol = intf.if_tsresol,
                                "unusable interface time resolution"
                            );
                        }
                        interfaces.push(Interface {
                            linktype: intf.linktype,
                            resolution,
                            offset: intf.if_tsoffset,
                        });
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => {
                        let interface = interfaces.get(packet.if_id as usize).copied();
                        let linktype = interface.map_or(Linktype::ETHERNET, |i| i.linktype);
                        let ts = interface
                            .unwrap_or(DEFAULT_INTERFACE)
                            .timestamp(packet.ts_high, packet.ts_low);
                        let mut frame =
                            Frame::new(frames.len(), linktype.into(), packet.data.to_vec());
                        if let Some(ts) = ts {
                            frame = frame.with_timestamp(ts);
                        }
                        frames.push(frame);
                    }
                    PcapBlockOwned::NG(Block::SimplePacket(packet)) => {
                        let linktype = interfaces.first().map_or(Linktype::ETHERNET, |i| i.linktype);
                        frames.push(Frame::new(frames.len(), linktype.into(), packet.data.to_vec()));
                    }
                    _ => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| pcap_error("pcapng reader refill", e))?;
            }
            Err(e) => return Err(pcap_error("pcapng reader next", e)),
        }
    }
    Ok(frames)
}

/// Packets naming an undeclared interface: Ethernet, microsecond clock.
const DEFAULT_INTERFACE: Interface = Interface {
    linktype: Linktype::ETHERNET,
    resolution: Some(1_000_000),
    offset: 0,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MICROSECOND_MAGIC: u32 = 0xA1B2_C3D4;
    const NANOSECOND_MAGIC: u32 = 0xA1B2_3C4D;

    /// Legacy pcap, little-endian, microsecond timestamps.
    fn legacy_pcap(network: u32, packets: &[(u32, &[u8])]) -> Vec<u8> {
        legacy_pcap_with(MICROSECOND_MAGIC, 500_000, network, packets)
    }

    /// Legacy pcap, little-endian; every packet carries `fraction` in its
    /// sub-second field.
    fn legacy_pcap_with(
        magic: u32,
        fraction: u32,
        network: u32,
        packets: &[(u32, &[u8])],
    ) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&magic.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&network.to_le_bytes());
        for (ts_sec, data) in packets {
            out.extend_from_slice(&ts_sec.to_le_bytes());
            out.extend_from_slice(&fraction.to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
        }
        out
    }

    #[test]
    fn test_read_legacy_capture() {
        let bytes = legacy_pcap(1, &[(10, &b"first"[..]), (11, &b"second"[..])]);
        let capture = Capture::from_bytes(&bytes).unwrap();

        assert_eq!(capture.len(), 2);
        let frames = capture.frames();
        assert_eq!(frames[0].index, 0);
        assert_eq!(frames[0].link, LinkType::Ethernet);
        assert_eq!(frames[0].timestamp, Some(10.5));
        assert_eq!(frames[1].data, b"second");
    }

    #[test]
    fn test_read_raw_ip_capture() {
        let bytes = legacy_pcap(101, &[(1, &b"x"[..])]);
        let capture = Capture::from_bytes(&bytes).unwrap();
        assert_eq!(capture.frames()[0].link, LinkType::RawIp);
    }

    #[test]
    fn test_nanosecond_legacy_capture() {
        let bytes = legacy_pcap_with(NANOSECOND_MAGIC, 250_000_000, 1, &[(10, &b"x"[..])]);
        let capture = Capture::from_bytes(&bytes).unwrap();
        assert_eq!(capture.frames()[0].timestamp, Some(10.25));
    }

    #[test]
    fn test_legacy_capture_from_path() {
        let mut header_only = tempfile::NamedTempFile::new().unwrap();
        header_only.write_all(&legacy_pcap(1, &[])).unwrap();
        assert!(Capture::from_path(header_only.path()).unwrap().is_empty());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&legacy_pcap(1, &[(10, &b"first"[..])])).unwrap();
        let capture = Capture::from_path(file.path()).unwrap();
        assert_eq!(capture.len(), 1);
        assert_eq!(capture.frames()[0].data, b"first");
    }

    #[test]
    fn test_not_a_capture() {
        assert!(Capture::from_bytes(b"no").is_err());
        assert!(Capture::from_bytes(b"definitely not a pcap file at all").is_err());
    }

    #[test]
    fn test_from_payloads() {
        let capture = Capture::from_payloads([b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(capture.len(), 2);
        assert_eq!(capture.frames()[1].index, 1);
        assert_eq!(capture.frames()[1].link, LinkType::Payload);
    }
}
