use etherparse::{SlicedPacket, TransportSlice};
use pcap_parser::Linktype;
use serde::{Deserialize, Serialize};

/// How the bytes of a captured frame are framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkType {
    /// Ethernet II frame
    Ethernet,
    /// Bare IPv4 or IPv6 packet
    RawIp,
    /// Already application bytes (no link or transport headers)
    Payload,
    /// Any other capture link type, by its numeric code
    Unsupported(i32),
}

impl From<Linktype> for LinkType {
    fn from(linktype: Linktype) -> Self {
        match linktype {
            Linktype::ETHERNET => LinkType::Ethernet,
            Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => LinkType::RawIp,
            other => LinkType::Unsupported(other.0),
        }
    }
}

/// One captured frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Position in the capture, starting at 0
    pub index: usize,
    /// Capture time in seconds since the Unix epoch
    pub timestamp: Option<f64>,
    pub link: LinkType,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(index: usize, link: LinkType, data: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            timestamp: None,
            link,
            data: data.into(),
        }
    }

    /// A frame whose bytes are the application payload itself.
    pub fn payload(index: usize, data: impl Into<Vec<u8>>) -> Self {
        Self::new(index, LinkType::Payload, data)
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Returns the TCP or UDP application bytes carried by this frame.
    ///
    /// The error string says why there is nothing to decode; callers treat
    /// it as a skip, not a failure.
    pub fn application_payload(&self) -> Result<&[u8], String> {
        let sliced = match self.link {
            LinkType::Payload => return non_empty(&self.data),
            LinkType::Ethernet => {
                SlicedPacket::from_ethernet(&self.data).map_err(|e| format!("unparseable frame: {e}"))?
            }
            LinkType::RawIp => {
                SlicedPacket::from_ip(&self.data).map_err(|e| format!("unparseable packet: {e}"))?
            }
            LinkType::Unsupported(code) => return Err(format!("unsupported link type {code}")),
        };

        let payload = match sliced.transport {
            Some(TransportSlice::Udp(udp)) => udp.payload(),
            Some(TransportSlice::Tcp(tcp)) => tcp.payload(),
            Some(_) => return Err("not a TCP or UDP packet".to_string()),
            None => return Err("no transport layer".to_string()),
        };
        non_empty(payload)
    }
}

fn non_empty(payload: &[u8]) -> Result<&[u8], String> {
    if payload.is_empty() {
        Err("empty payload".to_string())
    } else {
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    fn udp_frame(payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(4242, 6969);
        let mut packet = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut packet, payload).unwrap();
        packet
    }

    #[test]
    fn test_udp_payload() {
        let frame = Frame::new(0, LinkType::Ethernet, udp_frame(b"<event/>"));
        assert_eq!(frame.application_payload().unwrap(), b"<event/>");
    }

    #[test]
    fn test_tcp_payload_over_raw_ip() {
        let builder = PacketBuilder::ipv4([192, 168, 1, 1], [192, 168, 1, 2], 64)
            .tcp(4242, 8087, 1, 65535);
        let mut packet = Vec::new();
        builder.write(&mut packet, b"VMF1").unwrap();

        let frame = Frame::new(3, LinkType::RawIp, packet);
        assert_eq!(frame.application_payload().unwrap(), b"VMF1");
    }

    #[test]
    fn test_nothing_to_extract() {
        let empty_udp = Frame::new(0, LinkType::Ethernet, udp_frame(b""));
        assert!(empty_udp.application_payload().is_err());

        let garbage = Frame::new(1, LinkType::Ethernet, vec![0u8; 6]);
        assert!(garbage.application_payload().is_err());

        let unsupported = Frame::new(2, LinkType::Unsupported(147), vec![1, 2, 3]);
        assert_eq!(
            unsupported.application_payload().unwrap_err(),
            "unsupported link type 147"
        );
    }

    #[test]
    fn test_link_type_mapping() {
        assert_eq!(LinkType::from(Linktype::ETHERNET), LinkType::Ethernet);
        assert_eq!(LinkType::from(Linktype::RAW), LinkType::RawIp);
        assert_eq!(LinkType::from(Linktype(147)), LinkType::Unsupported(147));
    }
}
