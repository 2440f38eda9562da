//! Capture decoding — from captured link-layer frames to TCP segments.
//!
//! Only what the pipeline needs is decoded: enough of the link, network and
//! transport headers to find the TCP ports and payload. Everything is read
//! at fixed offsets through zerocopy header structs in network byte order.
//!
//! ```text
//!   frame ─► link header ─► IPv4 / IPv6 (+ extension headers) ─► TCP ─► payload
//! ```

use std::time::Duration;

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::stream::{Conversation, Endpoints, Segment};

// ── Link types ────────────────────────────────────────────────────────────────

/// Link-layer header types (pcap DLT values) adbsift can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// BSD loopback: 4-byte address family in host byte order.
    Null,
    Ethernet,
    /// Bare IPv4 or IPv6, version taken from the first nibble.
    Raw,
    /// OpenBSD loopback: 4-byte address family in network byte order.
    Loop,
    LinuxSll,
    Ipv4,
    Ipv6,
    LinuxSll2,
}

impl LinkType {
    pub fn from_dlt(dlt: i32) -> Result<Self, DecodeError> {
        match dlt {
            0 => Ok(LinkType::Null),
            1 => Ok(LinkType::Ethernet),
            101 => Ok(LinkType::Raw),
            108 => Ok(LinkType::Loop),
            113 => Ok(LinkType::LinuxSll),
            228 => Ok(LinkType::Ipv4),
            229 => Ok(LinkType::Ipv6),
            276 => Ok(LinkType::LinuxSll2),
            other => Err(DecodeError::UnsupportedLinkType(other)),
        }
    }

    pub fn dlt(self) -> i32 {
        match self {
            LinkType::Null => 0,
            LinkType::Ethernet => 1,
            LinkType::Raw => 101,
            LinkType::Loop => 108,
            LinkType::LinuxSll => 113,
            LinkType::Ipv4 => 228,
            LinkType::Ipv6 => 229,
            LinkType::LinuxSll2 => 276,
        }
    }
}

/// One captured packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position in the capture, starting at 1.
    pub number: u64,
    /// Capture time since the Unix epoch.
    pub timestamp: Duration,
    pub data: Bytes,
}

// ── Header layouts ────────────────────────────────────────────────────────────

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88A8;

const IPPROTO_HOPOPTS: u8 = 0;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_ROUTING: u8 = 43;
const IPPROTO_FRAGMENT: u8 = 44;
const IPPROTO_DSTOPTS: u8 = 60;

/// Ethernet II header. Wire size: 14 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct EthernetHeader {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub ether_type: U16<BigEndian>,
}

assert_eq_size!(EthernetHeader, [u8; 14]);

/// 802.1Q tag following the outer ether type. Wire size: 4 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct VlanTag {
    pub tci: U16<BigEndian>,
    pub ether_type: U16<BigEndian>,
}

assert_eq_size!(VlanTag, [u8; 4]);

/// Linux cooked capture v1. Wire size: 16 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct SllHeader {
    pub packet_type: U16<BigEndian>,
    pub arphrd_type: U16<BigEndian>,
    pub addr_len: U16<BigEndian>,
    pub addr: [u8; 8],
    pub protocol: U16<BigEndian>,
}

assert_eq_size!(SllHeader, [u8; 16]);

/// Linux cooked capture v2. Wire size: 20 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct Sll2Header {
    pub protocol: U16<BigEndian>,
    pub reserved: U16<BigEndian>,
    pub if_index: U32<BigEndian>,
    pub arphrd_type: U16<BigEndian>,
    pub packet_type: u8,
    pub addr_len: u8,
    pub addr: [u8; 8],
}

assert_eq_size!(Sll2Header, [u8; 20]);

/// IPv4 header without options. Wire size: 20 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct Ipv4Header {
    pub version_ihl: u8,
    pub tos: u8,
    pub total_len: U16<BigEndian>,
    pub id: U16<BigEndian>,
    pub flags_frag_offset: U16<BigEndian>,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: U16<BigEndian>,
    pub src: [u8; 4],
    pub dst: [u8; 4],
}

assert_eq_size!(Ipv4Header, [u8; 20]);

impl Ipv4Header {
    pub fn header_len(&self) -> usize {
        usize::from(self.version_ihl & 0x0f) * 4
    }

    /// More-fragments set or a non-zero fragment offset.
    pub fn is_fragment(&self) -> bool {
        self.flags_frag_offset.get() & 0x3fff != 0
    }
}

/// IPv6 fixed header. Wire size: 40 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct Ipv6Header {
    pub version_class_flow: [u8; 4],
    pub payload_len: U16<BigEndian>,
    pub next_header: u8,
    pub hop_limit: u8,
    pub src: [u8; 16],
    pub dst: [u8; 16],
}

assert_eq_size!(Ipv6Header, [u8; 40]);

/// TCP header without options. Wire size: 20 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct TcpHeader {
    pub src_port: U16<BigEndian>,
    pub dst_port: U16<BigEndian>,
    pub seq: U32<BigEndian>,
    pub ack: U32<BigEndian>,
    /// Data offset in the high nibble.
    pub data_offset: u8,
    pub flags: u8,
    pub window: U16<BigEndian>,
    pub checksum: U16<BigEndian>,
    pub urgent_ptr: U16<BigEndian>,
}

assert_eq_size!(TcpHeader, [u8; 20]);

impl TcpHeader {
    pub fn header_len(&self) -> usize {
        usize::from(self.data_offset >> 4) * 4
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a frame could not be decoded down to its TCP payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported link type {0}")]
    UnsupportedLinkType(i32),

    #[error("{layer} header truncated: need {needed} bytes, have {available}")]
    Truncated {
        layer: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{layer} header is malformed: {reason}")]
    Malformed {
        layer: &'static str,
        reason: &'static str,
    },

    #[error("IP fragments are not reassembled")]
    Fragmented,
}

// ── Decoding ──────────────────────────────────────────────────────────────────

fn header<T: FromBytes>(layer: &'static str, bytes: &[u8]) -> Result<T, DecodeError> {
    T::read_from_prefix(bytes).ok_or(DecodeError::Truncated {
        layer,
        needed: std::mem::size_of::<T>(),
        available: bytes.len(),
    })
}

/// Network-layer protocol found after the link header.
enum Network {
    Ipv4,
    Ipv6,
    /// Anything else (ARP, LLDP, …).
    Other,
}

fn from_ether_type(ether_type: u16) -> Network {
    match ether_type {
        ETHERTYPE_IPV4 => Network::Ipv4,
        ETHERTYPE_IPV6 => Network::Ipv6,
        _ => Network::Other,
    }
}

fn from_version_nibble(bytes: &[u8]) -> Network {
    match bytes.first().map(|b| b >> 4) {
        Some(4) => Network::Ipv4,
        Some(6) => Network::Ipv6,
        _ => Network::Other,
    }
}

fn from_address_family(family: u32) -> Network {
    // AF_INET is 2 everywhere; AF_INET6 differs between BSDs and Linux.
    match family {
        2 => Network::Ipv4,
        10 | 24 | 28 | 30 => Network::Ipv6,
        _ => Network::Other,
    }
}

/// Strip the link header. Returns the network protocol and its bytes.
fn link_payload(link: LinkType, data: &Bytes) -> Result<(Network, Bytes), DecodeError> {
    match link {
        LinkType::Ethernet => {
            let eth: EthernetHeader = header("ethernet", data)?;
            let mut offset = std::mem::size_of::<EthernetHeader>();
            let mut ether_type = eth.ether_type.get();
            while ether_type == ETHERTYPE_VLAN || ether_type == ETHERTYPE_QINQ {
                let tag: VlanTag = header("vlan", &data[offset..])?;
                offset += std::mem::size_of::<VlanTag>();
                ether_type = tag.ether_type.get();
            }
            Ok((from_ether_type(ether_type), data.slice(offset..)))
        }
        LinkType::LinuxSll => {
            let sll: SllHeader = header("sll", data)?;
            let offset = std::mem::size_of::<SllHeader>();
            Ok((from_ether_type(sll.protocol.get()), data.slice(offset..)))
        }
        LinkType::LinuxSll2 => {
            let sll: Sll2Header = header("sll2", data)?;
            let offset = std::mem::size_of::<Sll2Header>();
            Ok((from_ether_type(sll.protocol.get()), data.slice(offset..)))
        }
        LinkType::Null | LinkType::Loop => {
            let family: [u8; 4] = header("loopback", data)?;
            let family = if link == LinkType::Loop {
                u32::from_be_bytes(family)
            } else {
                u32::from_ne_bytes(family)
            };
            Ok((from_address_family(family), data.slice(4..)))
        }
        LinkType::Raw => Ok((from_version_nibble(data), data.clone())),
        LinkType::Ipv4 => Ok((Network::Ipv4, data.clone())),
        LinkType::Ipv6 => Ok((Network::Ipv6, data.clone())),
    }
}

/// Strip the IPv4 header. Returns the transport protocol and its bytes,
/// cut to the datagram's total length so link padding is dropped.
fn ipv4_payload(bytes: &Bytes) -> Result<(u8, Bytes), DecodeError> {
    let ip: Ipv4Header = header("ipv4", bytes)?;
    if ip.version_ihl >> 4 != 4 {
        return Err(DecodeError::Malformed {
            layer: "ipv4",
            reason: "version is not 4",
        });
    }
    if ip.is_fragment() {
        return Err(DecodeError::Fragmented);
    }

    let header_len = ip.header_len();
    let total_len = usize::from(ip.total_len.get());
    if header_len < std::mem::size_of::<Ipv4Header>() || total_len < header_len {
        return Err(DecodeError::Malformed {
            layer: "ipv4",
            reason: "header length out of range",
        });
    }
    if total_len > bytes.len() {
        return Err(DecodeError::Truncated {
            layer: "ipv4",
            needed: total_len,
            available: bytes.len(),
        });
    }
    Ok((ip.protocol, bytes.slice(header_len..total_len)))
}

/// Strip the IPv6 header and any hop-by-hop, routing or destination
/// options headers in front of the transport header.
fn ipv6_payload(bytes: &Bytes) -> Result<(u8, Bytes), DecodeError> {
    let ip: Ipv6Header = header("ipv6", bytes)?;
    if ip.version_class_flow[0] >> 4 != 6 {
        return Err(DecodeError::Malformed {
            layer: "ipv6",
            reason: "version is not 6",
        });
    }

    let fixed = std::mem::size_of::<Ipv6Header>();
    let end = fixed + usize::from(ip.payload_len.get());
    if end > bytes.len() {
        return Err(DecodeError::Truncated {
            layer: "ipv6",
            needed: end,
            available: bytes.len(),
        });
    }

    let mut next = ip.next_header;
    let mut offset = fixed;
    loop {
        match next {
            IPPROTO_HOPOPTS | IPPROTO_ROUTING | IPPROTO_DSTOPTS => {
                let ext: [u8; 2] = header("ipv6 extension", &bytes[offset..end])?;
                let len = (usize::from(ext[1]) + 1) * 8;
                if offset + len > end {
                    return Err(DecodeError::Truncated {
                        layer: "ipv6 extension",
                        needed: len,
                        available: end - offset,
                    });
                }
                next = ext[0];
                offset += len;
            }
            IPPROTO_FRAGMENT => return Err(DecodeError::Fragmented),
            _ => return Ok((next, bytes.slice(offset..end))),
        }
    }
}

/// Split a TCP segment into ports and payload.
fn tcp_segment(bytes: &Bytes) -> Result<Segment, DecodeError> {
    let tcp: TcpHeader = header("tcp", bytes)?;
    let header_len = tcp.header_len();
    if header_len < std::mem::size_of::<TcpHeader>() {
        return Err(DecodeError::Malformed {
            layer: "tcp",
            reason: "data offset below 5",
        });
    }
    if header_len > bytes.len() {
        return Err(DecodeError::Truncated {
            layer: "tcp",
            needed: header_len,
            available: bytes.len(),
        });
    }
    Ok(Segment {
        endpoints: Endpoints::new(tcp.src_port.get(), tcp.dst_port.get()),
        payload: bytes.slice(header_len..),
    })
}

/// Decode `frame` down to its TCP segment.
///
/// `Ok(None)` means the frame is fine but carries no TCP. The returned
/// payload may be empty (pure ACKs, SYNs).
pub fn decode_frame(link: LinkType, frame: &Frame) -> Result<Option<Segment>, DecodeError> {
    let (network, bytes) = link_payload(link, &frame.data)?;
    let (protocol, transport) = match network {
        Network::Ipv4 => ipv4_payload(&bytes)?,
        Network::Ipv6 => ipv6_payload(&bytes)?,
        Network::Other => return Ok(None),
    };
    if protocol != IPPROTO_TCP {
        return Ok(None);
    }
    tcp_segment(&transport).map(Some)
}

/// Segments of `conversation` with a non-empty payload, in capture order.
///
/// Frames that fail to decode are logged and skipped.
pub fn segments<I>(
    link: LinkType,
    frames: I,
    conversation: Conversation,
) -> impl Iterator<Item = Segment>
where
    I: IntoIterator<Item = Frame>,
{
    frames.into_iter().filter_map(move |frame| {
        match decode_frame(link, &frame) {
            Ok(Some(segment))
                if conversation.matches(segment.endpoints) && !segment.payload.is_empty() =>
            {
                Some(segment)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::trace!(frame = frame.number, error = %e, "frame skipped");
                None
            }
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
