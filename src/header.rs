//! Ethernet/IPv4/TCP/UDP header parsing.
//!
//! The entry point, [`parse_packet`], is infallible: a short or malformed
//! frame never aborts the pipeline, it downgrades to [`ParsedPacket::Unparseable`].
//! Field extraction uses plain `nom` combinators rather than `nom_derive`'s
//! `#[derive(Nom)]`, since header_length and the transport layer both branch
//! on values read earlier in the same buffer.

use std::net::Ipv4Addr;

use nom::IResult;
use nom::bytes::complete::take;
use nom::number::complete::{be_u8, be_u16, be_u32};

use crate::error::ParseError;

const ETHERNET_HEADER_LEN: usize = 14;
const IPV4_MIN_HEADER_LEN: usize = 20;
const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const ETHERTYPE_IPV4: u16 = 0x0800;

/// A fully decoded Ethernet/IPv4(+TCP|UDP) frame, or a sentinel recording
/// only what could be salvaged from a frame that couldn't be decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPacket {
    Transport(TransportPacket),
    Unparseable { packet_length: usize, timestamp: f64 },
}

impl ParsedPacket {
    pub fn packet_length(&self) -> usize {
        match self {
            ParsedPacket::Transport(p) => p.packet_length,
            ParsedPacket::Unparseable { packet_length, .. } => *packet_length,
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            ParsedPacket::Transport(p) => p.timestamp,
            ParsedPacket::Unparseable { timestamp, .. } => *timestamp,
        }
    }
}

/// A decoded IPv4 frame carrying TCP or UDP (or any other IP protocol,
/// with ports left at 0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportPacket {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub packet_length: usize,
    pub header_length: usize,
    pub ttl: u8,
    pub tos: u8,
    pub timestamp: f64,
    pub tcp_seq: u32,
    pub tcp_ack: u32,
    pub tcp_flags: u8,
    pub tcp_window: u16,
}

impl TransportPacket {
    pub fn tcp_flag_fin(&self) -> bool {
        self.tcp_flags & 0x01 != 0
    }
    pub fn tcp_flag_syn(&self) -> bool {
        self.tcp_flags & 0x02 != 0
    }
    pub fn tcp_flag_rst(&self) -> bool {
        self.tcp_flags & 0x04 != 0
    }
    pub fn tcp_flag_psh(&self) -> bool {
        self.tcp_flags & 0x08 != 0
    }
    pub fn tcp_flag_ack(&self) -> bool {
        self.tcp_flags & 0x10 != 0
    }
    pub fn tcp_flag_urg(&self) -> bool {
        self.tcp_flags & 0x20 != 0
    }
}

struct EthernetHeader {
    ethertype: u16,
}

fn parse_ethernet(input: &[u8]) -> IResult<&[u8], EthernetHeader> {
    let (input, _dst_mac) = take(6usize)(input)?;
    let (input, _src_mac) = take(6usize)(input)?;
    let (input, ethertype) = be_u16(input)?;
    Ok((input, EthernetHeader { ethertype }))
}

struct Ipv4Header {
    header_length: usize,
    tos: u8,
    ttl: u8,
    protocol: u8,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
}

fn parse_ipv4(input: &[u8]) -> IResult<&[u8], Ipv4Header> {
    let (input, version_ihl) = be_u8(input)?;
    let (input, tos) = be_u8(input)?;
    let (input, _total_length) = be_u16(input)?;
    let (input, _identification) = be_u16(input)?;
    let (input, _flags_fragment) = be_u16(input)?;
    let (input, ttl) = be_u8(input)?;
    let (input, protocol) = be_u8(input)?;
    let (input, _checksum) = be_u16(input)?;
    let (input, src_octets) = take(4usize)(input)?;
    let (input, dst_octets) = take(4usize)(input)?;

    let ihl = version_ihl & 0x0F;
    let header_length = ihl as usize * 4;
    let src_ip = Ipv4Addr::new(src_octets[0], src_octets[1], src_octets[2], src_octets[3]);
    let dst_ip = Ipv4Addr::new(dst_octets[0], dst_octets[1], dst_octets[2], dst_octets[3]);

    Ok((
        input,
        Ipv4Header {
            header_length,
            tos,
            ttl,
            protocol,
            src_ip,
            dst_ip,
        },
    ))
}

struct TcpHeader {
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    window: u16,
}

fn parse_tcp(input: &[u8]) -> IResult<&[u8], TcpHeader> {
    let (input, src_port) = be_u16(input)?;
    let (input, dst_port) = be_u16(input)?;
    let (input, seq) = be_u32(input)?;
    let (input, ack) = be_u32(input)?;
    let (input, _data_offset_reserved) = be_u8(input)?;
    let (input, flags) = be_u8(input)?;
    let (input, window) = be_u16(input)?;
    Ok((
        input,
        TcpHeader {
            src_port,
            dst_port,
            seq,
            ack,
            flags,
            window,
        },
    ))
}

struct UdpHeader {
    src_port: u16,
    dst_port: u16,
}

fn parse_udp(input: &[u8]) -> IResult<&[u8], UdpHeader> {
    let (input, src_port) = be_u16(input)?;
    let (input, dst_port) = be_u16(input)?;
    let (input, _length) = be_u16(input)?;
    let (input, _checksum) = be_u16(input)?;
    Ok((input, UdpHeader { src_port, dst_port }))
}

/// Decode one captured frame. Never fails: anything that can't be decoded
/// becomes [`ParsedPacket::Unparseable`] carrying only its length and
/// capture timestamp.
pub fn parse_packet(data: &[u8], timestamp: f64) -> ParsedPacket {
    match try_parse_packet(data, timestamp) {
        Ok(packet) => packet,
        Err(_) => ParsedPacket::Unparseable {
            packet_length: data.len(),
            timestamp,
        },
    }
}

fn try_parse_packet(data: &[u8], timestamp: f64) -> Result<ParsedPacket, ParseError> {
    if data.len() < ETHERNET_HEADER_LEN {
        return Err(ParseError::Truncated {
            needed: ETHERNET_HEADER_LEN,
            available: data.len(),
            context: "ethernet header",
        });
    }
    let (rest, eth) = parse_ethernet(data).map_err(|_| ParseError::Truncated {
        needed: ETHERNET_HEADER_LEN,
        available: data.len(),
        context: "ethernet header",
    })?;

    if eth.ethertype != ETHERTYPE_IPV4 {
        return Err(ParseError::UnsupportedEtherType(eth.ethertype));
    }

    if rest.len() < IPV4_MIN_HEADER_LEN {
        return Err(ParseError::Truncated {
            needed: IPV4_MIN_HEADER_LEN,
            available: rest.len(),
            context: "ipv4 header",
        });
    }
    let (after_fixed_ip, ip) = parse_ipv4(rest).map_err(|_| ParseError::Truncated {
        needed: IPV4_MIN_HEADER_LEN,
        available: rest.len(),
        context: "ipv4 header",
    })?;

    let version = {
        // version nibble was consumed inside parse_ipv4; re-read it here
        // from the original slice to validate without re-parsing the rest.
        rest[0] >> 4
    };
    if version != 4 {
        return Err(ParseError::NotIpv4(version));
    }

    // parse_ipv4 always consumes the fixed 20-byte header; if IHL indicated
    // IP options, skip the remainder before the transport layer starts.
    let options_len = ip.header_length.saturating_sub(IPV4_MIN_HEADER_LEN);
    let transport = if after_fixed_ip.len() >= options_len {
        &after_fixed_ip[options_len..]
    } else {
        &after_fixed_ip[after_fixed_ip.len()..]
    };

    let (mut src_port, mut dst_port) = (0u16, 0u16);
    let (mut tcp_seq, mut tcp_ack) = (0u32, 0u32);
    let (mut tcp_flags, mut tcp_window) = (0u8, 0u16);

    match ip.protocol {
        6 => {
            if transport.len() >= TCP_MIN_HEADER_LEN {
                if let Ok((_, tcp)) = parse_tcp(transport) {
                    src_port = tcp.src_port;
                    dst_port = tcp.dst_port;
                    tcp_seq = tcp.seq;
                    tcp_ack = tcp.ack;
                    tcp_flags = tcp.flags;
                    tcp_window = tcp.window;
                }
            }
        }
        17 => {
            if transport.len() >= UDP_HEADER_LEN {
                if let Ok((_, udp)) = parse_udp(transport) {
                    src_port = udp.src_port;
                    dst_port = udp.dst_port;
                }
            }
        }
        _ => {}
    }

    Ok(ParsedPacket::Transport(TransportPacket {
        src_ip: ip.src_ip,
        dst_ip: ip.dst_ip,
        src_port,
        dst_port,
        protocol: ip.protocol,
        packet_length: data.len(),
        header_length: ip.header_length,
        ttl: ip.ttl,
        tos: ip.tos,
        timestamp,
        tcp_seq,
        tcp_ack,
        tcp_flags,
        tcp_window,
    }))
}
