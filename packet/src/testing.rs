//! Packet builders for tests and benches.
//!
//! Byte-level builders for the packet shapes the filter cares about. Header
//! checksums are left zero; the decoder never verifies them.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::proto::{IPPROTO_FRAGMENT, IPPROTO_ICMP, IPPROTO_ICMPV6, IPPROTO_TCP, IPPROTO_UDP};

/// IPv4 packet builder.
#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    pub ttl: u8,
    pub identification: u16,
    /// Fragment offset in 8-byte units.
    pub fragment_offset: u16,
    pub more_fragments: bool,
    pub options: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Default for Ipv4Builder {
    fn default() -> Self {
        Self {
            src: Ipv4Addr::UNSPECIFIED,
            dst: Ipv4Addr::UNSPECIFIED,
            protocol: IPPROTO_UDP,
            ttl: 64,
            identification: 0,
            fragment_offset: 0,
            more_fragments: false,
            options: Vec::new(),
            payload: Vec::new(),
        }
    }
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_src(mut self, src: Ipv4Addr) -> Self {
        self.src = src;
        self
    }

    pub fn with_dst(mut self, dst: Ipv4Addr) -> Self {
        self.dst = dst;
        self
    }

    pub fn with_protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    /// Options must be a multiple of 4 bytes; they widen the IHL.
    pub fn with_options(mut self, options: Vec<u8>) -> Self {
        debug_assert_eq!(options.len() % 4, 0);
        self.options = options;
        self
    }

    pub fn with_fragment(mut self, offset: u16, more_fragments: bool) -> Self {
        self.fragment_offset = offset;
        self.more_fragments = more_fragments;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let ihl = (20 + self.options.len()) / 4;
        let total_len = (20 + self.options.len() + self.payload.len()) as u16;
        let frag = (self.fragment_offset & 0x1fff) | if self.more_fragments { 0x2000 } else { 0 };

        let mut packet = Vec::with_capacity(total_len as usize);
        packet.push(0x40 | ihl as u8);
        packet.push(0); // TOS
        packet.extend_from_slice(&total_len.to_be_bytes());
        packet.extend_from_slice(&self.identification.to_be_bytes());
        packet.extend_from_slice(&frag.to_be_bytes());
        packet.push(self.ttl);
        packet.push(self.protocol);
        packet.extend_from_slice(&[0, 0]); // checksum
        packet.extend_from_slice(&self.src.octets());
        packet.extend_from_slice(&self.dst.octets());
        packet.extend_from_slice(&self.options);
        packet.extend_from_slice(&self.payload);
        packet
    }
}

/// IPv6 packet builder.
#[derive(Debug, Clone)]
pub struct Ipv6Builder {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub next_header: u8,
    pub hop_limit: u8,
    /// `Some((inner_next_header, offset))` inserts a fragment extension
    /// header; offset is in 8-byte units.
    pub fragment: Option<(u8, u16)>,
    pub payload: Vec<u8>,
}

impl Default for Ipv6Builder {
    fn default() -> Self {
        Self {
            src: Ipv6Addr::UNSPECIFIED,
            dst: Ipv6Addr::UNSPECIFIED,
            next_header: IPPROTO_UDP,
            hop_limit: 64,
            fragment: None,
            payload: Vec::new(),
        }
    }
}

impl Ipv6Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_src(mut self, src: Ipv6Addr) -> Self {
        self.src = src;
        self
    }

    pub fn with_dst(mut self, dst: Ipv6Addr) -> Self {
        self.dst = dst;
        self
    }

    pub fn with_next_header(mut self, next_header: u8) -> Self {
        self.next_header = next_header;
        self
    }

    pub fn with_fragment(mut self, inner_next_header: u8, offset: u16) -> Self {
        self.fragment = Some((inner_next_header, offset));
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut ext = Vec::new();
        let next_header = match self.fragment {
            Some((inner, offset)) => {
                ext.push(inner);
                ext.push(0); // reserved
                ext.extend_from_slice(&(offset << 3).to_be_bytes());
                ext.extend_from_slice(&[0, 0, 0, 0]); // identification
                IPPROTO_FRAGMENT
            }
            None => self.next_header,
        };
        let payload_len = (ext.len() + self.payload.len()) as u16;

        let mut packet = Vec::with_capacity(40 + payload_len as usize);
        packet.extend_from_slice(&[0x60, 0, 0, 0]); // version, tc, flow
        packet.extend_from_slice(&payload_len.to_be_bytes());
        packet.push(next_header);
        packet.push(self.hop_limit);
        packet.extend_from_slice(&self.src.octets());
        packet.extend_from_slice(&self.dst.octets());
        packet.extend_from_slice(&ext);
        packet.extend_from_slice(&self.payload);
        packet
    }
}

/// TCP header builder (20 bytes, no options).
#[derive(Debug, Clone, Default)]
pub struct TcpBuilder {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: u16,
    pub window: u16,
}

impl TcpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn with_dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(20);
        header.extend_from_slice(&self.src_port.to_be_bytes());
        header.extend_from_slice(&self.dst_port.to_be_bytes());
        header.extend_from_slice(&self.seq.to_be_bytes());
        header.extend_from_slice(&self.ack.to_be_bytes());
        header.push(5 << 4); // data offset
        header.push(self.flags as u8);
        header.extend_from_slice(&self.window.to_be_bytes());
        header.extend_from_slice(&[0, 0, 0, 0]); // checksum, urgent
        header
    }
}

/// UDP datagram builder.
#[derive(Debug, Clone, Default)]
pub struct UdpBuilder {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

impl UdpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn with_dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let len = (8 + self.payload.len()) as u16;
        let mut datagram = Vec::with_capacity(len as usize);
        datagram.extend_from_slice(&self.src_port.to_be_bytes());
        datagram.extend_from_slice(&self.dst_port.to_be_bytes());
        datagram.extend_from_slice(&len.to_be_bytes());
        datagram.extend_from_slice(&[0, 0]); // checksum
        datagram.extend_from_slice(&self.payload);
        datagram
    }
}

/// ICMP message builder (8-byte header).
#[derive(Debug, Clone, Default)]
pub struct IcmpBuilder {
    pub icmp_type: u8,
    pub code: u8,
    pub payload: Vec<u8>,
}

/// ICMPv6 shares the header layout.
pub type Icmp6Builder = IcmpBuilder;

impl IcmpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_icmp_type(mut self, icmp_type: u8) -> Self {
        self.icmp_type = icmp_type;
        self
    }

    pub fn with_code(mut self, code: u8) -> Self {
        self.code = code;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut msg = Vec::with_capacity(8 + self.payload.len());
        msg.push(self.icmp_type);
        msg.push(self.code);
        msg.extend_from_slice(&[0, 0]); // checksum
        msg.extend_from_slice(&[0, 0, 0, 0]); // rest of header
        msg.extend_from_slice(&self.payload);
        msg
    }
}

/// A full IPv4 TCP packet.
pub fn tcp4(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16, flags: u16) -> Vec<u8> {
    Ipv4Builder::new()
        .with_src(src)
        .with_dst(dst)
        .with_protocol(IPPROTO_TCP)
        .with_payload(
            TcpBuilder::new()
                .with_src_port(src_port)
                .with_dst_port(dst_port)
                .with_flags(flags)
                .build(),
        )
        .build()
}

/// A full IPv4 UDP packet.
pub fn udp4(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16) -> Vec<u8> {
    Ipv4Builder::new()
        .with_src(src)
        .with_dst(dst)
        .with_protocol(IPPROTO_UDP)
        .with_payload(UdpBuilder::new().with_src_port(src_port).with_dst_port(dst_port).build())
        .build()
}

/// A full IPv4 ICMP packet.
pub fn icmp4(src: Ipv4Addr, dst: Ipv4Addr, icmp_type: u8) -> Vec<u8> {
    Ipv4Builder::new()
        .with_src(src)
        .with_dst(dst)
        .with_protocol(IPPROTO_ICMP)
        .with_payload(IcmpBuilder::new().with_icmp_type(icmp_type).build())
        .build()
}

/// A full IPv6 TCP packet.
pub fn tcp6(src: Ipv6Addr, src_port: u16, dst: Ipv6Addr, dst_port: u16, flags: u16) -> Vec<u8> {
    Ipv6Builder::new()
        .with_src(src)
        .with_dst(dst)
        .with_next_header(IPPROTO_TCP)
        .with_payload(
            TcpBuilder::new()
                .with_src_port(src_port)
                .with_dst_port(dst_port)
                .with_flags(flags)
                .build(),
        )
        .build()
}

/// A full IPv6 UDP packet.
pub fn udp6(src: Ipv6Addr, src_port: u16, dst: Ipv6Addr, dst_port: u16) -> Vec<u8> {
    Ipv6Builder::new()
        .with_src(src)
        .with_dst(dst)
        .with_next_header(IPPROTO_UDP)
        .with_payload(UdpBuilder::new().with_src_port(src_port).with_dst_port(dst_port).build())
        .build()
}

/// A full IPv6 ICMPv6 packet.
pub fn icmp6(src: Ipv6Addr, dst: Ipv6Addr, icmp_type: u8) -> Vec<u8> {
    Ipv6Builder::new()
        .with_src(src)
        .with_dst(dst)
        .with_next_header(IPPROTO_ICMPV6)
        .with_payload(IcmpBuilder::new().with_icmp_type(icmp_type).build())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_build_lengths() {
        let buf = udp4(Ipv4Addr::new(1, 2, 3, 4), 1000, Ipv4Addr::new(5, 6, 7, 8), 2000);
        assert_eq!(buf.len(), 28);
        assert_eq!(buf[0], 0x45);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 28);
    }

    #[test]
    fn test_ipv6_build_lengths() {
        let buf = udp6("::1".parse().unwrap(), 1, "::2".parse().unwrap(), 2);
        assert_eq!(buf.len(), 48);
        assert_eq!(buf[0] >> 4, 6);
        assert_eq!(u16::from_be_bytes([buf[4], buf[5]]), 8);
    }
}
