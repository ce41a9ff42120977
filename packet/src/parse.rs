//! Raw buffer decoding into the [`Parsed`] view.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::proto::{IPPROTO_FRAGMENT, IpProto};

/// Minimum IPv4 header length (IHL = 5).
pub const IPV4_HEADER_LEN: usize = 20;
/// Fixed IPv6 header length.
pub const IPV6_HEADER_LEN: usize = 40;

const TCP_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const ICMP_HEADER_LEN: usize = 4;
const FRAG_HEADER_LEN: usize = 8;

pub const TCP_FIN: u16 = 0x0001;
pub const TCP_SYN: u16 = 0x0002;
pub const TCP_RST: u16 = 0x0004;
pub const TCP_PSH: u16 = 0x0008;
pub const TCP_ACK: u16 = 0x0010;
pub const TCP_URG: u16 = 0x0020;

const ICMP4_ECHO_REPLY: u8 = 0;
const ICMP6_ECHO_REPLY: u8 = 129;

/// Decoded view of a raw IP datagram.
///
/// Fields are public so that privileged callers (the filter's synthesized
/// `check_tcp` probe) can overwrite the semantic fields after decoding a
/// dummy buffer. Only the fields matching `ip_version` are meaningful; the
/// rest keep their zero values.
#[derive(Debug, Clone, Copy)]
pub struct Parsed<'a> {
    /// The raw buffer this view was decoded from.
    pub buf: &'a [u8],
    /// 4, 6, or 0 when the buffer is not decodable as either.
    pub ip_version: u8,
    pub ip_proto: IpProto,
    pub src4: Ipv4Addr,
    pub dst4: Ipv4Addr,
    pub src6: Ipv6Addr,
    pub dst6: Ipv6Addr,
    /// Transport ports; zero for protocols without them.
    pub src_port: u16,
    pub dst_port: u16,
    /// Low eight bits of the TCP flag byte; zero for non-TCP.
    pub tcp_flags: u16,
    pub icmp_type: u8,
    pub icmp_code: u8,
}

impl<'a> Parsed<'a> {
    /// Decode a raw buffer. Never fails: buffers the decoder cannot make
    /// sense of come back with `ip_version == 0` and [`IpProto::Unknown`],
    /// and policy decides what to do with them.
    pub fn decode(buf: &'a [u8]) -> Self {
        let mut p = Parsed {
            buf,
            ip_version: 0,
            ip_proto: IpProto::Unknown,
            src4: Ipv4Addr::UNSPECIFIED,
            dst4: Ipv4Addr::UNSPECIFIED,
            src6: Ipv6Addr::UNSPECIFIED,
            dst6: Ipv6Addr::UNSPECIFIED,
            src_port: 0,
            dst_port: 0,
            tcp_flags: 0,
            icmp_type: 0,
            icmp_code: 0,
        };
        if buf.len() < IPV4_HEADER_LEN {
            return p;
        }
        match buf[0] >> 4 {
            4 => p.decode4(),
            6 => p.decode6(),
            _ => {}
        }
        p
    }

    fn decode4(&mut self) {
        let buf = self.buf;
        self.ip_version = 4;

        let ihl = (buf[0] & 0x0f) as usize * 4;
        if ihl < IPV4_HEADER_LEN || buf.len() < ihl {
            return; // header claims more than the buffer holds
        }

        self.src4 = Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]);
        self.dst4 = Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]);
        self.ip_proto = IpProto::from_v4(buf[9]);

        let frag = u16::from_be_bytes([buf[6], buf[7]]);
        if frag & 0x1fff != 0 {
            // Non-initial fragment: the transport header went with the
            // first fragment.
            self.ip_proto = IpProto::Fragment;
            return;
        }

        self.decode_transport(ihl);
    }

    fn decode6(&mut self) {
        let buf = self.buf;
        if buf.len() < IPV6_HEADER_LEN {
            return; // claims v6, too short to be one
        }
        self.ip_version = 6;

        let mut a = [0u8; 16];
        a.copy_from_slice(&buf[8..24]);
        self.src6 = Ipv6Addr::from(a);
        a.copy_from_slice(&buf[24..40]);
        self.dst6 = Ipv6Addr::from(a);

        let mut next = buf[6];
        let mut offset = IPV6_HEADER_LEN;

        if next == IPPROTO_FRAGMENT {
            if buf.len() < offset + FRAG_HEADER_LEN {
                return;
            }
            let frag_off = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) >> 3;
            if frag_off != 0 {
                self.ip_proto = IpProto::Fragment;
                return;
            }
            next = buf[offset];
            offset += FRAG_HEADER_LEN;
        }

        self.ip_proto = IpProto::from_v6(next);
        self.decode_transport(offset);
    }

    fn decode_transport(&mut self, offset: usize) {
        let t = &self.buf[offset..];
        match self.ip_proto {
            IpProto::Tcp => {
                if t.len() < TCP_HEADER_LEN {
                    self.ip_proto = IpProto::Unknown;
                    return;
                }
                self.src_port = u16::from_be_bytes([t[0], t[1]]);
                self.dst_port = u16::from_be_bytes([t[2], t[3]]);
                self.tcp_flags = t[13] as u16;
            }
            IpProto::Udp => {
                if t.len() < UDP_HEADER_LEN {
                    self.ip_proto = IpProto::Unknown;
                    return;
                }
                self.src_port = u16::from_be_bytes([t[0], t[1]]);
                self.dst_port = u16::from_be_bytes([t[2], t[3]]);
            }
            IpProto::Icmp4 | IpProto::Icmp6 => {
                if t.len() < ICMP_HEADER_LEN {
                    self.ip_proto = IpProto::Unknown;
                    return;
                }
                self.icmp_type = t[0];
                self.icmp_code = t[1];
            }
            _ => {}
        }
    }

    /// Whether this is a TCP segment with the SYN flag set.
    pub fn is_tcp_syn(&self) -> bool {
        self.ip_proto == IpProto::Tcp && self.tcp_flags & TCP_SYN != 0
    }

    /// Whether this is an ICMP echo reply.
    pub fn is_echo_response(&self) -> bool {
        match self.ip_proto {
            IpProto::Icmp4 => self.icmp_type == ICMP4_ECHO_REPLY,
            IpProto::Icmp6 => self.icmp_type == ICMP6_ECHO_REPLY,
            _ => false,
        }
    }

    /// Whether this is an ICMP error message (unreachable, time exceeded,
    /// and friends).
    pub fn is_error(&self) -> bool {
        match self.ip_proto {
            IpProto::Icmp4 => matches!(self.icmp_type, 3 | 4 | 5 | 11 | 12),
            // RFC 4443: types 1-4 are the error messages.
            IpProto::Icmp6 => (1..=4).contains(&self.icmp_type),
            _ => false,
        }
    }
}

/// One-line packet summary used by decision logging. Allocates; callers on
/// the hot path must only format after deciding the line will be written.
impl fmt::Display for Parsed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.ip_version, self.ip_proto) {
            (4, IpProto::Tcp | IpProto::Udp) => write!(
                f,
                "{} {}:{} > {}:{}",
                self.ip_proto, self.src4, self.src_port, self.dst4, self.dst_port
            ),
            (6, IpProto::Tcp | IpProto::Udp) => write!(
                f,
                "{} [{}]:{} > [{}]:{}",
                self.ip_proto, self.src6, self.src_port, self.dst6, self.dst_port
            ),
            (4, proto) => write!(f, "{} {} > {}", proto, self.src4, self.dst4),
            (6, proto) => write!(f, "{} {} > {}", proto, self.src6, self.dst6),
            _ => write!(f, "Unknown({} bytes)", self.buf.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{IPPROTO_TCP, IPPROTO_UDP};
    use crate::testing::{
        Icmp6Builder, IcmpBuilder, Ipv4Builder, Ipv6Builder, TcpBuilder, UdpBuilder, tcp4, udp6,
    };

    fn v4(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
        Ipv4Addr::new(a, b, c, d)
    }

    #[test]
    fn test_decode_tcp4() {
        let buf = tcp4(v4(10, 1, 2, 3), 5555, v4(100, 64, 0, 1), 22, TCP_SYN);
        let p = Parsed::decode(&buf);
        assert_eq!(p.ip_version, 4);
        assert_eq!(p.ip_proto, IpProto::Tcp);
        assert_eq!(p.src4, v4(10, 1, 2, 3));
        assert_eq!(p.dst4, v4(100, 64, 0, 1));
        assert_eq!(p.src_port, 5555);
        assert_eq!(p.dst_port, 22);
        assert!(p.is_tcp_syn());
    }

    #[test]
    fn test_decode_tcp4_non_syn() {
        let buf = tcp4(v4(9, 9, 9, 9), 80, v4(100, 64, 0, 1), 22, TCP_ACK | TCP_PSH);
        let p = Parsed::decode(&buf);
        assert_eq!(p.ip_proto, IpProto::Tcp);
        assert!(!p.is_tcp_syn());
    }

    #[test]
    fn test_decode_udp4_with_options() {
        // IHL > 5 shifts the transport header.
        let buf = Ipv4Builder::new()
            .with_src(v4(8, 8, 8, 8))
            .with_dst(v4(100, 64, 0, 1))
            .with_protocol(IPPROTO_UDP)
            .with_options(vec![0x01, 0x01, 0x01, 0x01]) // four NOPs
            .with_payload(UdpBuilder::new().with_src_port(53).with_dst_port(51820).build())
            .build();
        let p = Parsed::decode(&buf);
        assert_eq!(p.ip_proto, IpProto::Udp);
        assert_eq!(p.src_port, 53);
        assert_eq!(p.dst_port, 51820);
    }

    #[test]
    fn test_decode_icmp4_predicates() {
        for (icmp_type, echo, error) in [(0u8, true, false), (8, false, false), (3, false, true)] {
            let buf = Ipv4Builder::new()
                .with_src(v4(10, 1, 2, 3))
                .with_dst(v4(100, 64, 0, 1))
                .with_protocol(crate::proto::IPPROTO_ICMP)
                .with_payload(IcmpBuilder::new().with_icmp_type(icmp_type).build())
                .build();
            let p = Parsed::decode(&buf);
            assert_eq!(p.ip_proto, IpProto::Icmp4);
            assert_eq!(p.is_echo_response(), echo, "type {icmp_type}");
            assert_eq!(p.is_error(), error, "type {icmp_type}");
        }
    }

    #[test]
    fn test_decode_fragment4() {
        let buf = Ipv4Builder::new()
            .with_src(v4(10, 1, 2, 3))
            .with_dst(v4(100, 64, 0, 1))
            .with_protocol(IPPROTO_UDP)
            .with_fragment(185, false)
            .with_payload(vec![0u8; 32])
            .build();
        let p = Parsed::decode(&buf);
        assert_eq!(p.ip_proto, IpProto::Fragment);
        assert_eq!(p.src_port, 0);
    }

    #[test]
    fn test_decode_initial_fragment4_parses_transport() {
        // Offset 0 with MF set is the first fragment and still carries the
        // transport header.
        let buf = Ipv4Builder::new()
            .with_src(v4(10, 1, 2, 3))
            .with_dst(v4(100, 64, 0, 1))
            .with_protocol(IPPROTO_UDP)
            .with_fragment(0, true)
            .with_payload(UdpBuilder::new().with_src_port(4000).with_dst_port(53).build())
            .build();
        let p = Parsed::decode(&buf);
        assert_eq!(p.ip_proto, IpProto::Udp);
        assert_eq!(p.dst_port, 53);
    }

    #[test]
    fn test_truncated_transport_is_unknown() {
        let buf = Ipv4Builder::new()
            .with_src(v4(10, 1, 2, 3))
            .with_dst(v4(100, 64, 0, 1))
            .with_protocol(IPPROTO_TCP)
            .with_payload(vec![0u8; 4]) // 4 bytes of a 20-byte TCP header
            .build();
        let p = Parsed::decode(&buf);
        assert_eq!(p.ip_proto, IpProto::Unknown);
    }

    #[test]
    fn test_short_and_empty_buffers() {
        let p = Parsed::decode(&[]);
        assert_eq!(p.ip_version, 0);
        assert_eq!(p.ip_proto, IpProto::Unknown);

        let p = Parsed::decode(&[0x45; 12]);
        assert_eq!(p.ip_version, 0);
        assert_eq!(p.ip_proto, IpProto::Unknown);
    }

    #[test]
    fn test_unclassified_protocol_number() {
        let buf = Ipv4Builder::new()
            .with_src(v4(10, 1, 2, 3))
            .with_dst(v4(100, 64, 0, 1))
            .with_protocol(47) // GRE
            .with_payload(vec![0u8; 8])
            .build();
        let p = Parsed::decode(&buf);
        assert_eq!(p.ip_version, 4);
        assert_eq!(p.ip_proto, IpProto::Unknown);
    }

    #[test]
    fn test_decode_udp6() {
        let src = "fd7a::2".parse().unwrap();
        let dst = "fd7a::1".parse().unwrap();
        let buf = udp6(src, 53, dst, 51820);
        let p = Parsed::decode(&buf);
        assert_eq!(p.ip_version, 6);
        assert_eq!(p.ip_proto, IpProto::Udp);
        assert_eq!(p.src6, src);
        assert_eq!(p.dst6, dst);
        assert_eq!(p.src_port, 53);
        assert_eq!(p.dst_port, 51820);
    }

    #[test]
    fn test_decode_icmp6_echo_reply() {
        let buf = Ipv6Builder::new()
            .with_src("fd7a::2".parse().unwrap())
            .with_dst("fd7a::1".parse().unwrap())
            .with_next_header(crate::proto::IPPROTO_ICMPV6)
            .with_payload(Icmp6Builder::new().with_icmp_type(129).build())
            .build();
        let p = Parsed::decode(&buf);
        assert_eq!(p.ip_proto, IpProto::Icmp6);
        assert!(p.is_echo_response());
        assert!(!p.is_error());
    }

    #[test]
    fn test_decode_fragment6() {
        let inner = TcpBuilder::new().with_src_port(1).with_dst_port(2).build();
        let non_initial = Ipv6Builder::new()
            .with_src("fd7a::2".parse().unwrap())
            .with_dst("fd7a::1".parse().unwrap())
            .with_fragment(IPPROTO_TCP, 64)
            .with_payload(vec![0u8; 16])
            .build();
        let p = Parsed::decode(&non_initial);
        assert_eq!(p.ip_proto, IpProto::Fragment);

        let initial = Ipv6Builder::new()
            .with_src("fd7a::2".parse().unwrap())
            .with_dst("fd7a::1".parse().unwrap())
            .with_fragment(IPPROTO_TCP, 0)
            .with_payload(inner)
            .build();
        let p = Parsed::decode(&initial);
        assert_eq!(p.ip_proto, IpProto::Tcp);
        assert_eq!(p.dst_port, 2);
    }

    #[test]
    fn test_summary_format() {
        let buf = tcp4(v4(10, 1, 2, 3), 5555, v4(100, 64, 0, 1), 22, TCP_SYN);
        let p = Parsed::decode(&buf);
        assert_eq!(p.to_string(), "TCP 10.1.2.3:5555 > 100.64.0.1:22");

        let buf = Ipv4Builder::new()
            .with_src(v4(10, 1, 2, 3))
            .with_dst(v4(100, 64, 0, 1))
            .with_protocol(crate::proto::IPPROTO_ICMP)
            .with_payload(IcmpBuilder::new().with_icmp_type(8).build())
            .build();
        let p = Parsed::decode(&buf);
        assert_eq!(p.to_string(), "ICMPv4 10.1.2.3 > 100.64.0.1");
    }
}
