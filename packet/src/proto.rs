//! Transport protocol classification.

use std::fmt;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_IGMP: u8 = 2;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_ICMPV6: u8 = 58;

/// IPv6 fragment extension header.
pub const IPPROTO_FRAGMENT: u8 = 44;

/// Transport protocol of a decoded packet.
///
/// `Fragment` marks a non-initial fragment: the transport header travelled
/// with the first fragment, so nothing beyond the IP header is decoded.
/// `Unknown` covers protocol numbers the decoder does not classify as well
/// as packets too mangled to decode at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpProto {
    Unknown,
    Fragment,
    Icmp4,
    Igmp,
    Tcp,
    Udp,
    Icmp6,
}

impl IpProto {
    /// Classify an IPv4 protocol number.
    pub fn from_v4(num: u8) -> Self {
        match num {
            IPPROTO_ICMP => IpProto::Icmp4,
            IPPROTO_IGMP => IpProto::Igmp,
            IPPROTO_TCP => IpProto::Tcp,
            IPPROTO_UDP => IpProto::Udp,
            _ => IpProto::Unknown,
        }
    }

    /// Classify an IPv6 next-header number.
    ///
    /// Extension headers other than the fragment header are not walked; a
    /// packet carrying one classifies as `Unknown`.
    pub fn from_v6(num: u8) -> Self {
        match num {
            IPPROTO_TCP => IpProto::Tcp,
            IPPROTO_UDP => IpProto::Udp,
            IPPROTO_ICMPV6 => IpProto::Icmp6,
            _ => IpProto::Unknown,
        }
    }
}

impl fmt::Display for IpProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IpProto::Unknown => "Unknown",
            IpProto::Fragment => "Frag",
            IpProto::Icmp4 => "ICMPv4",
            IpProto::Igmp => "IGMP",
            IpProto::Tcp => "TCP",
            IpProto::Udp => "UDP",
            IpProto::Icmp6 => "ICMPv6",
        };
        f.write_str(name)
    }
}
