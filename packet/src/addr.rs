//! Address predicates used by the filter's policy checks.
//!
//! Multicast tests come straight from `std`; the link-local tests live here
//! because the IPv4 one has a policy wrinkle: 169.254.0.0/24 and
//! 169.254.255.0/24 are reserved by RFC 3927 and are used by point-to-point
//! tunnel protocols (cloud VPN gateways assign BGP session addresses out of
//! them), so the filter's "drop link-local" rule must not cover them.

use std::net::{Ipv4Addr, Ipv6Addr};

/// IPv4 address predicates beyond what `std` offers.
pub trait Ip4AddrExt {
    /// 169.254.0.0/16.
    fn is_link_local_unicast(&self) -> bool;

    /// 169.254.0.0/16 excluding the reserved first and last /24.
    fn is_most_link_local_unicast(&self) -> bool;
}

impl Ip4AddrExt for Ipv4Addr {
    fn is_link_local_unicast(&self) -> bool {
        let o = self.octets();
        o[0] == 169 && o[1] == 254
    }

    fn is_most_link_local_unicast(&self) -> bool {
        let o = self.octets();
        self.is_link_local_unicast() && o[2] != 0 && o[2] != 255
    }
}

/// IPv6 address predicates beyond what `std` offers.
pub trait Ip6AddrExt {
    /// fe80::/10.
    fn is_link_local_unicast(&self) -> bool;
}

impl Ip6AddrExt for Ipv6Addr {
    fn is_link_local_unicast(&self) -> bool {
        self.segments()[0] & 0xffc0 == 0xfe80
    }
}
