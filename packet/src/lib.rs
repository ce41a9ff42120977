//! IP packet decoding for the meshguard data path.
//!
//! This crate provides the structured view of a raw IPv4/IPv6 datagram that
//! the packet filter consumes: header classification ([`IpProto`]), the
//! decoded [`Parsed`] form with transport ports and flags, the address
//! predicates the filter's policy checks need, and a hexdump helper for
//! decision logging. Decoding never fails; anything the decoder cannot
//! classify is reported as [`IpProto::Unknown`] and left to policy.

pub mod addr;
pub mod hexdump;
pub mod parse;
pub mod proto;
pub mod testing;

pub use addr::{Ip4AddrExt, Ip6AddrExt};
pub use hexdump::hexdump;
pub use parse::{
    IPV4_HEADER_LEN, IPV6_HEADER_LEN, Parsed, TCP_ACK, TCP_FIN, TCP_PSH, TCP_RST, TCP_SYN, TCP_URG,
};
pub use proto::IpProto;
