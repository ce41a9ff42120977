//! ACL rules and their compiled, match-optimized form.
//!
//! User-facing rules ([`Match`]) pair a set of source prefixes with a set of
//! destination prefix/port-range terms and may mix address families. At
//! filter construction they are compiled once per family ([`RuleSet4`],
//! [`RuleSet6`]): rules that carry nothing for the family are discarded, the
//! remainder is flattened into plain arrays so the per-packet queries walk
//! contiguous memory and never allocate.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use meshguard_packet::Parsed;
use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Inclusive destination port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub first: u16,
    pub last: u16,
}

impl PortRange {
    /// The full range, matching any port.
    pub const ANY: PortRange = PortRange { first: 0, last: 65535 };

    /// A validated range; `first` must not exceed `last`.
    pub fn new(first: u16, last: u16) -> Result<Self, FilterError> {
        if first > last {
            return Err(FilterError::InvalidPortRange { first, last });
        }
        Ok(PortRange { first, last })
    }

    /// A single-port range.
    pub fn single(port: u16) -> Self {
        PortRange { first: port, last: port }
    }

    pub fn contains(&self, port: u16) -> bool {
        self.first <= port && port <= self.last
    }
}

/// A destination term: the packet's destination address must be inside
/// `net` and its destination port inside `ports`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetPortRange {
    pub net: IpNet,
    pub ports: PortRange,
}

/// One ACL rule: source prefixes crossed with destination terms.
///
/// A packet matches iff its source address is inside some `srcs` entry and
/// some `dsts` entry covers its destination address and port. Matching a
/// rule always means accept; rules exist in insertion order so that a
/// future deny action slots in without re-architecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub srcs: Vec<IpNet>,
    pub dsts: Vec<NetPortRange>,
}

/// Compiled destination term, one address family.
#[derive(Debug, Clone, Copy)]
struct DstTerm4 {
    net: Ipv4Net,
    first: u16,
    last: u16,
}

#[derive(Debug, Clone, Copy)]
struct DstTerm6 {
    net: Ipv6Net,
    first: u16,
    last: u16,
}

#[derive(Debug, Clone)]
struct CompiledRule4 {
    srcs: Vec<Ipv4Net>,
    dsts: Vec<DstTerm4>,
}

#[derive(Debug, Clone)]
struct CompiledRule6 {
    srcs: Vec<Ipv6Net>,
    dsts: Vec<DstTerm6>,
}

/// IPv4 rules compiled for repeated matching.
#[derive(Debug, Clone, Default)]
pub struct RuleSet4 {
    rules: Vec<CompiledRule4>,
}

impl RuleSet4 {
    /// Compile the IPv4 half of `matches`. Rules with no IPv4 source or no
    /// IPv4 destination term can never match and are dropped here.
    pub fn new(matches: &[Match]) -> Self {
        let rules = matches
            .iter()
            .filter_map(|m| {
                let srcs: Vec<Ipv4Net> = m
                    .srcs
                    .iter()
                    .filter_map(|net| match net {
                        IpNet::V4(n) => Some(*n),
                        IpNet::V6(_) => None,
                    })
                    .collect();
                let dsts: Vec<DstTerm4> = m
                    .dsts
                    .iter()
                    .filter_map(|d| match d.net {
                        IpNet::V4(net) => {
                            Some(DstTerm4 { net, first: d.ports.first, last: d.ports.last })
                        }
                        IpNet::V6(_) => None,
                    })
                    .collect();
                if srcs.is_empty() || dsts.is_empty() {
                    return None;
                }
                Some(CompiledRule4 { srcs, dsts })
            })
            .collect();
        RuleSet4 { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Full 5-tuple match. First matching rule wins; no rule means false.
    pub fn matches(&self, q: &Parsed<'_>) -> bool {
        self.rules.iter().any(|rule| {
            rule.srcs.iter().any(|net| net.contains(&q.src4))
                && rule
                    .dsts
                    .iter()
                    .any(|d| d.net.contains(&q.dst4) && d.first <= q.dst_port && q.dst_port <= d.last)
        })
    }

    /// As [`matches`](Self::matches), ignoring ports. Used for ICMP: if any
    /// port is open to an address, ICMP to it is fine.
    pub fn matches_ips_only(&self, q: &Parsed<'_>) -> bool {
        self.rules.iter().any(|rule| {
            rule.srcs.iter().any(|net| net.contains(&q.src4))
                && rule.dsts.iter().any(|d| d.net.contains(&q.dst4))
        })
    }
}

/// IPv6 rules compiled for repeated matching.
#[derive(Debug, Clone, Default)]
pub struct RuleSet6 {
    rules: Vec<CompiledRule6>,
}

impl RuleSet6 {
    /// Compile the IPv6 half of `matches`.
    pub fn new(matches: &[Match]) -> Self {
        let rules = matches
            .iter()
            .filter_map(|m| {
                let srcs: Vec<Ipv6Net> = m
                    .srcs
                    .iter()
                    .filter_map(|net| match net {
                        IpNet::V6(n) => Some(*n),
                        IpNet::V4(_) => None,
                    })
                    .collect();
                let dsts: Vec<DstTerm6> = m
                    .dsts
                    .iter()
                    .filter_map(|d| match d.net {
                        IpNet::V6(net) => {
                            Some(DstTerm6 { net, first: d.ports.first, last: d.ports.last })
                        }
                        IpNet::V4(_) => None,
                    })
                    .collect();
                if srcs.is_empty() || dsts.is_empty() {
                    return None;
                }
                Some(CompiledRule6 { srcs, dsts })
            })
            .collect();
        RuleSet6 { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn matches(&self, q: &Parsed<'_>) -> bool {
        self.rules.iter().any(|rule| {
            rule.srcs.iter().any(|net| net.contains(&q.src6))
                && rule
                    .dsts
                    .iter()
                    .any(|d| d.net.contains(&q.dst6) && d.first <= q.dst_port && q.dst_port <= d.last)
        })
    }

    pub fn matches_ips_only(&self, q: &Parsed<'_>) -> bool {
        self.rules.iter().any(|rule| {
            rule.srcs.iter().any(|net| net.contains(&q.src6))
                && rule.dsts.iter().any(|d| d.net.contains(&q.dst6))
        })
    }
}
