//! The filter facade: pre-check, per-family engines, and verdicts.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use meshguard_packet::{IPV4_HEADER_LEN, Ip4AddrExt, Ip6AddrExt, IpProto, Parsed, TCP_SYN};

use crate::conntrack::{FlowTable, Tuple4, Tuple6};
use crate::log::{self, DecisionRateLimit, Direction, LogSink, RunFlags};
use crate::rules::{Match, NetPortRange, PortRange, RuleSet4, RuleSet6};
use crate::stats::{FilterStats, StatsSnapshot};

/// A verdict from the packet filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Do not continue processing the packet.
    Drop,
    /// Continue processing the packet.
    Accept,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Drop => "Drop",
            Verdict::Accept => "Accept",
        })
    }
}

/// A stateful packet filter.
///
/// Inbound packets must land inside one of the configured local prefixes
/// and must then be permitted either by the compiled rules or by connection
/// tracking state from a locally-originated UDP flow. Outbound packets are
/// accepted and, for UDP, captured into that state. Empty prefix lists
/// reject all inbound traffic.
///
/// Rules and prefixes are immutable once built; replacing them means
/// constructing a new `Filter`, optionally sharing the flow tables of the
/// old one so in-flight UDP flows survive the reload.
pub struct Filter {
    sink: Arc<dyn LogSink>,
    limits: Arc<DecisionRateLimit>,
    local4: Vec<Ipv4Net>,
    local6: Vec<Ipv6Net>,
    rules4: RuleSet4,
    rules6: RuleSet6,
    state4: Arc<FlowTable<Tuple4>>,
    state6: Arc<FlowTable<Tuple6>>,
    stats: FilterStats,
}

/// 20 bytes of garbage that pass the pre-check length floor, used to back
/// the synthesized packet in [`Filter::check_tcp`].
static DUMMY_PACKET: [u8; 20] = [0xff; 20];

impl Filter {
    /// Create a filter enforcing that inbound packets are destined to an
    /// address inside `local_nets` and are permitted by `matches`. With
    /// `share_state_with`, the new filter adopts the given filter's flow
    /// tables so a rule reload does not break established UDP flows.
    pub fn new(
        matches: &[Match],
        local_nets: &[IpNet],
        share_state_with: Option<&Filter>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let (state4, state6) = match share_state_with {
            Some(other) => (Arc::clone(&other.state4), Arc::clone(&other.state6)),
            None => (Arc::new(FlowTable::default()), Arc::new(FlowTable::default())),
        };
        Filter {
            sink,
            limits: DecisionRateLimit::global(),
            local4: local_nets
                .iter()
                .filter_map(|net| match net {
                    IpNet::V4(n) => Some(*n),
                    IpNet::V6(_) => None,
                })
                .collect(),
            local6: local_nets
                .iter()
                .filter_map(|net| match net {
                    IpNet::V6(n) => Some(*n),
                    IpNet::V4(_) => None,
                })
                .collect(),
            rules4: RuleSet4::new(matches),
            rules6: RuleSet6::new(matches),
            state4,
            state6,
            stats: FilterStats::default(),
        }
    }

    /// A filter that rejects everything inbound.
    pub fn allow_none(sink: Arc<dyn LogSink>) -> Self {
        Filter::new(&[], &[], None, sink)
    }

    /// A filter that accepts everything. Tests only: it waves through the
    /// spoofed traffic the local-prefix gate exists to stop.
    pub fn allow_all_for_test(sink: Arc<dyn LogSink>) -> Self {
        let any4: IpNet = "0.0.0.0/0".parse().unwrap();
        let any6: IpNet = "::/0".parse().unwrap();
        let matches = [
            Match { srcs: vec![any4], dsts: vec![NetPortRange { net: any4, ports: PortRange::ANY }] },
            Match { srcs: vec![any6], dsts: vec![NetPortRange { net: any6, ports: PortRange::ANY }] },
        ];
        Filter::new(&matches, &[any4, any6], None, sink)
    }

    #[cfg(test)]
    pub(crate) fn with_rate_limits(mut self, limits: Arc<DecisionRateLimit>) -> Self {
        self.limits = limits;
        self
    }

    /// Decide whether the local host may receive `q` from an overlay peer.
    pub fn run_in(&self, q: &Parsed<'_>, rf: RunFlags) -> Verdict {
        let verdict = self.run_in_impl(q, rf);
        self.stats.record(Direction::In, verdict);
        verdict
    }

    /// Decide whether the local host may send `q` to an overlay peer.
    pub fn run_out(&self, q: &Parsed<'_>, rf: RunFlags) -> Verdict {
        let verdict = self.run_out_impl(q, rf);
        self.stats.record(Direction::Out, verdict);
        verdict
    }

    /// Whether a TCP connection from `src` to `dst:dst_port` would be let
    /// in, phrased as the verdict on a synthesized inbound SYN. Free of
    /// side effects: no flow-table writes, no log lines, no counters.
    pub fn check_tcp(&self, src: IpAddr, dst: IpAddr, dst_port: u16) -> Verdict {
        let mut q = Parsed::decode(&DUMMY_PACKET);
        match (src, dst) {
            (IpAddr::V4(s), IpAddr::V4(d)) => {
                q.ip_version = 4;
                q.src4 = s;
                q.dst4 = d;
            }
            (IpAddr::V6(s), IpAddr::V6(d)) => {
                q.ip_version = 6;
                q.src6 = s;
                q.dst6 = d;
            }
            // Mismatched address families: no rule can match.
            _ => return Verdict::Drop,
        }
        q.ip_proto = IpProto::Tcp;
        q.tcp_flags = TCP_SYN;
        q.src_port = 0;
        q.dst_port = dst_port;

        self.run_in_impl(&q, RunFlags::NONE)
    }

    /// Current verdict counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn run_in_impl(&self, q: &Parsed<'_>, rf: RunFlags) -> Verdict {
        if let Some(verdict) = self.pre(q, rf, Direction::In) {
            // pre already logged.
            return verdict;
        }
        let (verdict, why) = match q.ip_version {
            4 => self.run_in4(q),
            6 => self.run_in6(q),
            _ => (Verdict::Drop, "not-ip"),
        };
        log::log_rate_limit(&*self.sink, &self.limits, rf, q, Direction::In, verdict, why);
        verdict
    }

    fn run_out_impl(&self, q: &Parsed<'_>, rf: RunFlags) -> Verdict {
        if let Some(verdict) = self.pre(q, rf, Direction::Out) {
            return verdict;
        }
        let (verdict, why) = self.run_out_engine(q);
        log::log_rate_limit(&*self.sink, &self.limits, rf, q, Direction::Out, verdict, why);
        verdict
    }

    fn run_in4(&self, q: &Parsed<'_>) -> (Verdict, &'static str) {
        // A compromised peer could spray packets at destinations this node
        // never advertised; nothing below applies until the destination is
        // provably ours.
        if !self.local4.iter().any(|net| net.contains(&q.dst4)) {
            return (Verdict::Drop, "destination not allowed");
        }

        match q.ip_proto {
            IpProto::Icmp4 => {
                if q.is_echo_response() || q.is_error() {
                    return (Verdict::Accept, "icmp response ok");
                }
                if self.rules4.matches_ips_only(q) {
                    // Any port open to an address opens ICMP to it.
                    return (Verdict::Accept, "icmp ok");
                }
            }
            IpProto::Tcp => {
                // A peer can only initiate a session with a SYN; whatever
                // arrives without one is return traffic for a session this
                // node opened, or noise the local TCP stack will absorb.
                // Accepting it here is what lets outbound connections work
                // without keeping TCP flow state.
                if !q.is_tcp_syn() {
                    return (Verdict::Accept, "tcp non-syn");
                }
                if self.rules4.matches(q) {
                    return (Verdict::Accept, "tcp ok");
                }
            }
            IpProto::Udp => {
                if self.state4.contains(&Tuple4::from_parsed(q)) {
                    return (Verdict::Accept, "udp cached");
                }
                if self.rules4.matches(q) {
                    return (Verdict::Accept, "udp ok");
                }
            }
            _ => return (Verdict::Drop, "Unknown proto"),
        }
        (Verdict::Drop, "no rules matched")
    }

    fn run_in6(&self, q: &Parsed<'_>) -> (Verdict, &'static str) {
        if !self.local6.iter().any(|net| net.contains(&q.dst6)) {
            return (Verdict::Drop, "destination not allowed");
        }

        match q.ip_proto {
            IpProto::Icmp6 => {
                if q.is_echo_response() || q.is_error() {
                    return (Verdict::Accept, "icmp response ok");
                }
                if self.rules6.matches_ips_only(q) {
                    return (Verdict::Accept, "icmp ok");
                }
            }
            IpProto::Tcp => {
                if !q.is_tcp_syn() {
                    return (Verdict::Accept, "tcp non-syn");
                }
                if self.rules6.matches(q) {
                    return (Verdict::Accept, "tcp ok");
                }
            }
            IpProto::Udp => {
                if self.state6.contains(&Tuple6::from_parsed(q)) {
                    return (Verdict::Accept, "udp cached");
                }
                if self.rules6.matches(q) {
                    return (Verdict::Accept, "udp ok");
                }
            }
            _ => return (Verdict::Drop, "Unknown proto"),
        }
        (Verdict::Drop, "no rules matched")
    }

    fn run_out_engine(&self, q: &Parsed<'_>) -> (Verdict, &'static str) {
        // Outbound is accepted by default; the only job here is remembering
        // UDP flows so their replies get back in. The stored key is the
        // tuple the reply will arrive with.
        if q.ip_proto == IpProto::Udp {
            match q.ip_version {
                4 => self.state4.record(Tuple4::reply_of(q)),
                6 => self.state6.record(Tuple6::reply_of(q)),
                _ => {}
            }
        }
        (Verdict::Accept, "ok out")
    }

    /// Direction-agnostic sanity checks, run before either engine. `Some`
    /// is a final verdict (already logged); `None` hands the packet on.
    fn pre(&self, q: &Parsed<'_>, rf: RunFlags, dir: Direction) -> Option<Verdict> {
        if q.buf.is_empty() {
            // Tunnel keepalive; nothing to inspect, nothing to log.
            return Some(Verdict::Accept);
        }
        if q.buf.len() < IPV4_HEADER_LEN {
            self.log_pre(rf, q, dir, Verdict::Drop, "too short");
            return Some(Verdict::Drop);
        }

        match q.ip_version {
            4 => {
                if q.dst4.is_multicast() {
                    self.log_pre(rf, q, dir, Verdict::Drop, "multicast");
                    return Some(Verdict::Drop);
                }
                if q.dst4.is_most_link_local_unicast() {
                    self.log_pre(rf, q, dir, Verdict::Drop, "link-local-unicast");
                    return Some(Verdict::Drop);
                }
            }
            6 => {
                if q.dst6.is_multicast() {
                    self.log_pre(rf, q, dir, Verdict::Drop, "multicast");
                    return Some(Verdict::Drop);
                }
                if q.dst6.is_link_local_unicast() {
                    self.log_pre(rf, q, dir, Verdict::Drop, "link-local-unicast");
                    return Some(Verdict::Drop);
                }
            }
            _ => {}
        }

        match q.ip_proto {
            IpProto::Unknown => {
                // Unclassifiable packets are dangerous; always drop them.
                self.log_pre(rf, q, dir, Verdict::Drop, "unknown");
                Some(Verdict::Drop)
            }
            IpProto::Fragment => {
                // Fragments after the first must pass for reassembly to
                // work; the first fragment carried the transport header and
                // was judged on it. Too-small fragments decode as Unknown
                // and were dropped above.
                self.log_pre(rf, q, dir, Verdict::Accept, "fragment");
                Some(Verdict::Accept)
            }
            _ => None,
        }
    }

    fn log_pre(&self, rf: RunFlags, q: &Parsed<'_>, dir: Direction, verdict: Verdict, why: &str) {
        log::log_rate_limit(&*self.sink, &self.limits, rf, q, dir, verdict, why);
    }
}
