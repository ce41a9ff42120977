//! Rate-limited decision logging.
//!
//! Every verdict may produce one log line, but only when the caller asked
//! for that verdict class ([`RunFlags`]), the class's token bucket has a
//! token, and the silence list does not suppress it. Packet summaries and
//! hexdumps allocate, so they are formatted strictly after a token has been
//! taken.

use std::fmt;
use std::num::NonZeroU32;
use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use meshguard_packet::{Ip4AddrExt, Ip6AddrExt, IpProto, Parsed, hexdump};

use crate::filter::Verdict;

/// Per-call logging controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunFlags(u32);

impl RunFlags {
    pub const NONE: RunFlags = RunFlags(0);
    /// Emit a log entry for drops.
    pub const LOG_DROPS: RunFlags = RunFlags(0x1);
    /// Emit a log entry for accepts.
    pub const LOG_ACCEPTS: RunFlags = RunFlags(0x2);
    /// Attach a hexdump to drop entries.
    pub const HEXDUMP_DROPS: RunFlags = RunFlags(0x4);
    /// Attach a hexdump to accept entries.
    pub const HEXDUMP_ACCEPTS: RunFlags = RunFlags(0x8);

    pub fn contains(self, other: RunFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RunFlags {
    type Output = RunFlags;

    fn bitor(self, rhs: RunFlags) -> RunFlags {
        RunFlags(self.0 | rhs.0)
    }
}

/// Which way a packet was flowing. Only consulted by the silence list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From an overlay peer to the local host.
    In,
    /// From the local host to an overlay peer.
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::In => "in",
            Direction::Out => "out",
        })
    }
}

/// Destination for formatted decision lines.
pub trait LogSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Routes decision lines to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_line(&self, line: &str) {
        tracing::debug!(target: "meshguard::filter", "{line}");
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// The two token buckets gating decision log volume.
///
/// Process-wide (see [`DecisionRateLimit::global`]): rule reloads replace
/// the `Filter` but must not refill the buckets, or flapping rules would
/// defeat the limit.
pub struct DecisionRateLimit {
    accepts: DirectLimiter,
    drops: DirectLimiter,
}

const ACCEPT_BURST: u32 = 3;
const DROP_BURST: u32 = 10;

impl DecisionRateLimit {
    /// Accepts replenish one token per 10s (burst 3); drops one per 5s
    /// (burst 10). Accepted flows are chattier than attack noise, so they
    /// get the stingier bucket.
    pub fn new() -> Self {
        let accept_quota = Quota::with_period(Duration::from_secs(10))
            .unwrap()
            .allow_burst(NonZeroU32::new(ACCEPT_BURST).unwrap());
        let drop_quota = Quota::with_period(Duration::from_secs(5))
            .unwrap()
            .allow_burst(NonZeroU32::new(DROP_BURST).unwrap());
        DecisionRateLimit {
            accepts: RateLimiter::direct(accept_quota),
            drops: RateLimiter::direct(drop_quota),
        }
    }

    /// The process-wide buckets shared by every filter instance.
    pub fn global() -> Arc<DecisionRateLimit> {
        Arc::clone(&GLOBAL_LIMITS)
    }

    fn allow_accept(&self) -> bool {
        self.accepts.check().is_ok()
    }

    fn allow_drop(&self) -> bool {
        self.drops.check().is_ok()
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_LIMITS: Arc<DecisionRateLimit> = Arc::new(DecisionRateLimit::new());
}

impl Default for DecisionRateLimit {
    fn default() -> Self {
        DecisionRateLimit::new()
    }
}

/// Whether a drop is routine outbound noise (multicast chatter, link-local
/// discovery, IGMP) whose log line would only scare people.
pub(crate) fn omit_drop_logging(q: &Parsed<'_>, dir: Direction) -> bool {
    if dir != Direction::Out {
        return false;
    }
    match q.ip_version {
        4 => {
            q.dst4.is_multicast()
                || q.dst4.is_most_link_local_unicast()
                || q.ip_proto == IpProto::Igmp
        }
        6 => q.dst6.is_multicast() || q.dst6.is_link_local_unicast(),
        _ => false,
    }
}

fn maybe_hexdump(wanted: bool, buf: &[u8]) -> String {
    if !wanted {
        return String::new();
    }
    hexdump(buf)
}

/// Emit one decision line if flags, bucket, and silence list all agree.
pub(crate) fn log_rate_limit(
    sink: &dyn LogSink,
    limits: &DecisionRateLimit,
    rf: RunFlags,
    q: &Parsed<'_>,
    dir: Direction,
    verdict: Verdict,
    why: &str,
) {
    let dump = match verdict {
        Verdict::Drop => {
            if omit_drop_logging(q, dir) {
                return;
            }
            if !rf.contains(RunFlags::LOG_DROPS) || !limits.allow_drop() {
                return;
            }
            rf.contains(RunFlags::HEXDUMP_DROPS)
        }
        Verdict::Accept => {
            if !rf.contains(RunFlags::LOG_ACCEPTS) || !limits.allow_accept() {
                return;
            }
            rf.contains(RunFlags::HEXDUMP_ACCEPTS)
        }
    };

    // A token was taken; only now is the allocating summary justified.
    let line =
        format!("{verdict}: {q} {} {why}\n{}", q.buf.len(), maybe_hexdump(dump, q.buf));
    sink.write_line(&line);
}
