//! Connection tracking for locally-originated UDP flows.
//!
//! The outbound engine records the reversed 4-tuple of every UDP datagram it
//! sends, so that the reply arriving on the exact reverse path is let in
//! without an explicit allow rule. One bounded table per address family,
//! keyed on the concrete tuple type; values carry no information, presence
//! is the whole point.

use std::hash::Hash;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::num::NonZeroUsize;

use lru::LruCache;
use meshguard_packet::Parsed;
use parking_lot::Mutex;

/// Per-family flow table capacity.
pub const FLOW_CAPACITY: usize = 512;

/// IPv4 flow key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tuple4 {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl Tuple4 {
    /// The packet's tuple as seen on the wire.
    pub fn from_parsed(q: &Parsed<'_>) -> Self {
        Tuple4 { src: q.src4, dst: q.dst4, src_port: q.src_port, dst_port: q.dst_port }
    }

    /// The tuple a reply to this packet will carry.
    pub fn reply_of(q: &Parsed<'_>) -> Self {
        Tuple4 { src: q.dst4, dst: q.src4, src_port: q.dst_port, dst_port: q.src_port }
    }
}

/// IPv6 flow key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tuple6 {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl Tuple6 {
    pub fn from_parsed(q: &Parsed<'_>) -> Self {
        Tuple6 { src: q.src6, dst: q.dst6, src_port: q.src_port, dst_port: q.dst_port }
    }

    pub fn reply_of(q: &Parsed<'_>) -> Self {
        Tuple6 { src: q.dst6, dst: q.src6, src_port: q.dst_port, dst_port: q.src_port }
    }
}

/// Bounded LRU of recently seen flow keys, safe for concurrent callers.
///
/// All work under the mutex is O(1); callers must not hold it across rule
/// matching or logging.
pub struct FlowTable<K: Hash + Eq> {
    flows: Mutex<LruCache<K, ()>>,
}

impl<K: Hash + Eq> FlowTable<K> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        FlowTable { flows: Mutex::new(LruCache::new(capacity)) }
    }

    /// Insert or refresh a key, evicting the least recently used entry when
    /// full.
    pub fn record(&self, key: K) {
        self.flows.lock().put(key, ());
    }

    /// Whether the key is present; a hit refreshes its recency.
    pub fn contains(&self, key: &K) -> bool {
        self.flows.lock().get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.flows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.lock().is_empty()
    }
}

impl<K: Hash + Eq> Default for FlowTable<K> {
    fn default() -> Self {
        FlowTable::new(FLOW_CAPACITY)
    }
}
