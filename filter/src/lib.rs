//! Stateful packet filter for the meshguard overlay data path.
//!
//! The filter is consulted twice per packet: [`Filter::run_in`] for traffic
//! arriving from a peer and [`Filter::run_out`] for traffic the local host
//! sends. Inbound packets must be destined to a configured local prefix and
//! then be permitted by the compiled ACL rules or by connection-tracking
//! state from an outbound UDP flow; outbound packets are accepted and
//! captured into that state. Every decision can emit one rate-limited log
//! line through the configured [`LogSink`].

pub mod conntrack;
pub mod error;
pub mod filter;
pub mod log;
pub mod rules;
pub mod stats;

pub use conntrack::{FLOW_CAPACITY, FlowTable, Tuple4, Tuple6};
pub use error::{FilterError, Result};
pub use filter::{Filter, Verdict};
pub use log::{DecisionRateLimit, Direction, LogSink, RunFlags, TracingSink};
pub use rules::{Match, NetPortRange, PortRange, RuleSet4, RuleSet6};
pub use stats::StatsSnapshot;

#[cfg(test)]
mod tests;
