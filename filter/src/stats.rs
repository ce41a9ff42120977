//! Verdict counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::filter::Verdict;
use crate::log::Direction;

/// Cheap per-filter verdict counters, updated on every `run_in`/`run_out`.
#[derive(Debug, Default)]
pub(crate) struct FilterStats {
    accepted_in: AtomicU64,
    accepted_out: AtomicU64,
    dropped_in: AtomicU64,
    dropped_out: AtomicU64,
}

impl FilterStats {
    pub(crate) fn record(&self, dir: Direction, verdict: Verdict) {
        let counter = match (dir, verdict) {
            (Direction::In, Verdict::Accept) => &self.accepted_in,
            (Direction::Out, Verdict::Accept) => &self.accepted_out,
            (Direction::In, Verdict::Drop) => &self.dropped_in,
            (Direction::Out, Verdict::Drop) => &self.dropped_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted_in: self.accepted_in.load(Ordering::Relaxed),
            accepted_out: self.accepted_out.load(Ordering::Relaxed),
            dropped_in: self.dropped_in.load(Ordering::Relaxed),
            dropped_out: self.dropped_out.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a filter's verdict counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub accepted_in: u64,
    pub accepted_out: u64,
    pub dropped_in: u64,
    pub dropped_out: u64,
}
