//! Shared helpers for filter tests.

use std::sync::{Arc, Mutex};

use ipnet::IpNet;

use crate::log::LogSink;
use crate::rules::{Match, NetPortRange, PortRange};
use crate::{DecisionRateLimit, Filter};

/// Sink that collects decision lines for assertions.
#[derive(Default)]
pub struct CollectSink {
    lines: Mutex<Vec<String>>,
}

impl CollectSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl LogSink for CollectSink {
    fn write_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

/// The reference ruleset: 10.0.0.0/8 may reach 100.64.0.0/10 on port 22.
pub fn default_rules() -> Vec<Match> {
    vec![Match {
        srcs: vec!["10.0.0.0/8".parse().unwrap()],
        dsts: vec![NetPortRange {
            net: "100.64.0.0/10".parse().unwrap(),
            ports: PortRange::single(22),
        }],
    }]
}

/// The reference local prefixes: one v4 host route, one v6 site.
pub fn default_locals() -> Vec<IpNet> {
    vec!["100.64.0.1/32".parse().unwrap(), "fd7a::/48".parse().unwrap()]
}

/// A filter over the reference rules with a collecting sink and private
/// rate-limit buckets, so log assertions stay deterministic under the
/// parallel test runner.
pub fn default_filter() -> (Filter, Arc<CollectSink>) {
    let sink = Arc::new(CollectSink::default());
    let filter = Filter::new(&default_rules(), &default_locals(), None, sink.clone())
        .with_rate_limits(Arc::new(DecisionRateLimit::new()));
    (filter, sink)
}
