//! Benchmarks for the meshguard filter hot path.

use std::net::Ipv4Addr;
use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use meshguard_filter::{Filter, LogSink, Match, NetPortRange, PortRange, RunFlags};
use meshguard_packet::testing::{tcp4, udp4};
use meshguard_packet::{Parsed, TCP_SYN};

struct NullSink;

impl LogSink for NullSink {
    fn write_line(&self, _line: &str) {}
}

fn wide_ruleset(rules: usize) -> Vec<Match> {
    (0..rules)
        .map(|i| Match {
            srcs: vec![format!("10.{}.0.0/16", i % 256).parse().unwrap()],
            dsts: vec![NetPortRange {
                net: "100.64.0.0/10".parse().unwrap(),
                ports: PortRange::single(22),
            }],
        })
        .collect()
}

fn bench_filter(rules: usize) -> Filter {
    Filter::new(
        &wide_ruleset(rules),
        &["100.64.0.1/32".parse().unwrap()],
        None,
        Arc::new(NullSink),
    )
}

fn decode_benchmark(c: &mut Criterion) {
    let buf = tcp4(Ipv4Addr::new(10, 1, 2, 3), 5555, Ipv4Addr::new(100, 64, 0, 1), 22, TCP_SYN);
    c.bench_function("decode_tcp4", |b| b.iter(|| black_box(Parsed::decode(black_box(&buf)))));
}

fn run_in_benchmark(c: &mut Criterion) {
    // Worst case for the rule scan: the packet matches the last rule.
    let filter = bench_filter(100);
    let buf = tcp4(Ipv4Addr::new(10, 99, 2, 3), 5555, Ipv4Addr::new(100, 64, 0, 1), 22, TCP_SYN);
    let q = Parsed::decode(&buf);
    c.bench_function("run_in_tcp_syn_100_rules", |b| {
        b.iter(|| black_box(filter.run_in(black_box(&q), RunFlags::NONE)))
    });

    let buf = tcp4(Ipv4Addr::new(10, 1, 2, 3), 5555, Ipv4Addr::new(100, 64, 0, 1), 22, 0x10);
    let q = Parsed::decode(&buf);
    c.bench_function("run_in_tcp_non_syn", |b| {
        b.iter(|| black_box(filter.run_in(black_box(&q), RunFlags::NONE)))
    });
}

fn conntrack_benchmark(c: &mut Criterion) {
    let filter = bench_filter(0);
    let local = Ipv4Addr::new(100, 64, 0, 1);
    let remote = Ipv4Addr::new(8, 8, 8, 8);

    let out = udp4(local, 51820, remote, 53);
    let out_q = Parsed::decode(&out);
    c.bench_function("run_out_udp_record", |b| {
        b.iter(|| black_box(filter.run_out(black_box(&out_q), RunFlags::NONE)))
    });

    filter.run_out(&out_q, RunFlags::NONE);
    let reply = udp4(remote, 53, local, 51820);
    let reply_q = Parsed::decode(&reply);
    c.bench_function("run_in_udp_cached", |b| {
        b.iter(|| black_box(filter.run_in(black_box(&reply_q), RunFlags::NONE)))
    });
}

criterion_group!(benches, decode_benchmark, run_in_benchmark, conntrack_benchmark);
criterion_main!(benches);
