//! Benchmark for route discovery throughput.
//!
//! Measures the cost of the RREQ replacement rule under growing routing
//! tables, the scoring function itself, and wire frame encode/parse —
//! the three hot paths a flood of RREQs drives on every node.

use aodv_mesh::config::RoutingWeights;
use aodv_mesh::coordinate::Coordinate;
use aodv_mesh::frame::{ControlFields, Frame};
use aodv_mesh::identity::NodeId;
use aodv_mesh::routing_table::{Candidate, RoutingTable};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

fn candidate(next_hop: NodeId, seq_no: u64, hop: u32, distance: f64, score: f64) -> Candidate {
    Candidate {
        next_hop,
        seq_no,
        hop,
        distance,
        power: 5.0,
        score,
    }
}

/// Populate a table with `n` distinct destinations, each already holding one
/// route, so replacement attempts land on an existing entry rather than the
/// cheaper "no route yet" path.
fn seeded_table(n: usize) -> RoutingTable {
    let mut table = RoutingTable::new();
    for i in 0..n {
        let dest = NodeId::new(format!("node_{i}"));
        table.apply_rreq_candidate(dest, candidate(NodeId::new("seed"), 1, 1, 10.0, -10.5));
    }
    table
}

fn bench_rreq_replacement(c: &mut Criterion) {
    let mut group = c.benchmark_group("rreq_replacement");

    for size in [10usize, 100, 1_000, 10_000].iter() {
        let n = *size;
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("existing_table", n), &n, |b, &n| {
            let mut table = seeded_table(n);
            let mut rng = rand::thread_rng();
            b.iter(|| {
                let idx = rng.gen_range(0..n);
                let dest = NodeId::new(format!("node_{idx}"));
                let outcome = table.apply_rreq_candidate(
                    dest,
                    candidate(NodeId::new("challenger"), 2, 1, 5.0, -5.5),
                );
                black_box(outcome);
            });
        });
    }

    group.finish();
}

fn bench_scoring(c: &mut Criterion) {
    let weights = RoutingWeights::default_weights();
    c.bench_function("score_computation", |b| {
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let distance = rng.gen_range(0.0..500.0);
            let hop = rng.gen_range(0..30);
            let power = rng.gen_range(0.0..5.0);
            black_box(weights.score(distance, hop, power));
        });
    });
}

fn bench_frame_round_trip(c: &mut Criterion) {
    let control = ControlFields {
        seq: 42,
        origin: NodeId::new("127.0.0.1:9000"),
        sender: NodeId::new("127.0.0.1:9001"),
        dest: NodeId::new("127.0.0.1:9002"),
        coord: Coordinate::new(12.5, 7.0),
        hop: 3,
        dist: 21.4,
        power: 2.5,
    };
    let frame = Frame::Rreq(control);
    let encoded = frame.encode();
    let line = encoded.trim_end_matches("\r\n").to_string();

    let mut group = c.benchmark_group("frame_codec");
    group.bench_function("encode", |b| {
        b.iter(|| black_box(frame.encode()));
    });
    group.bench_function("parse", |b| {
        b.iter(|| black_box(Frame::parse(&line).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_rreq_replacement, bench_scoring, bench_frame_round_trip);
criterion_main!(benches);
