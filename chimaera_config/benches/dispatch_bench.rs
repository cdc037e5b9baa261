//! Dispatcher micro-benchmark.
//!
//! Measures one packet from decode to framed reply:
//! - query of a scalar setting
//! - three-float set with validation
//! - introspection with JSON serialization
//! - packet rejected at the range check

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chimaera_common::osc::{OscArg, OscMessage};
use chimaera_config::dispatch::Dispatcher;
use chimaera_config::reply::Outbox;
use chimaera_config::sim::sim_context;

fn packet(path: &str, args: Vec<OscArg>) -> Vec<u8> {
    let mut full = vec![OscArg::Int(1)];
    full.extend(args);
    OscMessage::new(path, full).to_bytes().unwrap()
}

fn bench_packet(c: &mut Criterion, name: &str, bytes: Vec<u8>) {
    let (mut ctx, ports) = sim_context();
    let dispatcher = Dispatcher::with_defaults();
    let mut out = Outbox::new();

    c.bench_function(name, |b| {
        b.iter(|| {
            dispatcher.dispatch_packet(&mut ctx, black_box(&bytes), &mut out);
            let sent = ctx.flush(&mut out);
            ports.net.clear_sent();
            sent
        });
    });
}

fn bench_query(c: &mut Criterion) {
    bench_packet(c, "dispatch_query_rate", packet("/chimaera/rate", vec![]));
}

fn bench_set_curve(c: &mut Criterion) {
    let args = vec![OscArg::Float(0.77), OscArg::Float(0.23), OscArg::Float(0.0)];
    bench_packet(c, "dispatch_set_curve", packet("/chimaera/curve", args));
}

fn bench_introspection(c: &mut Criterion) {
    bench_packet(c, "dispatch_describe_append", packet("/chimaera/custom/append!", vec![]));
}

fn bench_rejected(c: &mut Criterion) {
    bench_packet(c, "dispatch_out_of_range", packet("/chimaera/rate", vec![OscArg::Int(-1)]));
}

criterion_group!(
    benches,
    bench_query,
    bench_set_curve,
    bench_introspection,
    bench_rejected,
);
criterion_main!(benches);
