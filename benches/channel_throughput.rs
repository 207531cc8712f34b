// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Channel throughput benchmarks.
//
// Run with:
//   cargo bench --bench channel_throughput
//
// Groups:
//   ping_pong        — one request, one reply, both sides draining
//                      immediately (single outstanding message at a time)
//   burst            — N requests pushed back-to-back before the responder
//                      drains, measuring queue + signalling overhead under
//                      load where coalescing should suppress most signals
//   same_thread      — the same-thread short-circuit, as a baseline with no
//                      queue or control-plane traffic at all

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use fr_channel::{Channel, ChannelConfig, Envelope, LocalControlPlane};

fn new_channel(config: ChannelConfig) -> std::sync::Arc<Channel<Envelope<u32>>> {
    let requestor_control = LocalControlPlane::new();
    let responder_control = LocalControlPlane::new();
    Channel::create(1, requestor_control, responder_control, config)
}

fn bench_ping_pong(c: &mut Criterion) {
    let channel = new_channel(ChannelConfig::new());
    channel.set_recv_request(|_msg| {});
    channel.set_recv_reply(|_msg| {});

    c.bench_function("ping_pong", |b| {
        b.iter(|| {
            channel.send_request(Envelope::new(black_box(1))).unwrap();
            channel.recv_request();
            channel.send_reply(Envelope::new(black_box(2))).unwrap();
            channel.recv_reply();
        });
    });
}

fn bench_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("burst");

    for &batch in &[16usize, 128, 512] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            let channel = new_channel(ChannelConfig::new().queue_capacity(1024));
            channel.set_recv_request(|_msg| {});
            channel.set_recv_reply(|_msg| {});

            b.iter(|| {
                for i in 0..batch {
                    channel.send_request(Envelope::new(i as u32)).unwrap();
                }
                while channel.recv_request() {}
                for i in 0..batch {
                    channel.send_reply(Envelope::new(i as u32)).unwrap();
                }
                while channel.recv_reply() {}
            });
        });
    }

    group.finish();
}

fn bench_same_thread(c: &mut Criterion) {
    let channel = new_channel(ChannelConfig::new().same_thread(true));
    channel.set_recv_request(|_msg| {});

    c.bench_function("same_thread", |b| {
        b.iter(|| {
            channel.send_request(Envelope::new(black_box(1))).unwrap();
        });
    });
}

criterion_group!(benches, bench_ping_pong, bench_burst, bench_same_thread);
criterion_main!(benches);
