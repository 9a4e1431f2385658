//! Extended Benchmark Suite - Component and pipeline measurements.
//!
//! Includes:
//! - Matching across multiple price levels
//! - Book depth impact on performance
//! - Tight-spread workload
//! - Pool acquire/release and channel push/pop in isolation
//! - Driver batch draining

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use relay_lob::{
    bounded, Driver, Engine, EngineConfig, Intent, NullSink, Order, OrderPool, Side, Submitter,
};
use std::sync::Arc;

/// Benchmark: Match across multiple price levels
fn bench_multi_level_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_level_match");

    for levels in [1u64, 5, 10, 20].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(levels), levels, |b, &levels| {
            let mut engine = Engine::new(100_000);
            engine.warm_up();

            // Ten orders of 10 at each level
            for i in 0..levels {
                for j in 0..10 {
                    engine.place(Order::new(i * 10 + j, Side::Sell, 10000 + i * 10, 10));
                }
            }

            let mut order_id = 1_000_000u64;

            b.iter(|| {
                order_id += 1;
                // One order per level
                let result = engine.place(Order::new(
                    order_id,
                    Side::Buy,
                    10000 + (levels - 1) * 10,
                    levels as u32 * 10,
                ));

                for i in 0..levels {
                    order_id += 1;
                    engine.place(Order::new(order_id, Side::Sell, 10000 + i * 10, 10));
                }

                black_box(result)
            })
        });
    }

    group.finish();
}

/// Benchmark: Impact of book depth on order placement
fn bench_book_depth_impact(c: &mut Criterion) {
    let mut group = c.benchmark_group("book_depth_place");

    for depth in [100u64, 1_000, 10_000, 50_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let mut engine = Engine::new(1 << 23);
            engine.warm_up();

            for i in 0..depth {
                let (side, price) = if i % 2 == 0 {
                    (Side::Buy, 9000 + (i % 100) * 10)
                } else {
                    (Side::Sell, 11000 + (i % 100) * 10)
                };
                engine.place(Order::new(i, side, price, 100));
            }

            let mut order_id = depth;

            b.iter(|| {
                order_id += 1;
                // Won't match
                black_box(engine.place(Order::new(order_id, Side::Buy, 8000, 100)))
            })
        });
    }

    group.finish();
}

/// Benchmark: High-frequency realistic workload
fn bench_realistic_hft(c: &mut Criterion) {
    let mut group = c.benchmark_group("realistic_hft");

    // Tight spread, many cancels
    group.bench_function("tight_spread_workload", |b| {
        let mut engine = Engine::new(1 << 22);
        engine.warm_up();

        let mut rng = ChaCha8Rng::seed_from_u64(0xCAFEBABE);

        for i in 0..500 {
            engine.place(Order::new(i, Side::Buy, 9990 + i % 10, 100)); // 9990-9999
            engine.place(Order::new(500 + i, Side::Sell, 10001 + i % 10, 100)); // 10001-10010
        }

        let mut order_id = 1000u64;

        b.iter(|| {
            let op = rng.gen_range(0..100);

            let result = if op < 40 {
                order_id += 1;
                engine.place(Order::new(
                    order_id,
                    Side::Buy,
                    9990 + rng.gen_range(0..12),
                    rng.gen_range(10..200),
                ))
            } else if op < 80 {
                order_id += 1;
                engine.place(Order::new(
                    order_id,
                    Side::Sell,
                    9999 + rng.gen_range(0..12),
                    rng.gen_range(10..200),
                ))
            } else {
                engine.process_intent(Intent::Cancel(rng.gen_range(0..order_id)))
            };

            black_box(result)
        })
    });

    group.finish();
}

/// Benchmark: Pool slot turnover, uncontended
fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool");
    let pool = OrderPool::new(1024);
    let order = Order::new(1, Side::Buy, 10000, 100);

    group.bench_function("acquire_write_release", |b| {
        b.iter(|| {
            let mut slot = pool.acquire().unwrap();
            pool.write(&mut slot, black_box(&order));
            pool.release(slot).unwrap();
        })
    });

    group.finish();
}

/// Benchmark: Ingestion channel round trip on one thread
fn bench_channel(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel");
    let (producer, mut consumer) = bounded::<u64>(1024).unwrap();

    group.bench_function("push_pop", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            producer.try_push(black_box(n)).unwrap();
            black_box(consumer.try_pop())
        })
    });

    group.finish();
}

/// Benchmark: Driver draining a full channel in batches
fn bench_driver_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("driver_batches");
    const INTENTS: u64 = 4096;
    group.throughput(Throughput::Elements(INTENTS));

    for batch_size in [16usize, 256, 4096].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let config = EngineConfig {
                    pool_capacity: 1 << 20,
                    channel_capacity: INTENTS as usize,
                    batch_size,
                    ..EngineConfig::default()
                };
                let pool = Arc::new(OrderPool::with_config(config.pool_config()));
                let (producer, consumer) = bounded(config.channel_capacity).unwrap();
                let submitter = Submitter::new(producer, Arc::clone(&pool));
                let mut driver = Driver::new(Engine::with_pool(pool), consumer, NullSink, &config);

                let mut rng = ChaCha8Rng::seed_from_u64(0x12345678);

                b.iter(|| {
                    for _ in 0..INTENTS {
                        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
                        // Crossing range keeps the resting book small
                        submitter.submit(side, rng.gen_range(9990..10010), 10).unwrap();
                    }
                    while driver.run_once() > 0 {}
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    extended_benches,
    bench_multi_level_match,
    bench_book_depth_impact,
    bench_realistic_hft,
    bench_pool,
    bench_channel,
    bench_driver_batches,
);

criterion_main!(extended_benches);
