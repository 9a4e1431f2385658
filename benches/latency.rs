//! Benchmark harness using Criterion for latency measurement.
//!
//! Measures:
//! - Place order (no match)
//! - Place order (full match)
//! - Cancel order
//! - Mixed workload

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use relay_lob::{Engine, Intent, Order, Side};

/// Generate a random limit order
fn random_order(rng: &mut ChaCha8Rng, order_id: u64) -> Order {
    Order::new(
        order_id,
        if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
        rng.gen_range(9900..10100) * 100, // 990.00 to 1010.00
        rng.gen_range(1..1000),
    )
}

/// Benchmark: Place order that rests (no matching)
fn bench_place_no_match(c: &mut Criterion) {
    let mut engine = Engine::new(1 << 24);
    engine.warm_up();

    let mut order_id = 0u64;

    c.bench_function("place_no_match", |b| {
        b.iter(|| {
            order_id += 1;
            // Below any asks
            black_box(engine.place(Order::new(order_id, Side::Buy, 9000, 100)))
        })
    });
}

/// Benchmark: Place order that fully matches
fn bench_place_full_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("place_full_match");

    for depth in [1u64, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let mut engine = Engine::new(100_000);
            engine.warm_up();

            // Pre-populate with resting orders
            for i in 0..depth {
                engine.place(Order::new(i, Side::Sell, 10000, 100));
            }

            let mut order_id = 1000u64;

            b.iter(|| {
                order_id += 1;
                let result = engine.place(Order::new(order_id, Side::Buy, 10000, 100));

                // Replenish the matched order
                engine.place(Order::new(order_id + 1_000_000_000, Side::Sell, 10000, 100));

                black_box(result)
            })
        });
    }

    group.finish();
}

/// Benchmark: Cancel order
fn bench_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("cancel");

    for book_size in [100u64, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(book_size), book_size, |b, &book_size| {
            let mut engine = Engine::new(100_000);
            engine.warm_up();

            let side_of = |id: u64| if id % 2 == 0 { Side::Buy } else { Side::Sell };
            let price_of = |id: u64| match side_of(id) {
                Side::Buy => 9000 + (id % 100) * 10,
                Side::Sell => 11000 + (id % 100) * 10,
            };

            // Pre-populate book
            for i in 0..book_size {
                engine.place(Order::new(i, side_of(i), price_of(i), 100));
            }

            let mut cancel_id = 0u64;
            let mut next_order_id = book_size;

            b.iter(|| {
                let result = engine.process_intent(Intent::Cancel(cancel_id));

                // Replenish on the same side
                engine.place(Order::new(
                    next_order_id,
                    side_of(cancel_id),
                    price_of(cancel_id),
                    100,
                ));

                cancel_id += 1;
                next_order_id += 1;

                black_box(result)
            })
        });
    }

    group.finish();
}

/// Benchmark: Mixed workload (realistic trading scenario)
fn bench_mixed_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_workload");

    // 70% place, 30% cancel
    group.bench_function("70_place_30_cancel", |b| {
        let mut engine = Engine::new(1 << 22);
        engine.warm_up();

        let mut rng = ChaCha8Rng::seed_from_u64(0xDEADBEEF);
        let mut order_id = 0u64;

        // Pre-populate
        for _ in 0..1000 {
            order_id += 1;
            engine.place(random_order(&mut rng, order_id));
        }

        b.iter(|| {
            if rng.gen_bool(0.7) {
                order_id += 1;
                black_box(engine.place(random_order(&mut rng, order_id)))
            } else {
                // Random earlier order, possibly already gone
                let cancel_id = rng.gen_range(1..=order_id);
                black_box(engine.process_intent(Intent::Cancel(cancel_id)))
            }
        })
    });

    group.finish();
}

/// Benchmark: Throughput (orders per second)
fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    group.throughput(criterion::Throughput::Elements(1000));

    group.bench_function("1000_orders", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(0xCAFEBABE);

        b.iter_batched(
            || {
                let orders: Vec<_> = (0..1000).map(|i| random_order(&mut rng, i)).collect();
                (Engine::new(2_000), orders)
            },
            |(mut engine, orders)| {
                for order in orders {
                    black_box(engine.place(order));
                }
                engine
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_place_no_match,
    bench_place_full_match,
    bench_cancel,
    bench_mixed_workload,
    bench_throughput,
);

criterion_main!(benches);
