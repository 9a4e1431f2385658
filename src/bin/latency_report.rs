//! Latency Report - percentile table for order admission.
//!
//! `direct` times `Engine::place` on the calling thread. `pipeline` runs
//! producer threads against a spawned driver and times each `submit`
//! (validate, pool acquire, channel push) plus end-to-end throughput.

use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hdrhistogram::Histogram;
use relay_lob::{spawn, CountingSink, Engine, EngineConfig, Order, RejectReason, Side};
use tracing::info;

#[derive(Parser)]
#[command(name = "latency-report")]
#[command(about = "Measure order admission latency")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Time the matching path in isolation
    Direct {
        #[arg(long, default_value_t = 1_000_000)]
        iterations: u64,
        #[arg(long, default_value_t = 100_000)]
        capacity: u32,
    },

    /// Time submissions through the channel and driver thread
    Pipeline {
        #[arg(long, default_value_t = 4)]
        producers: usize,
        #[arg(long, default_value_t = 250_000)]
        per_producer: u64,
        /// Optional TOML engine config
        #[arg(long)]
        config: Option<std::path::PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match Cli::parse().command {
        Commands::Direct { iterations, capacity } => run_direct(iterations, capacity),
        Commands::Pipeline { producers, per_producer, config } => {
            let config = match config {
                Some(path) => EngineConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => EngineConfig::default(),
            };
            run_pipeline(config, producers, per_producer)
        }
    }
}

fn new_histogram() -> Result<Histogram<u64>> {
    Histogram::<u64>::new_with_bounds(1, 1_000_000, 3).context("creating histogram")
}

fn run_direct(iterations: u64, capacity: u32) -> Result<()> {
    let mut engine = Engine::new(capacity);
    engine.warm_up();
    let mut histogram = new_histogram()?;

    info!(iterations, capacity, "running direct benchmark");

    let mut total = Duration::ZERO;
    for order_id in 1..=iterations {
        let order = Order::new(
            order_id,
            if order_id % 2 == 0 { Side::Buy } else { Side::Sell },
            10000 + (order_id % 100),
            10,
        );

        // Critical measurement section
        let start = Instant::now();
        std::hint::black_box(engine.place(order));
        let elapsed = start.elapsed();

        histogram.saturating_record(elapsed.as_nanos() as u64);
        total += elapsed;
    }

    print_report("Direct", iterations, total, &histogram);
    Ok(())
}

fn run_pipeline(config: EngineConfig, producers: usize, per_producer: u64) -> Result<()> {
    info!(producers, per_producer, ?config, "running pipeline benchmark");

    let handle = spawn(config, CountingSink::default())?;
    let barrier = Arc::new(Barrier::new(producers + 1));

    let workers: Vec<_> = (0..producers)
        .map(|p| {
            let submitter = handle.submitter();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || -> Result<(Histogram<u64>, u64)> {
                let mut histogram = new_histogram()?;
                let mut retries = 0u64;
                barrier.wait();

                for i in 0..per_producer {
                    let side = if (i + p as u64) % 2 == 0 { Side::Buy } else { Side::Sell };
                    let price = 10000 + (i % 100);
                    loop {
                        let start = Instant::now();
                        let result = submitter.submit(side, price, 10);
                        let elapsed = start.elapsed();
                        match result {
                            Ok(_) => {
                                histogram.saturating_record(elapsed.as_nanos() as u64);
                                break;
                            }
                            Err(RejectReason::ChannelFull | RejectReason::PoolExhausted) => {
                                retries += 1;
                                std::hint::spin_loop();
                            }
                            Err(reason) => anyhow::bail!("unexpected rejection: {reason}"),
                        }
                    }
                }
                Ok((histogram, retries))
            })
        })
        .collect();

    barrier.wait();
    let started = Instant::now();

    let mut histogram = new_histogram()?;
    let mut retries = 0;
    for worker in workers {
        let (h, r) = worker
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))??;
        histogram.add(&h).context("merging histograms")?;
        retries += r;
    }

    let (engine, stats) = handle.shutdown()?;
    let elapsed = started.elapsed();

    print_report("Submit", stats.intents, elapsed, &histogram);
    println!("Backpressure retries: {retries}");
    println!("Trades: {}  Resting: {}  Batches: {}", stats.events.trades, engine.order_count(), stats.batches);
    Ok(())
}

fn print_report(label: &str, ops: u64, total: Duration, histogram: &Histogram<u64>) {
    println!("\n=== {label} Latency Report (ns) ===");
    println!("Total Ops:  {ops}");
    println!("Throughput: {:.2} ops/sec", ops as f64 / total.as_secs_f64());
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");

    println!("\nDistribution:");
    let mut lower = 0;
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("{:8} ns - {:8} ns: {:10}", lower, v.value_iterated_to(), count);
        }
        lower = v.value_iterated_to() + 1;
    }
}
