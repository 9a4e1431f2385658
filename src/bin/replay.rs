//! Replay - run a CSV of order intents through the engine.
//!
//! ```csv
//! action,id,side,price,qty,timestamp
//! new,1,buy,100.50,10,2024-03-01T09:30:00Z
//! new,2,sell,100.25,4,
//! cancel,1,,,,
//! ```
//!
//! Prices are decimal and converted to ticks at `--scale`. Prints every
//! trade, the final depth and the state hash (identical input gives an
//! identical hash).

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use relay_lob::{price, Engine, Order, OutputEvent, Side};

#[derive(Parser)]
#[command(name = "replay")]
#[command(about = "Replay a CSV of order intents through the matching engine")]
struct Cli {
    /// CSV file with action,id,side,price,qty[,timestamp] rows
    file: PathBuf,

    /// Decimal places per price tick
    #[arg(long, default_value_t = 2)]
    scale: u32,

    /// Order pool capacity
    #[arg(long, default_value_t = 1_000_000)]
    capacity: u32,

    /// Depth levels to print per side
    #[arg(long, default_value_t = 10)]
    depth: usize,

    /// Print accepted/cancelled/rejected events as well as trades
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    New,
    Cancel,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RowSide {
    #[serde(alias = "bid", alias = "b")]
    Buy,
    #[serde(alias = "ask", alias = "s")]
    Sell,
}

impl From<RowSide> for Side {
    fn from(side: RowSide) -> Self {
        match side {
            RowSide::Buy => Side::Buy,
            RowSide::Sell => Side::Sell,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Row {
    action: Action,
    id: u64,
    side: Option<RowSide>,
    price: Option<Decimal>,
    qty: Option<u32>,
    timestamp: Option<DateTime<Utc>>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut engine = Engine::new(cli.capacity);
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(&cli.file)
        .with_context(|| format!("opening {}", cli.file.display()))?;

    let mut rows = 0u64;
    let mut trades = 0u64;
    let mut last_timestamp: Option<DateTime<Utc>> = None;

    for (line, record) in reader.deserialize::<Row>().enumerate() {
        let row = record.with_context(|| format!("parsing row {}", line + 1))?;
        rows += 1;

        if let Some(ts) = row.timestamp {
            if last_timestamp.is_some_and(|last| ts < last) {
                warn!(row = line + 1, %ts, "timestamp goes backwards, replaying in file order");
            }
            last_timestamp = Some(ts);
        }

        let events = match row.action {
            Action::New => {
                let (Some(side), Some(px), Some(qty)) = (row.side, row.price, row.qty) else {
                    bail!("row {}: new order needs side, price and qty", line + 1);
                };
                let ticks = price::from_decimal(px, cli.scale)
                    .with_context(|| format!("row {}", line + 1))?;
                engine.place(Order::new(row.id, side.into(), ticks, qty))
            }
            Action::Cancel => engine.process_intent(relay_lob::Intent::Cancel(row.id)),
        };

        for event in events {
            match event {
                OutputEvent::Trade(t) => {
                    trades += 1;
                    println!(
                        "TRADE {:>8} @ {:<12} aggressor={} resting={} ({:?})",
                        t.qty,
                        price::to_decimal(t.price, cli.scale).to_string(),
                        t.aggressor_id,
                        t.resting_id,
                        t.aggressor_side,
                    );
                }
                OutputEvent::BookDelta(_) => {}
                other if cli.verbose => println!("{other:?}"),
                other => debug!(?other),
            }
        }
    }

    info!(rows, trades, resting = engine.order_count(), "replay finished");

    let snapshot = engine.depth_snapshot(cli.depth);
    println!("\n=== Final Depth ===");
    println!("{:>14} {:>10} | {:<10} {:<14}", "BID QTY", "BID", "ASK", "ASK QTY");
    for i in 0..snapshot.bids.len().max(snapshot.asks.len()) {
        let bid = snapshot.bids.get(i);
        let ask = snapshot.asks.get(i);
        println!(
            "{:>14} {:>10} | {:<10} {:<14}",
            bid.map(|l| l.qty.to_string()).unwrap_or_default(),
            bid.map(|l| price::to_decimal(l.price, cli.scale).to_string()).unwrap_or_default(),
            ask.map(|l| price::to_decimal(l.price, cli.scale).to_string()).unwrap_or_default(),
            ask.map(|l| l.qty.to_string()).unwrap_or_default(),
        );
    }
    println!("\nState hash: {:016x}", engine.state_hash());

    Ok(())
}
