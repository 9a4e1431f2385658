//! Fuzz Test - Compares the engine against a reference implementation.
//!
//! Uses a naive but correct reference implementation to verify the engine
//! produces identical trades and resting depth, and checks the book-wide
//! properties (no crossed book, fills at the resting price, quantity
//! conservation) after every operation.

use relay_lob::{Engine, Intent, Order, OrderId, OutputEvent, Price, Side, TradeEvent};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};

/// Simple reference implementation for verification
struct ReferenceBook {
    bids: BTreeMap<u64, Vec<(u64, u32)>>, // price -> [(order_id, qty)]
    asks: BTreeMap<u64, Vec<(u64, u32)>>,
    orders: HashMap<u64, (Side, u64)>, // order_id -> (side, price)
}

impl ReferenceBook {
    fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
        }
    }

    fn best_bid(&self) -> Option<(u64, u64)> {
        self.bids
            .iter()
            .next_back()
            .map(|(&p, v)| (p, v.iter().map(|o| o.1 as u64).sum()))
    }

    fn best_ask(&self) -> Option<(u64, u64)> {
        self.asks
            .iter()
            .next()
            .map(|(&p, v)| (p, v.iter().map(|o| o.1 as u64).sum()))
    }

    /// Returns (resting_id, price, qty) for each fill
    fn place(&mut self, order_id: u64, side: Side, price: u64, mut qty: u32) -> Vec<(u64, u64, u32)> {
        let mut fills = Vec::new();

        let crossing: Vec<u64> = match side {
            Side::Buy => self.asks.range(..=price).map(|(&p, _)| p).collect(),
            Side::Sell => self.bids.range(price..).rev().map(|(&p, _)| p).collect(),
        };
        let opposite = match side {
            Side::Buy => &mut self.asks,
            Side::Sell => &mut self.bids,
        };

        for level_price in crossing {
            if qty == 0 {
                break;
            }
            let orders = opposite.get_mut(&level_price).unwrap();
            while !orders.is_empty() && qty > 0 {
                let trade_qty = orders[0].1.min(qty);
                orders[0].1 -= trade_qty;
                qty -= trade_qty;
                fills.push((orders[0].0, level_price, trade_qty));

                if orders[0].1 == 0 {
                    let (maker_id, _) = orders.remove(0);
                    self.orders.remove(&maker_id);
                }
            }
            if orders.is_empty() {
                opposite.remove(&level_price);
            }
        }

        // Rest
        if qty > 0 {
            let own = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            own.entry(price).or_default().push((order_id, qty));
            self.orders.insert(order_id, (side, price));
        }

        fills
    }

    fn cancel(&mut self, order_id: u64) -> bool {
        let Some((side, price)) = self.orders.remove(&order_id) else {
            return false;
        };
        let book = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if let Some(orders) = book.get_mut(&price) {
            orders.retain(|(id, _)| *id != order_id);
            if orders.is_empty() {
                book.remove(&price);
            }
        }
        true
    }

    fn depth(&self, side: Side) -> Vec<(u64, u64)> {
        let level = |(&p, v): (&u64, &Vec<(u64, u32)>)| (p, v.iter().map(|o| o.1 as u64).sum());
        match side {
            Side::Buy => self.bids.iter().rev().map(level).collect(),
            Side::Sell => self.asks.iter().map(level).collect(),
        }
    }

    fn order_count(&self) -> usize {
        self.orders.len()
    }
}

fn generate_order(rng: &mut ChaCha8Rng, order_id: u64) -> Order {
    Order::new(
        order_id,
        if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
        rng.gen_range(9800..10200) * 100,
        rng.gen_range(1..200),
    )
}

fn trades(events: &[OutputEvent]) -> Vec<TradeEvent> {
    events
        .iter()
        .filter_map(|e| if let OutputEvent::Trade(t) = e { Some(*t) } else { None })
        .collect()
}

#[test]
fn test_fuzz_best_prices() {
    const SEED: u64 = 0xFEEDFACE;
    const OPS: usize = 10_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = Engine::new(100_000);
    let mut reference = ReferenceBook::new();

    let mut next_order_id = 1u64;
    let mut active_orders: Vec<u64> = Vec::new();

    for i in 0..OPS {
        // 70% place, 30% cancel
        if active_orders.is_empty() || rng.gen_bool(0.7) {
            let order = generate_order(&mut rng, next_order_id);
            next_order_id += 1;

            engine.place(order);
            reference.place(order.id, order.side, order.price, order.qty);
            active_orders.push(order.id);
        } else {
            let idx = rng.gen_range(0..active_orders.len());
            let order_id = active_orders.swap_remove(idx);

            let found = engine.cancel(order_id).is_ok();
            assert_eq!(found, reference.cancel(order_id), "Cancel outcome mismatch at op {}", i);
        }

        assert_eq!(engine.best_bid(), reference.best_bid(), "Best bid mismatch at op {}", i);
        assert_eq!(engine.best_ask(), reference.best_ask(), "Best ask mismatch at op {}", i);
    }

    println!("Fuzz test passed!");
    println!("  Operations: {}", OPS);
    println!(
        "  Final order count - Engine: {}, Reference: {}",
        engine.order_count(),
        reference.order_count()
    );
}

#[test]
fn test_fuzz_trades_and_depth() {
    const SEED: u64 = 0x12345678;
    const OPS: usize = 5_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = Engine::new(100_000);
    let mut reference = ReferenceBook::new();

    for i in 0..OPS {
        let order = generate_order(&mut rng, i as u64 + 1);

        let events = engine.place(order);
        let expected = reference.place(order.id, order.side, order.price, order.qty);

        let actual: Vec<_> = trades(&events)
            .iter()
            .map(|t| (t.resting_id, t.price, t.qty))
            .collect();
        assert_eq!(actual, expected, "Fill sequence mismatch at op {}", i);

        if i % 100 == 0 {
            let snapshot = engine.depth_snapshot(usize::MAX);
            for side in [Side::Buy, Side::Sell] {
                let levels = match side {
                    Side::Buy => &snapshot.bids,
                    Side::Sell => &snapshot.asks,
                };
                let actual: Vec<_> = levels.iter().map(|l| (l.price, l.qty)).collect();
                assert_eq!(actual, reference.depth(side), "{side:?} depth mismatch at op {}", i);
            }
            engine.check_invariants();
        }
    }

    assert_eq!(engine.order_count(), reference.order_count());
}

#[test]
fn test_fuzz_book_properties() {
    const SEED: u64 = 0xBADC0DE;
    const OPS: usize = 8_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = Engine::new(100_000);

    // order_id -> (side, limit, submitted qty)
    let mut submitted: HashMap<OrderId, (Side, Price, u64)> = HashMap::new();
    let mut traded: HashMap<OrderId, u64> = HashMap::new();
    let mut cancelled: HashMap<OrderId, u64> = HashMap::new();
    let mut placed: Vec<OrderId> = Vec::new();
    let mut next_order_id = 1u64;

    for i in 0..OPS {
        let events = if placed.is_empty() || rng.gen_bool(0.65) {
            let order = generate_order(&mut rng, next_order_id);
            next_order_id += 1;
            submitted.insert(order.id, (order.side, order.price, order.qty as u64));
            placed.push(order.id);
            engine.place(order)
        } else {
            // Any previously placed id, including filled or cancelled ones
            let order_id = placed[rng.gen_range(0..placed.len())];
            let before = engine.state_hash();
            let events = engine.process_intent(Intent::Cancel(order_id));
            if matches!(events[0], OutputEvent::Rejected(_)) {
                assert_eq!(engine.state_hash(), before, "Failed cancel mutated state at op {}", i);
            }
            events
        };

        for event in &events {
            match event {
                OutputEvent::Trade(t) => {
                    let (aggressor_side, aggressor_limit, _) = submitted[&t.aggressor_id];
                    let (resting_side, resting_limit, _) = submitted[&t.resting_id];

                    assert_eq!(t.price, resting_limit, "Fill away from resting price at op {}", i);
                    assert_eq!(aggressor_side, t.aggressor_side);
                    assert_eq!(resting_side, aggressor_side.opposite());
                    match aggressor_side {
                        Side::Buy => assert!(aggressor_limit >= t.price),
                        Side::Sell => assert!(aggressor_limit <= t.price),
                    }

                    *traded.entry(t.aggressor_id).or_default() += t.qty as u64;
                    *traded.entry(t.resting_id).or_default() += t.qty as u64;
                }
                OutputEvent::Cancelled(c) => {
                    assert!(cancelled.insert(c.order_id, c.cancelled_qty as u64).is_none());
                }
                _ => {}
            }
        }

        if let (Some((bid, _)), Some((ask, _))) = (engine.best_bid(), engine.best_ask()) {
            assert!(bid < ask, "Crossed book at op {}", i);
        }
    }

    engine.check_invariants();

    // Quantity conservation: submitted = traded + resting + cancelled
    for (order_id, &(side, price, qty)) in &submitted {
        let resting: u64 = engine
            .matcher()
            .level_orders(side, price)
            .iter()
            .filter(|(id, _)| id == order_id)
            .map(|&(_, q)| q as u64)
            .sum();
        let filled = traded.get(order_id).copied().unwrap_or(0);
        let killed = cancelled.get(order_id).copied().unwrap_or(0);
        assert_eq!(qty, filled + resting + killed, "Quantity leak for order {}", order_id);
    }

    assert_eq!(engine.pool().live() as usize, engine.order_count());
    println!("Property fuzz passed: {} orders, {} resting", submitted.len(), engine.order_count());
}
