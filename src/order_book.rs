//! Order Book - The central limit order book data structure.
//!
//! Each side is a `BTreeMap` from price to [`PriceLevel`], so the best
//! price is the map's first (asks) or last (bids) key and depth walks come
//! out already sorted. An `FxHashMap` from order ID to location gives O(1)
//! cancel lookup.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::command::{OrderId, Price, Side};
use crate::pool::{BookSlots, SlotIndex, NULL_INDEX};
use crate::price_level::PriceLevel;

/// Where a resting order lives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderInfo {
    /// Pool slot holding the order node
    pub slot: SlotIndex,
    /// Order side (needed for cancel to find correct book side)
    pub side: Side,
    /// Price level (needed for cancel to find the PriceLevel)
    pub price: Price,
}

/// Aggregate of one price level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelDepth {
    pub price: Price,
    /// Total remaining quantity
    pub qty: u64,
    /// Number of resting orders
    pub orders: u32,
}

/// Price-time priority order book for one instrument.
pub struct OrderBook {
    /// Bid price levels (buy orders), best = highest key
    bids: BTreeMap<Price, PriceLevel>,
    /// Ask price levels (sell orders), best = lowest key
    asks: BTreeMap<Price, PriceLevel>,
    /// Order lookup map: OrderId -> OrderInfo
    order_map: FxHashMap<OrderId, OrderInfo>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            order_map: FxHashMap::default(),
        }
    }

    /// Create a new order book with the ID index pre-sized
    pub fn with_capacity(orders: usize) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            order_map: FxHashMap::with_capacity_and_hasher(orders, Default::default()),
        }
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Highest buy price
    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    /// Lowest sell price
    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    #[inline]
    pub fn best_price(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.best_bid(),
            Side::Sell => self.best_ask(),
        }
    }

    /// Get the best opposite price (for matching)
    #[inline]
    pub fn best_opposite_price(&self, side: Side) -> Option<Price> {
        self.best_price(side.opposite())
    }

    /// Best level on a side with its price
    #[inline]
    pub fn best_level(&self, side: Side) -> Option<(Price, &PriceLevel)> {
        let entry = match side {
            Side::Buy => self.bids.iter().next_back(),
            Side::Sell => self.asks.iter().next(),
        };
        entry.map(|(&price, level)| (price, level))
    }

    // ========================================================================
    // Level Access
    // ========================================================================

    #[inline]
    fn side_map(&self, side: Side) -> &BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    #[inline]
    fn side_map_mut(&mut self, side: Side) -> &mut BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    #[inline]
    pub fn get_level(&self, side: Side, price: Price) -> Option<&PriceLevel> {
        self.side_map(side).get(&price)
    }

    #[inline]
    pub(crate) fn get_level_mut(&mut self, side: Side, price: Price) -> Option<&mut PriceLevel> {
        self.side_map_mut(side).get_mut(&price)
    }

    #[inline]
    pub(crate) fn get_or_create_level(&mut self, side: Side, price: Price) -> &mut PriceLevel {
        self.side_map_mut(side).entry(price).or_insert_with(PriceLevel::new)
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Rest an order at the tail of its level.
    ///
    /// Returns `false` (and leaves the book untouched) if `order_id` is
    /// already live.
    pub(crate) fn add_order(
        &mut self,
        slots: &mut BookSlots,
        order_id: OrderId,
        side: Side,
        price: Price,
        slot: SlotIndex,
    ) -> bool {
        if self.order_map.contains_key(&order_id) {
            return false;
        }

        self.order_map.insert(order_id, OrderInfo { slot, side, price });
        self.get_or_create_level(side, price).push_back(slots, slot);
        true
    }

    /// Unlink an order from its level and the ID index (for cancel).
    ///
    /// The slot is NOT released; caller must do that.
    ///
    /// # Panics
    /// If the ID index points at a level that does not exist.
    pub(crate) fn remove_order(
        &mut self,
        slots: &mut BookSlots,
        order_id: OrderId,
    ) -> Option<OrderInfo> {
        let info = self.order_map.remove(&order_id)?;

        let Some(level) = self.get_level_mut(info.side, info.price) else {
            panic!(
                "order {order_id} indexed at {:?} {} but no such level",
                info.side, info.price
            );
        };

        if level.remove(slots, info.slot) {
            self.remove_empty_level(info.side, info.price);
        }

        Some(info)
    }

    #[inline]
    pub fn get_order(&self, order_id: OrderId) -> Option<&OrderInfo> {
        self.order_map.get(&order_id)
    }

    #[inline]
    pub fn contains_order(&self, order_id: OrderId) -> bool {
        self.order_map.contains_key(&order_id)
    }

    /// Remove an order from the order map only (after matching).
    /// Call this when an order is fully filled during matching.
    #[inline]
    pub(crate) fn remove_order_from_map(&mut self, order_id: OrderId) {
        self.order_map.remove(&order_id);
    }

    /// Drop a level that has just become empty.
    #[inline]
    pub(crate) fn remove_empty_level(&mut self, side: Side, price: Price) {
        let removed = self.side_map_mut(side).remove(&price);
        debug_assert!(removed.map_or(true, |level| level.is_empty()));
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn order_count(&self) -> usize {
        self.order_map.len()
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order_map.is_empty()
    }

    /// Calculate spread (best_ask - best_bid)
    pub fn spread(&self) -> Option<u64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    /// Get depth at a price level as (total qty, order count)
    pub fn depth_at(&self, side: Side, price: Price) -> (u64, u32) {
        self.get_level(side, price)
            .map(|l| (l.total_qty, l.count))
            .unwrap_or((0, 0))
    }

    /// Up to `limit` levels of one side, best price first.
    pub fn depth(&self, side: Side, limit: usize) -> Vec<LevelDepth> {
        let to_depth = |(&price, level): (&Price, &PriceLevel)| LevelDepth {
            price,
            qty: level.total_qty,
            orders: level.count,
        };
        match side {
            Side::Buy => self.bids.iter().rev().take(limit).map(to_depth).collect(),
            Side::Sell => self.asks.iter().take(limit).map(to_depth).collect(),
        }
    }

    /// Levels of one side, best price first.
    pub fn levels(&self, side: Side) -> Box<dyn Iterator<Item = (Price, &PriceLevel)> + '_> {
        match side {
            Side::Buy => Box::new(self.bids.iter().rev().map(|(&p, l)| (p, l))),
            Side::Sell => Box::new(self.asks.iter().map(|(&p, l)| (p, l))),
        }
    }

    /// Walk every level and the ID index; panic on any inconsistency.
    pub(crate) fn check_invariants(&self, slots: &BookSlots) {
        let mut indexed = 0usize;

        for side in [Side::Buy, Side::Sell] {
            for (&price, level) in self.side_map(side) {
                assert!(!level.is_empty(), "empty {side:?} level left at {price}");

                let mut count = 0u32;
                let mut qty = 0u64;
                let mut prev = NULL_INDEX;
                let mut last_sequence = None;

                for index in level.iter(slots) {
                    let node = slots.get(index);
                    assert_eq!(node.prev, prev, "broken back link at {side:?} {price}");
                    assert_eq!(node.price, price, "order {} on wrong level", node.order_id);
                    assert_eq!(node.side, side, "order {} on wrong side", node.order_id);
                    assert!(node.qty > 0, "order {} resting with zero qty", node.order_id);
                    assert!(
                        last_sequence.map_or(true, |s| node.sequence > s),
                        "FIFO order broken at {side:?} {price}"
                    );
                    assert_eq!(
                        self.order_map.get(&node.order_id),
                        Some(&OrderInfo { slot: index, side, price }),
                        "order {} missing from id index",
                        node.order_id
                    );

                    last_sequence = Some(node.sequence);
                    prev = index;
                    count += 1;
                    qty += node.qty as u64;
                }

                assert_eq!(level.tail, prev, "tail mismatch at {side:?} {price}");
                assert_eq!(level.count, count, "count mismatch at {side:?} {price}");
                assert_eq!(level.total_qty, qty, "qty mismatch at {side:?} {price}");
                indexed += count as usize;
            }
        }

        assert_eq!(indexed, self.order_map.len(), "id index holds orders not in any level");

        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            assert!(bid < ask, "crossed book: bid {bid} >= ask {ask}");
        }
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("order_count", &self.order_map.len())
            .finish()
    }
}
