//! Matching Engine - Core order matching algorithm.
//!
//! Implements the cross/rest algorithm:
//! 1. CROSSING: Match aggressive orders against the opposite side
//! 2. RESTING: Place remaining quantity in the book
//!
//! Every order arrives already written into a pool slot, so admission never
//! allocates and a rejected order only costs a slot release.

use std::sync::Arc;

use tracing::debug;

use crate::command::{
    BookUpdate, Intent, Order, OrderAccepted, OrderCancelled, OrderId, OrderRejected,
    OutputEvent, Price, Side, TradeEvent,
};
use crate::error::RejectReason;
use crate::order_book::{LevelDepth, OrderBook};
use crate::pool::{BookSlots, OrderPool, OrderSlot, SlotIndex, NULL_INDEX};

/// The matching engine core
pub struct MatchingEngine {
    /// Node storage shared with producers
    slots: BookSlots,
    /// The limit order book
    book: OrderBook,
    /// Last arrival sequence handed out
    next_sequence: u64,
}

impl MatchingEngine {
    /// Create a new matching engine over a private fixed-capacity pool
    pub fn new(capacity: u32) -> Self {
        Self::with_pool(Arc::new(OrderPool::new(capacity)))
    }

    /// Create a matching engine over a pool shared with producers
    pub fn with_pool(pool: Arc<OrderPool>) -> Self {
        let orders = pool.capacity() as usize;
        Self {
            slots: BookSlots::new(pool),
            book: OrderBook::with_capacity(orders),
            next_sequence: 0,
        }
    }

    #[inline]
    pub fn pool(&self) -> &Arc<OrderPool> {
        self.slots.pool()
    }

    #[inline]
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Apply one intent from the ingestion channel.
    pub fn process_intent(&mut self, intent: Intent, events: &mut Vec<OutputEvent>) {
        match intent {
            Intent::NewOrder(slot) => self.process_new(slot, events),
            Intent::Cancel(order_id) => self.process_cancel(order_id, events),
        }
    }

    /// Acquire a slot for `order` and admit it.
    ///
    /// If no slot is free the order is rejected with `PoolExhausted` and the
    /// book is not touched.
    pub fn place(&mut self, order: Order, events: &mut Vec<OutputEvent>) {
        match self.slots.pool().acquire() {
            Ok(mut slot) => {
                self.slots.pool().write(&mut slot, &order);
                self.process_new(slot, events);
            }
            Err(e) => reject(events, Some(order.id), e.into()),
        }
    }

    /// Admit an order a producer has already written into `slot`.
    ///
    /// # Algorithm
    /// 1. Validate price/quantity and check for a duplicate live ID
    /// 2. Stamp the arrival sequence
    /// 3. Cross against the opposite side
    /// 4. Rest any remainder, or release the slot if fully filled
    pub fn process_new(&mut self, slot: OrderSlot, events: &mut Vec<OutputEvent>) {
        let idx = self.slots.adopt(slot);
        let order = self.slots.get(idx).to_order();

        if let Err(reason) = order.validate() {
            self.slots.release(idx);
            reject(events, Some(order.id), reason);
            return;
        }

        if self.book.contains_order(order.id) {
            self.slots.release(idx);
            reject(events, Some(order.id), RejectReason::DuplicateOrderId);
            return;
        }

        self.next_sequence += 1;
        let sequence = self.next_sequence;
        self.slots.get_mut(idx).sequence = sequence;

        // Phase 1: CROSSING (aggressive matching)
        let remaining = self.cross_order(&order, events);

        // Phase 2: RESTING (passive posting)
        if remaining > 0 {
            self.rest_order(idx, &order, remaining, sequence, events);
        } else {
            self.slots.release(idx);
        }
    }

    /// Cross (match) an incoming order against the opposite side.
    ///
    /// # Returns
    /// Remaining quantity after matching
    fn cross_order(&mut self, order: &Order, events: &mut Vec<OutputEvent>) -> u32 {
        let opposite_side = order.side.opposite();
        let mut remaining = order.qty;

        while remaining > 0 {
            let Some(best_opposite) = self.book.best_opposite_price(order.side) else {
                break;
            };

            if !prices_cross(order.price, best_opposite, order.side) {
                break;
            }

            remaining = self.match_at_level(order, best_opposite, opposite_side, remaining, events);
        }

        remaining
    }

    /// Match against orders at one price level, head first.
    ///
    /// # Returns
    /// Remaining quantity after matching at this level
    fn match_at_level(
        &mut self,
        taker: &Order,
        price: Price,
        maker_side: Side,
        mut remaining: u32,
        events: &mut Vec<OutputEvent>,
    ) -> u32 {
        while remaining > 0 {
            let Some(level) = self.book.get_level_mut(maker_side, price) else {
                break;
            };

            let maker_idx = level.peek_head();
            if maker_idx == NULL_INDEX {
                break;
            }

            let maker = self.slots.get(maker_idx);
            let maker_order_id = maker.order_id;
            let maker_qty = maker.qty;

            let trade_qty = remaining.min(maker_qty);

            events.push(OutputEvent::Trade(TradeEvent {
                aggressor_id: taker.id,
                resting_id: maker_order_id,
                price,
                qty: trade_qty,
                aggressor_side: taker.side,
            }));

            remaining -= trade_qty;

            if trade_qty == maker_qty {
                // Maker fully filled - remove from book
                level.pop_front(&mut self.slots);
                let (new_qty, new_count) = (level.total_qty, level.count);
                let emptied = level.is_empty();

                self.book.remove_order_from_map(maker_order_id);
                self.slots.release(maker_idx);
                if emptied {
                    self.book.remove_empty_level(maker_side, price);
                }

                events.push(OutputEvent::BookDelta(BookUpdate {
                    side: maker_side,
                    price,
                    new_qty,
                    new_count,
                }));
            } else {
                // Maker partially filled - stays at the head
                self.slots.get_mut(maker_idx).qty = maker_qty - trade_qty;
                level.subtract_qty(trade_qty);

                events.push(OutputEvent::BookDelta(BookUpdate {
                    side: maker_side,
                    price,
                    new_qty: level.total_qty,
                    new_count: level.count,
                }));
            }
        }

        remaining
    }

    /// Rest the unfilled remainder at the tail of its level.
    fn rest_order(
        &mut self,
        idx: SlotIndex,
        order: &Order,
        qty: u32,
        sequence: u64,
        events: &mut Vec<OutputEvent>,
    ) {
        self.slots.get_mut(idx).qty = qty;

        let added = self
            .book
            .add_order(&mut self.slots, order.id, order.side, order.price, idx);
        debug_assert!(added, "duplicate id {} slipped past admission", order.id);

        events.push(OutputEvent::Accepted(OrderAccepted {
            order_id: order.id,
            side: order.side,
            price: order.price,
            qty,
            sequence,
        }));

        let (new_qty, new_count) = self.book.depth_at(order.side, order.price);
        events.push(OutputEvent::BookDelta(BookUpdate {
            side: order.side,
            price: order.price,
            new_qty,
            new_count,
        }));
    }

    /// Cancel a resting order.
    ///
    /// Unknown, filled and already-cancelled IDs produce a `NotFound`
    /// rejection and leave the book unchanged.
    pub fn process_cancel(&mut self, order_id: OrderId, events: &mut Vec<OutputEvent>) {
        let Some(info) = self.book.remove_order(&mut self.slots, order_id) else {
            reject(events, Some(order_id), RejectReason::NotFound);
            return;
        };

        let cancelled_qty = self.slots.get(info.slot).qty;
        self.slots.release(info.slot);

        events.push(OutputEvent::Cancelled(OrderCancelled {
            order_id,
            cancelled_qty,
        }));

        let (new_qty, new_count) = self.book.depth_at(info.side, info.price);
        events.push(OutputEvent::BookDelta(BookUpdate {
            side: info.side,
            price: info.price,
            new_qty,
            new_count,
        }));
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.book.best_bid()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.book.best_ask()
    }

    /// Best level on a side as (price, aggregate quantity)
    #[inline]
    pub fn best_level(&self, side: Side) -> Option<(Price, u64)> {
        self.book
            .best_level(side)
            .map(|(price, level)| (price, level.total_qty))
    }

    #[inline]
    pub fn spread(&self) -> Option<u64> {
        self.book.spread()
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.book.order_count()
    }

    /// Up to `limit` levels of one side, best first
    pub fn depth(&self, side: Side, limit: usize) -> Vec<LevelDepth> {
        self.book.depth(side, limit)
    }

    /// Arrival sequence of the most recently admitted order
    #[inline]
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Remaining quantity of a resting order
    pub fn resting_qty(&self, order_id: OrderId) -> Option<u32> {
        self.book
            .get_order(order_id)
            .map(|info| self.slots.get(info.slot).qty)
    }

    /// Resting orders of one level in priority order, as (id, remaining qty)
    pub fn level_orders(&self, side: Side, price: Price) -> Vec<(OrderId, u32)> {
        self.book.get_level(side, price).map_or_else(Vec::new, |level| {
            level
                .iter(&self.slots)
                .map(|idx| {
                    let node = self.slots.get(idx);
                    (node.order_id, node.qty)
                })
                .collect()
        })
    }

    /// Panic if the book's levels and ID index disagree.
    pub fn check_invariants(&self) {
        self.book.check_invariants(&self.slots);
    }

    /// Commit all pool growth ahead of the hot path
    pub fn warm_up(&self) {
        self.slots.pool().warm_up();
    }

    /// Compute a hash of the full book contents (for determinism testing)
    pub fn state_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.next_sequence.hash(&mut hasher);

        for side in [Side::Buy, Side::Sell] {
            side.hash(&mut hasher);
            for (price, level) in self.book.levels(side) {
                price.hash(&mut hasher);
                level.total_qty.hash(&mut hasher);
                level.count.hash(&mut hasher);
                for idx in level.iter(&self.slots) {
                    let node = self.slots.get(idx);
                    node.order_id.hash(&mut hasher);
                    node.qty.hash(&mut hasher);
                    node.sequence.hash(&mut hasher);
                }
            }
        }

        hasher.finish()
    }
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("book", &self.book)
            .field("pool", self.slots.pool())
            .field("last_sequence", &self.next_sequence)
            .finish()
    }
}

/// Check if an incoming order price crosses the opposite best price.
#[inline]
fn prices_cross(order_price: Price, opposite_best: Price, order_side: Side) -> bool {
    match order_side {
        // Buyer willing to pay >= lowest ask
        Side::Buy => order_price >= opposite_best,
        // Seller willing to accept <= highest bid
        Side::Sell => order_price <= opposite_best,
    }
}

fn reject(events: &mut Vec<OutputEvent>, order_id: Option<OrderId>, reason: RejectReason) {
    debug!(?order_id, %reason, "rejected");
    events.push(OutputEvent::Rejected(OrderRejected { order_id, reason }));
}
