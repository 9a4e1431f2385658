//! Engine - Synchronous facade over the matching engine.
//!
//! Owns one [`MatchingEngine`] and buffers its output events. The driver
//! thread feeds it intents from the ingestion channel; tests, benchmarks
//! and the replay tool call it directly.

use std::sync::Arc;

use tracing::{info, warn};

use crate::command::{Intent, Order, OrderId, OutputEvent, Price, Side};
use crate::config::EngineConfig;
use crate::error::RejectReason;
use crate::matching::MatchingEngine;
use crate::pool::OrderPool;
use crate::snapshot::DepthSnapshot;

/// Single-instrument engine with an internal event buffer.
pub struct Engine {
    /// The underlying matching engine
    matcher: MatchingEngine,
    /// Events not yet taken by `drain_events`
    events: Vec<OutputEvent>,
    /// Next ID handed out by `submit`; kept above every ID admitted so far
    next_order_id: OrderId,
}

impl Engine {
    /// Create a new engine with the specified order capacity.
    pub fn new(capacity: u32) -> Self {
        Self::with_pool(Arc::new(OrderPool::new(capacity)))
    }

    /// Create an engine over a pool shared with producer threads.
    pub fn with_pool(pool: Arc<OrderPool>) -> Self {
        Self {
            matcher: MatchingEngine::with_pool(pool),
            events: Vec::with_capacity(64),
            next_order_id: 1,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_pool(Arc::new(OrderPool::with_config(config.pool_config())))
    }

    #[inline]
    pub fn matcher(&self) -> &MatchingEngine {
        &self.matcher
    }

    #[inline]
    pub fn pool(&self) -> &Arc<OrderPool> {
        self.matcher.pool()
    }

    /// Process a single intent and return its output events.
    ///
    /// This is the main entry point for synchronous usage (testing, benchmarks).
    #[inline]
    pub fn process_intent(&mut self, intent: Intent) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        self.process_intent_into(intent, &mut events);
        events
    }

    /// Process a single intent, appending its events to `events`.
    #[inline]
    pub fn process_intent_into(&mut self, intent: Intent, events: &mut Vec<OutputEvent>) {
        if let Intent::NewOrder(slot) = &intent {
            let order_id = self.pool().read(slot).id;
            self.observe_id(order_id);
        }
        self.matcher.process_intent(intent, events);
    }

    /// Admit an order carrying its own ID and return its output events.
    #[inline]
    pub fn place(&mut self, order: Order) -> Vec<OutputEvent> {
        self.observe_id(order.id);
        let mut events = Vec::new();
        self.matcher.place(order, &mut events);
        events
    }

    #[inline]
    fn observe_id(&mut self, order_id: OrderId) {
        self.next_order_id = self.next_order_id.max(order_id.saturating_add(1));
    }

    /// Submit a limit order under a fresh engine-assigned ID.
    ///
    /// Returns the ID on admission (the order may have filled completely).
    /// Output events are buffered for [`Engine::drain_events`].
    pub fn submit(&mut self, side: Side, price: Price, qty: u32) -> Result<OrderId, RejectReason> {
        let order_id = self.next_order_id;
        self.next_order_id += 1;

        let start = self.events.len();
        self.matcher
            .place(Order::new(order_id, side, price, qty), &mut self.events);

        match first_rejection(&self.events[start..]) {
            Some(reason) => Err(reason),
            None => Ok(order_id),
        }
    }

    /// Cancel a resting order. Unknown or terminal IDs return `NotFound`.
    pub fn cancel(&mut self, order_id: OrderId) -> Result<(), RejectReason> {
        let start = self.events.len();
        self.matcher.process_cancel(order_id, &mut self.events);

        match first_rejection(&self.events[start..]) {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Take every event buffered by `submit` and `cancel`.
    pub fn drain_events(&mut self) -> Vec<OutputEvent> {
        std::mem::take(&mut self.events)
    }

    /// Pin the current thread to the last available CPU core.
    ///
    /// The last core is typically isolated from OS interrupts.
    pub fn pin_to_core(&self) -> bool {
        let Some(core) = core_affinity::get_core_ids().and_then(|ids| ids.last().copied()) else {
            warn!("no core ids available, matching thread left unpinned");
            return false;
        };
        let pinned = core_affinity::set_for_current(core);
        if pinned {
            info!(core = core.id, "matching thread pinned");
        } else {
            warn!(core = core.id, "failed to pin matching thread");
        }
        pinned
    }

    /// Commit all pool growth before the hot path.
    pub fn warm_up(&self) {
        self.matcher.warm_up();
    }

    /// Best bid as (price, aggregate quantity)
    #[inline]
    pub fn best_bid(&self) -> Option<(Price, u64)> {
        self.matcher.best_level(Side::Buy)
    }

    /// Best ask as (price, aggregate quantity)
    #[inline]
    pub fn best_ask(&self) -> Option<(Price, u64)> {
        self.matcher.best_level(Side::Sell)
    }

    #[inline]
    pub fn spread(&self) -> Option<u64> {
        self.matcher.spread()
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.matcher.order_count()
    }

    /// Up to `limit` levels per side, best first.
    pub fn depth_snapshot(&self, limit: usize) -> DepthSnapshot {
        DepthSnapshot {
            sequence: self.matcher.last_sequence(),
            bids: self.matcher.depth(Side::Buy, limit),
            asks: self.matcher.depth(Side::Sell, limit),
        }
    }

    /// Compute state hash for determinism testing.
    #[inline]
    pub fn state_hash(&self) -> u64 {
        self.matcher.state_hash()
    }

    pub fn check_invariants(&self) {
        self.matcher.check_invariants();
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(1_000_000) // 1M orders default capacity
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("matcher", &self.matcher)
            .field("buffered_events", &self.events.len())
            .finish()
    }
}

fn first_rejection(events: &[OutputEvent]) -> Option<RejectReason> {
    events.iter().find_map(|e| match e {
        OutputEvent::Rejected(r) => Some(r.reason),
        _ => None,
    })
}
