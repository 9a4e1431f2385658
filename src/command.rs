//! Intent and Event types for the matching engine.
//!
//! Intents are inputs from producer threads.
//! Events are outputs to the event sink.

use crate::error::RejectReason;
use crate::pool::OrderSlot;

/// Producer-assigned order identifier
pub type OrderId = u64;

/// Fixed-point price in ticks (e.g., $100.50 -> 10050 at 2 decimals)
pub type Price = u64;

/// Order quantity
pub type Quantity = u32;

/// Order side
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Buy = 0,
    /// Sell side (asks)
    Sell = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// A limit order as submitted by a producer.
///
/// The arrival `sequence` is not part of the submission; the matching
/// thread stamps it at admission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Order {
    /// Producer-assigned ID, unique while live
    pub id: OrderId,
    /// Order side
    pub side: Side,
    /// Fixed-point limit price
    pub price: Price,
    /// Quantity to fill
    pub qty: Quantity,
}

impl Order {
    #[inline]
    pub const fn new(id: OrderId, side: Side, price: Price, qty: Quantity) -> Self {
        Self { id, side, price, qty }
    }

    /// Admission checks shared by producers and the book.
    #[inline]
    pub const fn validate(&self) -> Result<(), RejectReason> {
        if self.qty == 0 {
            return Err(RejectReason::InvalidQuantity);
        }
        if self.price == 0 {
            return Err(RejectReason::InvalidPrice);
        }
        Ok(())
    }
}

// ============================================================================
// Input Intents
// ============================================================================

/// Input intents carried by the ingestion channel
#[derive(Debug)]
pub enum Intent {
    /// A new order, already written into a pool slot by the producer
    NewOrder(OrderSlot),
    /// Cancel a resting order
    Cancel(OrderId),
}

// ============================================================================
// Output Events
// ============================================================================

/// A trade was executed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TradeEvent {
    /// Incoming (aggressive) order ID
    pub aggressor_id: OrderId,
    /// Resting (passive) order ID
    pub resting_id: OrderId,
    /// Execution price (always the resting order's price)
    pub price: Price,
    /// Executed quantity
    pub qty: Quantity,
    /// Side of the aggressor
    pub aggressor_side: Side,
}

/// Order book level update (Level 2 market data)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookUpdate {
    /// Which side changed
    pub side: Side,
    /// Price level that changed
    pub price: Price,
    /// New total quantity at this price (0 = level removed)
    pub new_qty: u64,
    /// New order count at this price
    pub new_count: u32,
}

/// Order was accepted and its remainder is resting in the book
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderAccepted {
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    /// Quantity left resting after any immediate fills
    pub qty: Quantity,
    /// Arrival sequence stamped at admission
    pub sequence: u64,
}

/// Order was cancelled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    /// Remaining quantity that was cancelled
    pub cancelled_qty: Quantity,
}

/// Order or cancel was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderRejected {
    /// None when the rejection happened before an ID was known
    pub order_id: Option<OrderId>,
    pub reason: RejectReason,
}

/// Output events from the matching engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    /// Trade executed
    Trade(TradeEvent),
    /// Book level changed
    BookDelta(BookUpdate),
    /// Order accepted and resting
    Accepted(OrderAccepted),
    /// Order cancelled
    Cancelled(OrderCancelled),
    /// Order or cancel rejected
    Rejected(OrderRejected),
}
