//! Price Level - A FIFO queue of orders at a single price point.
//!
//! Implements a doubly-linked list threaded through pool slots for O(1)
//! insertion, removal from head, and removal from arbitrary position.

use crate::pool::{BookSlots, SlotIndex, NULL_INDEX};

/// A queue of orders at a specific price level.
///
/// Orders are processed in FIFO order (price-time priority).
/// The doubly-linked structure enables O(1) cancel from any position.
#[derive(Clone, Copy, Debug, Default)]
pub struct PriceLevel {
    /// Slot of the oldest order (highest priority, first to match)
    pub head: SlotIndex,
    /// Slot of the newest order (last to match)
    pub tail: SlotIndex,
    /// Total remaining quantity across all orders at this level
    pub total_qty: u64,
    /// Number of orders at this level
    pub count: u32,
}

impl PriceLevel {
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_qty: 0,
            count: 0,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append an order to the tail of the queue (newest order).
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub(crate) fn push_back(&mut self, slots: &mut BookSlots, index: SlotIndex) {
        let qty = slots.get(index).qty;

        if self.tail == NULL_INDEX {
            debug_assert!(self.head == NULL_INDEX);
            self.head = index;
        } else {
            slots.get_mut(self.tail).next = index;
        }

        let node = slots.get_mut(index);
        node.prev = self.tail;
        node.next = NULL_INDEX;
        self.tail = index;

        self.count += 1;
        self.total_qty += qty as u64;
    }

    /// Remove and return the head order (oldest/highest priority).
    ///
    /// The slot is NOT released; caller must do that.
    #[inline]
    pub(crate) fn pop_front(&mut self, slots: &mut BookSlots) -> Option<SlotIndex> {
        if self.head == NULL_INDEX {
            return None;
        }
        let index = self.head;
        self.remove(slots, index);
        Some(index)
    }

    /// Remove an order from anywhere in the queue (for cancel).
    ///
    /// Returns `true` if the level is now empty. The slot is NOT released;
    /// caller must do that.
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub(crate) fn remove(&mut self, slots: &mut BookSlots, index: SlotIndex) -> bool {
        let node = slots.get(index);
        let prev_idx = node.prev;
        let next_idx = node.next;
        let qty = node.qty;

        if prev_idx == NULL_INDEX {
            debug_assert!(self.head == index);
            self.head = next_idx;
        } else {
            slots.get_mut(prev_idx).next = next_idx;
        }

        if next_idx == NULL_INDEX {
            debug_assert!(self.tail == index);
            self.tail = prev_idx;
        } else {
            slots.get_mut(next_idx).prev = prev_idx;
        }

        self.count -= 1;
        self.total_qty -= qty as u64;

        let node = slots.get_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        self.count == 0
    }

    /// Head slot, or `NULL_INDEX` if empty.
    #[inline]
    pub const fn peek_head(&self) -> SlotIndex {
        self.head
    }

    /// Update total quantity after a partial fill.
    ///
    /// Call this after modifying an order's qty directly.
    #[inline]
    pub fn subtract_qty(&mut self, qty: u32) {
        debug_assert!(self.total_qty >= qty as u64);
        self.total_qty -= qty as u64;
    }

    /// Walk the queue head to tail.
    pub(crate) fn iter<'a>(&self, slots: &'a BookSlots) -> LevelIter<'a> {
        LevelIter { slots, cursor: self.head }
    }
}

/// Slot indices of a level in priority order.
pub(crate) struct LevelIter<'a> {
    slots: &'a BookSlots,
    cursor: SlotIndex,
}

impl Iterator for LevelIter<'_> {
    type Item = SlotIndex;

    fn next(&mut self) -> Option<SlotIndex> {
        if self.cursor == NULL_INDEX {
            return None;
        }
        let index = self.cursor;
        self.cursor = self.slots.get(index).next;
        Some(index)
    }
}
