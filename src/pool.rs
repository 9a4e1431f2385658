//! Order Pool - concurrent slab allocator with cache-line aligned nodes.
//!
//! The pool pre-allocates contiguous segments of order nodes so producers
//! and the matching thread never touch the system allocator on the hot
//! path. Free slots form a lock-free stack threaded through each slot's
//! `next_free` link; the stack head is a tagged word (generation | index)
//! so a recycled index cannot be mistaken for a stale one (ABA).
//!
//! Ownership of a live slot is expressed by the move-only [`OrderSlot`]
//! token. Whoever holds the token may write the slot; the book consumes
//! tokens when it admits an order and releases by index afterwards.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam::utils::{Backoff, CachePadded};
use tracing::info;

use crate::command::{Order, OrderId, Price, Quantity, Side};
use crate::error::PoolError;

/// Sentinel value representing a null/invalid index (like nullptr)
pub const NULL_INDEX: u32 = u32::MAX;

/// Segment size used when a growable pool starts empty
pub const DEFAULT_SEGMENT_SIZE: u32 = 1024;

/// Compressed pointer into the pool.
pub type SlotIndex = u32;

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(0);

// Tagged head: upper 32 bits generation, lower 32 bits slot index
#[inline(always)]
fn pack_tagged(generation: u32, index: SlotIndex) -> u64 {
    ((generation as u64) << 32) | index as u64
}

#[inline(always)]
fn unpack_generation(tagged: u64) -> u32 {
    (tagged >> 32) as u32
}

#[inline(always)]
fn unpack_index(tagged: u64) -> SlotIndex {
    tagged as u32
}

/// A single order record - exactly 64 bytes (one cache line).
///
/// # Memory Layout
///
/// | Field        | Type    | Offset | Size |
/// |--------------|---------|--------|------|
/// | price        | u64     | 0      | 8    |
/// | order_id     | u64     | 8      | 8    |
/// | sequence     | u64     | 16     | 8    |
/// | qty          | u32     | 24     | 4    |
/// | original_qty | u32     | 28     | 4    |
/// | next         | u32     | 32     | 4    |
/// | prev         | u32     | 36     | 4    |
/// | side         | u8      | 40     | 1    |
/// | _reserved    | [u8;23] | 41     | 23   |
/// | **Total**    |         |        | 64   |
#[repr(C)]
#[repr(align(64))]
#[derive(Clone, Copy)]
pub struct OrderNode {
    // === Hot Data (read on every match step) ===

    /// Fixed-point limit price
    pub price: Price,

    /// Producer-assigned order ID
    pub order_id: OrderId,

    /// Arrival sequence, stamped at admission
    pub sequence: u64,

    /// Remaining quantity to fill
    pub qty: Quantity,

    /// Quantity as submitted
    pub original_qty: Quantity,

    // === Linkage (FIFO queue pointers within a PriceLevel) ===

    /// Index of next order at same price level
    pub next: SlotIndex,

    /// Index of previous order (enables O(1) cancel)
    pub prev: SlotIndex,

    pub side: Side,

    pub _reserved: [u8; 23],
}

const _: () = assert!(
    std::mem::size_of::<OrderNode>() == 64,
    "OrderNode must be exactly 64 bytes (one cache line)"
);

const _: () = assert!(
    std::mem::align_of::<OrderNode>() == 64,
    "OrderNode must be 64-byte aligned"
);

impl OrderNode {
    /// Create a node holding a freshly submitted order
    #[inline]
    pub fn new(order: &Order) -> Self {
        Self {
            price: order.price,
            order_id: order.id,
            sequence: 0,
            qty: order.qty,
            original_qty: order.qty,
            next: NULL_INDEX,
            prev: NULL_INDEX,
            side: order.side,
            _reserved: [0u8; 23],
        }
    }

    /// Create an empty node (for the free list)
    #[inline]
    pub const fn empty() -> Self {
        Self {
            price: 0,
            order_id: 0,
            sequence: 0,
            qty: 0,
            original_qty: 0,
            next: NULL_INDEX,
            prev: NULL_INDEX,
            side: Side::Buy,
            _reserved: [0u8; 23],
        }
    }

    /// Reset the node for reuse
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::empty();
    }

    /// The order as currently stored (remaining quantity)
    #[inline]
    pub fn to_order(&self) -> Order {
        Order::new(self.order_id, self.side, self.price, self.qty)
    }
}

impl fmt::Debug for OrderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderNode")
            .field("order_id", &self.order_id)
            .field("side", &self.side)
            .field("price", &self.price)
            .field("qty", &self.qty)
            .field("sequence", &self.sequence)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

struct Slot {
    node: UnsafeCell<OrderNode>,
    next_free: AtomicU32,
    live: AtomicBool,
}

impl Slot {
    fn new(next_free: SlotIndex) -> Self {
        Self {
            node: UnsafeCell::new(OrderNode::empty()),
            next_free: AtomicU32::new(next_free),
            live: AtomicBool::new(false),
        }
    }
}

/// Ownership token for a live pool slot.
///
/// Move-only: exactly one token exists per live slot. Dropping a token
/// without handing it to the book or to [`OrderPool::release`] leaks the
/// slot until the pool itself is dropped.
#[derive(Debug, PartialEq, Eq)]
pub struct OrderSlot {
    index: SlotIndex,
    pool_id: u32,
}

impl OrderSlot {
    #[inline]
    pub fn index(&self) -> SlotIndex {
        self.index
    }
}

/// Sizing for an [`OrderPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Slots committed at construction
    pub capacity: u32,
    /// Upper bound reachable by growth; equal to `capacity` for a fixed pool
    pub max_capacity: u32,
}

impl PoolConfig {
    pub const fn fixed(capacity: u32) -> Self {
        Self { capacity, max_capacity: capacity }
    }

    pub const fn growable(capacity: u32, max_capacity: u32) -> Self {
        Self { capacity, max_capacity }
    }
}

/// Pre-allocated order storage with lock-free acquire and release.
///
/// Any thread may acquire; a slot acquired on one thread may be released
/// on another. Growth, when configured, commits whole segments so slot
/// addresses never move. The last segment is cut short when needed so the
/// pool tops out at exactly `max_capacity`.
pub struct OrderPool {
    id: u32,
    segments: Box<[OnceLock<Box<[Slot]>>]>,
    segment_size: u32,
    max_capacity: u32,
    committed: AtomicUsize,
    /// Segments claimed but not yet spliced onto the free list
    splicing: AtomicUsize,
    free_head: CachePadded<AtomicU64>,
    live: CachePadded<AtomicU32>,
}

// SAFETY: node contents are only touched through an owned `OrderSlot` or by
// the single book that adopted the slot; all shared bookkeeping is atomic.
unsafe impl Sync for OrderPool {}

impl OrderPool {
    /// Create a fixed-capacity pool.
    ///
    /// # Panics
    /// Panics if capacity is not below `NULL_INDEX`.
    pub fn new(capacity: u32) -> Self {
        Self::with_config(PoolConfig::fixed(capacity))
    }

    /// Create a pool that starts at `capacity` and may grow to `max_capacity`.
    pub fn with_growth(capacity: u32, max_capacity: u32) -> Self {
        Self::with_config(PoolConfig::growable(capacity, max_capacity))
    }

    pub fn with_config(config: PoolConfig) -> Self {
        assert!(config.max_capacity < NULL_INDEX, "Capacity must be less than NULL_INDEX");
        assert!(
            config.capacity <= config.max_capacity,
            "Initial capacity must not exceed max capacity"
        );

        let segment_size = if config.capacity > 0 {
            config.capacity
        } else {
            DEFAULT_SEGMENT_SIZE.min(config.max_capacity).max(1)
        };
        let initial_segments = if config.capacity > 0 { 1 } else { 0 };
        let max_segments = (config.max_capacity.div_ceil(segment_size) as usize).max(initial_segments);

        let pool = Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            segments: (0..max_segments).map(|_| OnceLock::new()).collect(),
            segment_size,
            max_capacity: config.max_capacity,
            committed: AtomicUsize::new(initial_segments),
            splicing: AtomicUsize::new(0),
            free_head: CachePadded::new(AtomicU64::new(pack_tagged(0, NULL_INDEX))),
            live: CachePadded::new(AtomicU32::new(0)),
        };

        if initial_segments > 0 {
            pool.commit_segment(0);
        }
        pool
    }

    /// Take a free slot.
    ///
    /// Grows by one segment when the free list is empty and growth remains.
    /// Waits for a segment another thread is still splicing in rather than
    /// reporting `Exhausted` early.
    ///
    /// # Complexity
    /// O(1), with CAS retries under contention
    pub fn acquire(&self) -> Result<OrderSlot, PoolError> {
        let backoff = Backoff::new();
        loop {
            let head = self.free_head.load(Ordering::Acquire);
            let index = unpack_index(head);
            if index == NULL_INDEX {
                if self.grow() {
                    continue;
                }
                // A splice may have landed between the head load and `grow`
                if unpack_index(self.free_head.load(Ordering::Acquire)) != NULL_INDEX {
                    continue;
                }
                return Err(PoolError::Exhausted);
            }

            // A stale `next` is harmless: the generation tag fails the CAS.
            let next = self.slot(index).next_free.load(Ordering::Relaxed);
            let new_head = pack_tagged(unpack_generation(head).wrapping_add(1), next);

            if self
                .free_head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let was_live = self.slot(index).live.swap(true, Ordering::AcqRel);
                assert!(!was_live, "pool slot {index} was on the free list while live");
                self.live.fetch_add(1, Ordering::Relaxed);
                return Ok(OrderSlot { index, pool_id: self.id });
            }
            backoff.spin();
        }
    }

    /// Return a slot to the free set.
    pub fn release(&self, slot: OrderSlot) -> Result<(), PoolError> {
        self.check_owner(&slot);
        self.release_index(slot.index)
    }

    /// Release by raw index. A slot that is already free is reported as
    /// `DoubleRelease` and the free list is left untouched.
    pub(crate) fn release_index(&self, index: SlotIndex) -> Result<(), PoolError> {
        let slot = self.slot(index);
        if !slot.live.swap(false, Ordering::AcqRel) {
            return Err(PoolError::DoubleRelease { index });
        }
        // Before the push: `live` must never exceed the slots actually held.
        self.live.fetch_sub(1, Ordering::Relaxed);

        // SAFETY: the caller owned this live slot and the flag flip above
        // makes it unreachable until `acquire` hands it out again.
        unsafe { (*slot.node.get()).reset() };

        let backoff = Backoff::new();
        loop {
            let head = self.free_head.load(Ordering::Acquire);
            slot.next_free.store(unpack_index(head), Ordering::Relaxed);
            let new_head = pack_tagged(unpack_generation(head).wrapping_add(1), index);
            if self
                .free_head
                .compare_exchange_weak(head, new_head, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
            backoff.spin();
        }
        Ok(())
    }

    /// Write an order into an owned slot.
    #[inline]
    pub fn write(&self, slot: &mut OrderSlot, order: &Order) {
        self.check_owner(slot);
        // SAFETY: `slot` is the unique token for this live slot and is
        // borrowed mutably for the duration of the write.
        unsafe { *self.slot(slot.index).node.get() = OrderNode::new(order) };
    }

    /// Read the order stored in an owned slot.
    #[inline]
    pub fn read(&self, slot: &OrderSlot) -> Order {
        self.check_owner(slot);
        // SAFETY: writers need `&mut OrderSlot`, so none can run while this
        // shared borrow of the token exists.
        unsafe { (*self.slot(slot.index).node.get()).to_order() }
    }

    /// Backing address of a slot's node. Stable for the pool's lifetime.
    #[inline]
    pub fn node_address(&self, slot: &OrderSlot) -> usize {
        self.check_owner(slot);
        self.slot(slot.index).node.get() as usize
    }

    /// Number of slots currently handed out.
    #[inline]
    pub fn live(&self) -> u32 {
        self.live.load(Ordering::Relaxed)
    }

    /// Slots committed so far.
    #[inline]
    pub fn capacity(&self) -> u32 {
        let committed = self.committed.load(Ordering::Acquire) as u32;
        committed.saturating_mul(self.segment_size).min(self.max_capacity)
    }

    /// Slots reachable with growth.
    #[inline]
    pub fn max_capacity(&self) -> u32 {
        self.max_capacity
    }

    /// True when every reachable slot is live.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.live() >= self.max_capacity()
    }

    /// Commit every remaining growth segment up front so growth never
    /// allocates on the hot path.
    pub fn warm_up(&self) {
        while self.grow() {}
    }

    #[inline]
    fn check_owner(&self, slot: &OrderSlot) {
        assert_eq!(
            slot.pool_id, self.id,
            "slot {} was not issued by this pool",
            slot.index
        );
    }

    #[inline]
    fn slot(&self, index: SlotIndex) -> &Slot {
        let segment = (index / self.segment_size) as usize;
        let offset = (index % self.segment_size) as usize;
        match self.segments.get(segment).and_then(OnceLock::get) {
            Some(slots) => &slots[offset],
            None => panic!("slot index {index} is outside committed pool segments"),
        }
    }

    /// Claim and commit the next segment. Returns false once growth is spent
    /// and no claimed segment is still being spliced in.
    fn grow(&self) -> bool {
        let segment = self.committed.load(Ordering::SeqCst);
        if segment >= self.segments.len() {
            let in_flight = self.splicing.load(Ordering::SeqCst) > 0;
            if in_flight {
                std::hint::spin_loop();
            }
            return in_flight;
        }

        // Raised before the claim, so whoever sees every segment taken also
        // sees a splice that has not landed yet.
        self.splicing.fetch_add(1, Ordering::SeqCst);
        if self
            .committed
            .compare_exchange(segment, segment + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.commit_segment(segment);
            info!(
                segment,
                capacity = self.capacity(),
                max_capacity = self.max_capacity(),
                "order pool grew"
            );
        }
        self.splicing.fetch_sub(1, Ordering::SeqCst);
        true
    }

    /// Allocate a segment and splice its chain onto the free list.
    fn commit_segment(&self, segment: usize) {
        let base = segment as u32 * self.segment_size;
        let size = self.segment_size.min(self.max_capacity - base);

        let slots = self.segments[segment].get_or_init(|| {
            (0..size)
                .map(|i| Slot::new(if i + 1 < size { base + i + 1 } else { NULL_INDEX }))
                .collect()
        });

        let tail = &slots[(size - 1) as usize];
        loop {
            let head = self.free_head.load(Ordering::Acquire);
            tail.next_free.store(unpack_index(head), Ordering::Relaxed);
            let new_head = pack_tagged(unpack_generation(head).wrapping_add(1), base);
            if self
                .free_head
                .compare_exchange_weak(head, new_head, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }
}

impl fmt::Debug for OrderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderPool")
            .field("capacity", &self.capacity())
            .field("max_capacity", &self.max_capacity())
            .field("live", &self.live())
            .finish()
    }
}

/// Node access for the one book that owns a set of adopted slots.
///
/// Only indices obtained from [`BookSlots::adopt`] may be passed back in;
/// `&mut self` on the mutators keeps the book's own accesses exclusive.
pub(crate) struct BookSlots {
    pool: Arc<OrderPool>,
}

impl BookSlots {
    pub(crate) fn new(pool: Arc<OrderPool>) -> Self {
        Self { pool }
    }

    #[inline]
    pub(crate) fn pool(&self) -> &Arc<OrderPool> {
        &self.pool
    }

    /// Take ownership of a producer's slot.
    #[inline]
    pub(crate) fn adopt(&mut self, slot: OrderSlot) -> SlotIndex {
        self.pool.check_owner(&slot);
        debug_assert!(self.pool.slot(slot.index).live.load(Ordering::Relaxed));
        slot.index
    }

    #[inline]
    pub(crate) fn get(&self, index: SlotIndex) -> &OrderNode {
        // SAFETY: `index` was adopted by this book and is still live.
        unsafe { &*self.pool.slot(index).node.get() }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, index: SlotIndex) -> &mut OrderNode {
        // SAFETY: as in `get`, and `&mut self` rules out a second borrow.
        unsafe { &mut *self.pool.slot(index).node.get() }
    }

    /// Release an adopted slot. The book never releases twice, so a
    /// failure here means its bookkeeping is corrupt.
    #[inline]
    pub(crate) fn release(&mut self, index: SlotIndex) {
        if let Err(e) = self.pool.release_index(index) {
            panic!("order book lost track of its slots: {e}");
        }
    }
}
