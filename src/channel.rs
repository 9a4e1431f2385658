//! Ingestion Channel - bounded lock-free MPSC ring buffer.
//!
//! Producers claim a position with a CAS on the tail counter, write the
//! value, then publish it by storing the slot's sequence stamp with release
//! ordering. The single consumer checks the stamp with acquire ordering
//! before reading. Stamps count in half-steps (`2 * pos` empty, `2 * pos + 1`
//! full) so a ring of capacity 1 still tells laps apart.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::{Backoff, CachePadded};

use crate::error::ConfigError;

struct Cell<T> {
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

struct Ring<T> {
    buffer: Box<[Cell<T>]>,
    mask: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: a cell's value is written only by the producer that won its tail
// position and read only by the consumer after observing the published stamp.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

#[inline(always)]
const fn empty_stamp(pos: usize) -> usize {
    pos.wrapping_mul(2)
}

#[inline(always)]
const fn full_stamp(pos: usize) -> usize {
    pos.wrapping_mul(2).wrapping_add(1)
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        let buffer = (0..capacity)
            .map(|i| Cell {
                stamp: AtomicUsize::new(empty_stamp(i)),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            buffer,
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.capacity())
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let mut pos = head;
        while pos != tail {
            let cell = &mut self.buffer[pos & self.mask];
            if *cell.stamp.get_mut() == full_stamp(pos) {
                // SAFETY: the stamp says this cell holds a published value
                // that the consumer never took.
                unsafe { cell.value.get_mut().assume_init_drop() };
            }
            pos = pos.wrapping_add(1);
        }
    }
}

/// Error returned by [`Producer::try_push`]
///
/// The value is handed back so the caller can retry or release it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PushError<T> {
    /// No free slot in the ring
    Full(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(value) => value,
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.pad("Full(_)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.pad("ingestion channel full"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}

/// Create a bounded channel.
///
/// `capacity` must be a non-zero power of two.
pub fn bounded<T>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), ConfigError> {
    if !capacity.is_power_of_two() {
        return Err(ConfigError::ChannelCapacity(capacity));
    }
    let ring = Arc::new(Ring::with_capacity(capacity));
    Ok((
        Producer { ring: Arc::clone(&ring) },
        Consumer { ring },
    ))
}

/// Sending half. Clone one per producer thread.
pub struct Producer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self { ring: Arc::clone(&self.ring) }
    }
}

impl<T> Producer<T> {
    /// Push without blocking. Fails only when the ring is full.
    pub fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        let ring = &*self.ring;
        let backoff = Backoff::new();
        let mut tail = ring.tail.load(Ordering::Relaxed);

        loop {
            let cell = &ring.buffer[tail & ring.mask];
            let stamp = cell.stamp.load(Ordering::Acquire);
            let diff = stamp.wrapping_sub(empty_stamp(tail)) as isize;

            if diff == 0 {
                match ring.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: winning the CAS gives this producer sole
                        // write access to the cell until the stamp is published.
                        unsafe { (*cell.value.get()).write(value) };
                        cell.stamp.store(full_stamp(tail), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => {
                        tail = current;
                        backoff.spin();
                    }
                }
            } else if diff < 0 {
                // Cell still holds the previous lap
                return Err(PushError::Full(value));
            } else {
                // Another producer already took this position
                backoff.spin();
                tail = ring.tail.load(Ordering::Relaxed);
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Receiving half. Exactly one exists per channel.
pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Consumer<T> {
    /// Pop the oldest published value, or `None` if there is none yet.
    pub fn try_pop(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);
        let cell = &ring.buffer[head & ring.mask];

        if cell.stamp.load(Ordering::Acquire) != full_stamp(head) {
            return None;
        }

        // SAFETY: the acquire load above observed the producer's publish.
        let value = unsafe { (*cell.value.get()).assume_init_read() };
        cell.stamp
            .store(empty_stamp(head.wrapping_add(ring.capacity())), Ordering::Release);
        ring.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
