//! Event sinks - where the driver forwards output events.

use crate::command::OutputEvent;

/// Destination for events produced by the matching thread.
///
/// `emit` is called on the matching thread for every event, in order.
/// Implementations must not block for long; a sink that cannot keep up
/// should drop or count rather than stall matching.
pub trait EventSink {
    fn emit(&mut self, event: OutputEvent);

    /// Called once per drained batch
    fn flush(&mut self) {}
}

impl EventSink for Vec<OutputEvent> {
    #[inline]
    fn emit(&mut self, event: OutputEvent) {
        self.push(event);
    }
}

/// Unbounded channel to another thread. Events are dropped once the
/// receiver is gone.
impl EventSink for crossbeam::channel::Sender<OutputEvent> {
    #[inline]
    fn emit(&mut self, event: OutputEvent) {
        let _ = self.send(event);
    }
}

/// Discards everything (benchmarks)
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    #[inline]
    fn emit(&mut self, _event: OutputEvent) {}
}

/// Counts events by kind without storing them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountingSink {
    pub trades: u64,
    pub accepted: u64,
    pub cancelled: u64,
    pub rejected: u64,
    pub book_deltas: u64,
}

impl EventSink for CountingSink {
    #[inline]
    fn emit(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Trade(_) => self.trades += 1,
            OutputEvent::Accepted(_) => self.accepted += 1,
            OutputEvent::Cancelled(_) => self.cancelled += 1,
            OutputEvent::Rejected(_) => self.rejected += 1,
            OutputEvent::BookDelta(_) => self.book_deltas += 1,
        }
    }
}

/// Lock-free SPSC ring to a single consumer thread.
///
/// Best effort - events are dropped when the ring is full.
#[cfg(feature = "runtime")]
impl EventSink for rtrb::Producer<OutputEvent> {
    #[inline]
    fn emit(&mut self, event: OutputEvent) {
        let _ = self.push(event);
    }
}
