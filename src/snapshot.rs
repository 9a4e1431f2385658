//! Read-only depth snapshots for threads other than the matching thread.
//!
//! The matching thread builds a fresh [`DepthSnapshot`] after each batch and
//! swaps it in; readers never block it and never see a half-applied batch.
//!
//! ```text
//! Reader ──► load() ──► Arc<DepthSnapshot> ──► read (never blocked)
//! Driver ──► build + publish() ──► atomic swap
//! ```

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::command::Price;
use crate::order_book::LevelDepth;

/// Aggregated book depth at a point in the arrival sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DepthSnapshot {
    /// Arrival sequence of the last order admitted before the snapshot
    pub sequence: u64,
    /// Bid levels, highest price first
    pub bids: Vec<LevelDepth>,
    /// Ask levels, lowest price first
    pub asks: Vec<LevelDepth>,
}

impl DepthSnapshot {
    /// Best bid as (price, aggregate quantity)
    pub fn best_bid(&self) -> Option<(Price, u64)> {
        self.bids.first().map(|l| (l.price, l.qty))
    }

    /// Best ask as (price, aggregate quantity)
    pub fn best_ask(&self) -> Option<(Price, u64)> {
        self.asks.first().map(|l| (l.price, l.qty))
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Write side, owned by the matching thread.
pub struct SnapshotPublisher {
    swap: Arc<ArcSwap<DepthSnapshot>>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self {
            swap: Arc::new(ArcSwap::from_pointee(DepthSnapshot::default())),
        }
    }

    #[inline]
    pub fn publish(&self, snapshot: DepthSnapshot) {
        self.swap.store(Arc::new(snapshot));
    }

    /// A handle any thread can read through
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            swap: Arc::clone(&self.swap),
        }
    }
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock-free read handle
#[derive(Clone)]
pub struct SnapshotReader {
    swap: Arc<ArcSwap<DepthSnapshot>>,
}

impl SnapshotReader {
    /// Latest published snapshot
    #[inline]
    pub fn load(&self) -> Arc<DepthSnapshot> {
        self.swap.load_full()
    }

    pub fn best_bid(&self) -> Option<(Price, u64)> {
        self.swap.load().best_bid()
    }

    pub fn best_ask(&self) -> Option<(Price, u64)> {
        self.swap.load().best_ask()
    }

    pub fn sequence(&self) -> u64 {
        self.swap.load().sequence
    }
}

impl std::fmt::Debug for SnapshotReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.swap.load();
        f.debug_struct("SnapshotReader")
            .field("sequence", &snapshot.sequence)
            .field("best_bid", &snapshot.best_bid())
            .field("best_ask", &snapshot.best_ask())
            .finish()
    }
}
