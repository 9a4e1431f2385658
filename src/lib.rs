//! # relay-lob
//!
//! A single-instrument limit order book with lock-free ingestion and pooled
//! order storage.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: One driver thread owns the order book exclusively (no locks)
//! - **Lock-Free Ingestion**: Any number of producers push into a bounded MPSC ring
//! - **Pooled Orders**: 64-byte aligned nodes in a concurrent slab, 32-bit indices
//! - **Price-Time Priority**: Best price first, FIFO within a level, fills at the resting price
//!
//! ## Architecture
//!
//! ```text
//! [Producer Threads] --> [MPSC Ring Buffer] --> [Driver Thread (Pinned)] --> [EventSink]
//!         |                                             |
//!         +------------> [Order Pool] <-----------------+
//!                                                       |
//!                                               [DepthSnapshot] --> readers
//! ```

pub mod channel;
pub mod command;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod matching;
pub mod order_book;
pub mod pool;
pub mod price;
pub mod price_level;
pub mod sink;
pub mod snapshot;

// Re-exports for convenience
pub use channel::{bounded, Consumer, Producer, PushError};
pub use command::{
    BookUpdate, Intent, Order, OrderAccepted, OrderCancelled, OrderId, OrderRejected,
    OutputEvent, Price, Quantity, Side, TradeEvent,
};
pub use config::EngineConfig;
pub use driver::{spawn, Driver, DriverStats, EngineHandle, Submitter};
pub use engine::Engine;
pub use error::{ConfigError, EngineError, PoolError, PriceError, RejectReason};
pub use matching::MatchingEngine;
pub use order_book::{LevelDepth, OrderBook};
pub use pool::{OrderNode, OrderPool, OrderSlot, PoolConfig, NULL_INDEX};
pub use price_level::PriceLevel;
pub use sink::{CountingSink, EventSink, NullSink};
pub use snapshot::{DepthSnapshot, SnapshotPublisher, SnapshotReader};
