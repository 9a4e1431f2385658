//! Error taxonomy.
//!
//! Everything here is an ordinary result value. Rejections happen on common,
//! expected paths (bad input, full queue, empty pool) and never unwind.
//! Broken book invariants are not represented: they panic at the site.

use thiserror::Error;

/// Why an order or cancel was not applied.
///
/// Carried in [`OrderRejected`](crate::command::OrderRejected) events and
/// returned by the synchronous submit/cancel paths.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RejectReason {
    /// Price is zero (prices are strictly positive ticks)
    #[error("invalid order: price must be positive")]
    InvalidPrice = 0,
    /// Quantity is zero
    #[error("invalid order: quantity must be positive")]
    InvalidQuantity = 1,
    /// Order ID is already live in the book
    #[error("order id is already live")]
    DuplicateOrderId = 2,
    /// Cancel target is unknown, filled or already cancelled
    #[error("order not found")]
    NotFound = 3,
    /// No pool slot available for the order record
    #[error("order pool exhausted")]
    PoolExhausted = 4,
    /// Ingestion channel had no free slot
    #[error("ingestion channel full")]
    ChannelFull = 5,
}

impl RejectReason {
    /// True for the `InvalidOrder` class: the order itself is malformed.
    #[inline]
    pub const fn is_invalid_order(self) -> bool {
        matches!(self, RejectReason::InvalidPrice | RejectReason::InvalidQuantity)
    }
}

/// Order pool failures.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot is live and growth is exhausted (or disabled)
    #[error("order pool exhausted")]
    Exhausted,
    /// The slot was already on the free list
    #[error("double release of pool slot {index}")]
    DoubleRelease { index: u32 },
}

impl From<PoolError> for RejectReason {
    fn from(_: PoolError) -> Self {
        RejectReason::PoolExhausted
    }
}

/// Failures converting an external price into ticks.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum PriceError {
    #[error("price must be positive, got {0}")]
    NotPositive(String),
    #[error("price {value} is finer than {scale} decimal places")]
    Precision { value: String, scale: u32 },
    #[error("price {0} does not fit in ticks")]
    OutOfRange(String),
    #[error("price scale {0} exceeds 18 decimal places")]
    Scale(u32),
}

/// Engine configuration problems, reported at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("channel capacity must be a non-zero power of two, got {0}")]
    ChannelCapacity(usize),
    #[error("pool capacity must be between 1 and {max}, got {got}")]
    PoolCapacity { got: u32, max: u32 },
    #[error("pool max capacity {max} is below initial capacity {initial}")]
    PoolGrowth { initial: u32, max: u32 },
    #[error("batch size must be non-zero")]
    BatchSize,
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failures starting or stopping the driver thread.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to spawn driver thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("driver thread panicked")]
    DriverPanicked,
}
