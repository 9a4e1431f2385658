//! Engine Driver - the single matching thread.
//!
//! Drains the ingestion channel in bounded batches, applies each intent to
//! the engine in arrival order, forwards the resulting events to a sink and
//! publishes a depth snapshot after every non-empty batch.
//!
//! ```text
//! [Submitter]──┐
//! [Submitter]──┼──► [Ingestion Channel] ──► [Driver Thread (Pinned)] ──► [EventSink]
//! [Submitter]──┘                                   │
//!                                                  └──► [DepthSnapshot] ──► readers
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::channel::{self, Consumer, Producer, PushError};
use crate::command::{Intent, Order, OrderId, OutputEvent, Price, Side};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{EngineError, RejectReason};
use crate::pool::OrderPool;
use crate::sink::{CountingSink, EventSink};
use crate::snapshot::{SnapshotPublisher, SnapshotReader};

/// Counters kept by the driver loop
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Intents taken off the channel
    pub intents: u64,
    /// Non-empty batches processed
    pub batches: u64,
    /// Output events by kind
    pub events: CountingSink,
}

/// Owns the engine and the consuming end of the ingestion channel.
pub struct Driver<S: EventSink> {
    engine: Engine,
    consumer: Consumer<Intent>,
    sink: S,
    publisher: SnapshotPublisher,
    /// Reused per-batch event buffer
    batch: Vec<OutputEvent>,
    batch_size: usize,
    snapshot_depth: usize,
    stats: DriverStats,
}

impl<S: EventSink> Driver<S> {
    pub fn new(engine: Engine, consumer: Consumer<Intent>, sink: S, config: &EngineConfig) -> Self {
        Self {
            engine,
            consumer,
            sink,
            publisher: SnapshotPublisher::new(),
            batch: Vec::with_capacity(config.batch_size * 4),
            batch_size: config.batch_size.max(1),
            snapshot_depth: config.snapshot_depth,
            stats: DriverStats::default(),
        }
    }

    #[inline]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    pub fn snapshots(&self) -> SnapshotReader {
        self.publisher.reader()
    }

    /// Process up to one batch of intents. Returns how many were applied.
    pub fn run_once(&mut self) -> usize {
        let mut processed = 0;
        while processed < self.batch_size {
            let Some(intent) = self.consumer.try_pop() else {
                break;
            };
            self.engine.process_intent_into(intent, &mut self.batch);
            processed += 1;
        }

        if processed > 0 {
            for event in self.batch.drain(..) {
                self.stats.events.emit(event);
                self.sink.emit(event);
            }
            self.sink.flush();

            self.stats.intents += processed as u64;
            self.stats.batches += 1;
            self.publisher
                .publish(self.engine.depth_snapshot(self.snapshot_depth));
        }

        processed
    }

    /// Busy-poll until `shutdown` is set and the channel is drained.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        loop {
            if self.run_once() == 0 {
                if shutdown.load(Ordering::Acquire) && self.consumer.is_empty() {
                    break;
                }
                std::hint::spin_loop();
            }
        }
    }

    pub fn into_parts(self) -> (Engine, DriverStats) {
        (self.engine, self.stats)
    }
}

/// Producer handle. Clone one per producer thread.
#[derive(Clone)]
pub struct Submitter {
    producer: Producer<Intent>,
    pool: Arc<OrderPool>,
    next_id: Arc<AtomicU64>,
}

impl Submitter {
    pub fn new(producer: Producer<Intent>, pool: Arc<OrderPool>) -> Self {
        Self {
            producer,
            pool,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Submit a limit order under a fresh ID.
    ///
    /// `Ok` means the order was enqueued; its fate is reported through the
    /// event sink.
    pub fn submit(&self, side: Side, price: Price, qty: u32) -> Result<OrderId, RejectReason> {
        let order_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.submit_order(Order::new(order_id, side, price, qty))?;
        Ok(order_id)
    }

    /// Enqueue an order that carries its own ID.
    pub fn submit_order(&self, order: Order) -> Result<(), RejectReason> {
        order.validate()?;

        let mut slot = self.pool.acquire()?;
        self.pool.write(&mut slot, &order);

        match self.producer.try_push(Intent::NewOrder(slot)) {
            Ok(()) => Ok(()),
            Err(PushError::Full(intent)) => {
                if let Intent::NewOrder(slot) = intent {
                    if let Err(e) = self.pool.release(slot) {
                        warn!(%e, "could not return slot after full channel");
                    }
                }
                Err(RejectReason::ChannelFull)
            }
        }
    }

    /// Enqueue a cancel. The outcome arrives as a `Cancelled` or
    /// `Rejected { reason: NotFound }` event.
    pub fn cancel(&self, order_id: OrderId) -> Result<(), RejectReason> {
        self.producer
            .try_push(Intent::Cancel(order_id))
            .map_err(|_| RejectReason::ChannelFull)
    }

    #[inline]
    pub fn pool(&self) -> &Arc<OrderPool> {
        &self.pool
    }
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("channel", &self.producer)
            .field("pool", &self.pool)
            .finish()
    }
}

/// A running driver thread.
pub struct EngineHandle {
    submitter: Submitter,
    snapshots: SnapshotReader,
    shutdown: Arc<AtomicBool>,
    thread: JoinHandle<(Engine, DriverStats)>,
}

impl EngineHandle {
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    pub fn snapshots(&self) -> SnapshotReader {
        self.snapshots.clone()
    }

    /// Stop the driver once the channel is drained and hand back the engine.
    ///
    /// Producers should be finished first; intents pushed after the driver
    /// exits are dropped with the channel.
    pub fn shutdown(self) -> Result<(Engine, DriverStats), EngineError> {
        self.shutdown.store(true, Ordering::Release);
        self.thread.join().map_err(|_| EngineError::DriverPanicked)
    }
}

/// Build pool, channel and engine from `config` and start the driver thread.
pub fn spawn<S>(config: EngineConfig, sink: S) -> Result<EngineHandle, EngineError>
where
    S: EventSink + Send + 'static,
{
    config.validate()?;

    let pool = Arc::new(OrderPool::with_config(config.pool_config()));
    let (producer, consumer) = channel::bounded(config.channel_capacity)?;
    let mut driver = Driver::new(Engine::with_pool(Arc::clone(&pool)), consumer, sink, &config);

    let snapshots = driver.snapshots();
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);

    let thread = std::thread::Builder::new()
        .name("relay-lob-driver".into())
        .spawn(move || {
            if config.pin_to_core {
                driver.engine().pin_to_core();
            }
            if config.warm_up {
                driver.engine().warm_up();
            }
            info!(
                pool_capacity = driver.engine().pool().capacity(),
                channel_capacity = config.channel_capacity,
                batch_size = config.batch_size,
                "driver started"
            );

            driver.run(&flag);

            let (engine, stats) = driver.into_parts();
            info!(?stats, resting = engine.order_count(), "driver stopped");
            (engine, stats)
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle {
        submitter: Submitter::new(producer, pool),
        snapshots,
        shutdown,
        thread,
    })
}
