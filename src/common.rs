//! Common building blocks for the channels, consumers and producers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::{fmt, sync, thread, time};

use crossbeam_utils::CachePadded;

use crate::config::Config;
use crate::error::{Error, Result, Role};

//
//  Public Structs
//

/// Building block for channels.
///
/// It contains all the state shared by the producer and the consumer:
/// - the queue itself, whose type depends on the strategy,
/// - the consumed and produced counters,
/// - the registration counters of the two roles,
/// - the settings of the run.
///
/// # Concurrency
///
/// The consumed and produced counters are atomics, independent of whatever
/// protects the queue: both sides read the consumed counter outside of any
/// lock to decide whether to keep going. They are padded onto their own cache
/// lines, as the consumed counter is written by the consumer and polled by the
/// producer on every iteration.
pub struct Shared<Q> {
    /// The strategy-specific queue.
    queue: Q,
    /// Number of items consumed so far; the termination signal.
    consumed: CachePadded<AtomicUsize>,
    /// Number of items pushed so far.
    produced: CachePadded<AtomicUsize>,
    /// 0/1, whether a consumer is registered.
    consumers: AtomicUsize,
    /// 0/1, whether a producer is registered.
    producers: AtomicUsize,
    /// Occupancy of the queue critical section.
    occupancy: Occupancy,
    limit: usize,
    delay: Option<time::Duration>,
    trace: bool,
    record: bool,
}

/// Building block for the unique consumer of a channel.
pub struct UniqueConsumer<Q> {
    shared: sync::Arc<Shared<Q>>,
}

/// Building block for the unique producer of a channel.
pub struct UniqueProducer<Q> {
    shared: sync::Arc<Shared<Q>>,
}

/// Counts the threads inside a critical section, and the peak of that count.
///
/// Under a correct lock the peak never exceeds 1.
#[derive(Debug, Default)]
pub struct Occupancy {
    inside: AtomicUsize,
    peak: AtomicUsize,
}

/// Proof of presence inside a critical section, leaves it on drop.
pub struct OccupancyGuard<'a>(&'a Occupancy);

//
//  Public Functions
//

/// Returns the label of the `index`-th produced item.
pub fn label(index: usize) -> String {
    format!("item-{}", index)
}

//
//  Public Methods
//
impl<Q> Shared<Q> {
    //  queue: Q,
    //  consumed: CachePadded<AtomicUsize>,
    //  produced: CachePadded<AtomicUsize>,
    //  consumers: AtomicUsize,
    //  producers: AtomicUsize,
    //  occupancy: Occupancy,
    //  limit, delay, trace, record

    /// Creates a new `Shared` around the given queue.
    pub fn new(queue: Q, config: &Config) -> Shared<Q> {
        Shared {
            queue,
            consumed: CachePadded::new(AtomicUsize::new(0)),
            produced: CachePadded::new(AtomicUsize::new(0)),
            consumers: AtomicUsize::new(0),
            producers: AtomicUsize::new(0),
            occupancy: Occupancy::default(),
            limit: config.limit(),
            delay: config.delay(),
            trace: config.trace,
            record: config.record,
        }
    }

    /// Returns the queue.
    pub fn queue(&self) -> &Q { &self.queue }

    /// Returns the occupancy counter of the queue critical section.
    pub fn occupancy(&self) -> &Occupancy { &self.occupancy }

    /// Returns the number of items to consume.
    pub fn limit(&self) -> usize { self.limit }

    /// Returns whether consumed items should be kept.
    pub fn record(&self) -> bool { self.record }

    /// Returns whether the consumed count reached the limit.
    ///
    /// This is the termination predicate of both sides, each evaluating it on
    /// its own cadence.
    pub fn limit_reached(&self) -> bool {
        self.consumed.load(Ordering::Acquire) >= self.limit
    }

    /// Bumps the consumed counter, returning its previous value.
    pub fn count_consumed(&self) -> usize {
        self.consumed.fetch_add(1, Ordering::AcqRel)
    }

    /// Raises the consumed counter to the limit, if below.
    pub fn stop(&self) {
        self.consumed.fetch_max(self.limit, Ordering::AcqRel);
    }

    /// Bumps the produced counter.
    pub fn count_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the produced counter.
    pub fn produced(&self) -> usize { self.produced.load(Ordering::Relaxed) }

    /// Simulates a slow producer, if so configured.
    pub fn pace(&self) {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
    }

    /// Prints the item on stdout, if so configured.
    pub fn trace<T: fmt::Display + ?Sized>(&self, item: &T) {
        if self.trace {
            println!("{}", item);
        }
    }
}

impl<Q> UniqueConsumer<Q> {
    //  shared: sync::Arc<Shared<Q>>,

    /// Attempts to register the consumer of the given channel:
    /// - if no consumer is registered, succeeds, cloning the `Arc`.
    /// - otherwise fails with `RoleTaken`.
    pub fn new(shared: &sync::Arc<Shared<Q>>) -> Result<UniqueConsumer<Q>> {
        if register(&shared.consumers) {
            Ok(UniqueConsumer { shared: shared.clone() })
        } else {
            Err(Error::RoleTaken(Role::Consumer))
        }
    }

    /// Returns the shared context.
    pub fn shared(&self) -> &Shared<Q> { &self.shared }
}

impl<Q> UniqueProducer<Q> {
    //  shared: sync::Arc<Shared<Q>>,

    /// Attempts to register the producer of the given channel:
    /// - if no producer is registered, succeeds, cloning the `Arc`.
    /// - otherwise fails with `RoleTaken`.
    pub fn new(shared: &sync::Arc<Shared<Q>>) -> Result<UniqueProducer<Q>> {
        if register(&shared.producers) {
            Ok(UniqueProducer { shared: shared.clone() })
        } else {
            Err(Error::RoleTaken(Role::Producer))
        }
    }

    /// Returns the shared context.
    pub fn shared(&self) -> &Shared<Q> { &self.shared }
}

impl Occupancy {
    /// Enters the critical section.
    pub fn enter(&self) -> OccupancyGuard<'_> {
        let inside = self.inside.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(inside, Ordering::AcqRel);
        OccupancyGuard(self)
    }

    /// Returns the largest number of threads ever seen inside at once.
    pub fn peak(&self) -> usize { self.peak.load(Ordering::Acquire) }
}

//
//  Traits Implementations
//
impl<Q> Drop for UniqueConsumer<Q> {
    fn drop(&mut self) { self.shared.consumers.store(0, Ordering::Release); }
}

impl<Q> Drop for UniqueProducer<Q> {
    fn drop(&mut self) { self.shared.producers.store(0, Ordering::Release); }
}

impl<'a> Drop for OccupancyGuard<'a> {
    fn drop(&mut self) { self.0.inside.fetch_sub(1, Ordering::AcqRel); }
}

//
//  Private Functions
//
fn register(counter: &AtomicUsize) -> bool {
    counter
        .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}
