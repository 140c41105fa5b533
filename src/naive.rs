//! Unsynchronized producer and consumer: intentionally broken.
//!
//! The producer pushes `0, 1, 2, ...` as fast as it can, the consumer reads
//! the front and then pops it, and nothing coordinates the two. This module
//! exists to show what goes wrong, it must not be fixed:
//!
//! - the queue keeps a `head` and a `len`, and both sides update `len` with a
//!     load followed by a store. When the two interleave, one update is lost:
//!     a lost pop resurrects a stale slot (a value is seen twice), a lost push
//!     lets the next push overwrite an unread slot (a value is skipped).
//! - reading the front and popping it are two separate operations. `pop`
//!     removes whatever slot `head` designates at that moment; only the
//!     consumer moves `head`, so the removed value differs from the one just
//!     read only once the producer overwrote that slot in between, which
//!     takes a lap of the ring. Lost pops leave `len` too high and bring that
//!     lap closer.
//! - the consumer loop is gated by a counter incremented in the loop
//!     condition itself, so it counts passes, empty ones included, rather than
//!     consumed items.
//! - nothing bounds the queue length; once it exceeds the ring the producer
//!     laps the consumer and overwrites unread values.
//!
//! Every access is a single atomic word operation: the races are logical,
//! never undefined behaviour.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync;

use crossbeam_utils::CachePadded;
use tracing::{debug, warn};

use crate::common::{Shared, UniqueConsumer, UniqueProducer};
use crate::config::{Config, Strategy};
use crate::error::Result;
use crate::interface::{Channel, ChannelStats, Consumer, Producer};
use crate::interface::{ConsumerReport, ConsumerStats, ProducerReport};

//
//  Public Structs
//
/// Naive Channel
#[derive(Clone)]
pub struct NaiveChannel(sync::Arc<Shared<RacyQueue>>);

/// Consumer of Naive Channel
pub struct NaiveConsumer(UniqueConsumer<RacyQueue>);

/// Producer of Naive Channel
pub struct NaiveProducer(UniqueProducer<RacyQueue>);

/// A FIFO ring whose length is maintained without any synchronization.
///
/// Single producer, single consumer, and still wrong: see the module
/// documentation.
pub struct RacyQueue {
    slots: Box<[AtomicU64]>,
    /// Index of the front slot, only written by the consumer.
    head: CachePadded<AtomicUsize>,
    /// Number of items, written by both sides.
    len: CachePadded<AtomicUsize>,
    /// Largest length seen by the producer.
    peak_len: AtomicUsize,
}

//
//  Private Structs
//

//  The first half of a push: the position the producer is about to fill.
struct PendingPush {
    head: usize,
    len: usize,
}

//  The first half of a pop: the state the consumer is about to overwrite.
struct PendingPop {
    head: usize,
    len: usize,
}

//
//  Public Methods
//
impl NaiveChannel {
    //  (sync::Arc<Shared<RacyQueue>>)

    /// Returns the shared queue.
    pub fn queue(&self) -> &RacyQueue { self.0.queue() }
}

impl RacyQueue {
    //  slots: Box<[AtomicU64]>,
    //  head: CachePadded<AtomicUsize>,
    //  len: CachePadded<AtomicUsize>,
    //  peak_len: AtomicUsize,

    /// Creates a new `RacyQueue` over `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> RacyQueue {
        assert!(capacity > 0, "RacyQueue needs at least one slot");

        RacyQueue {
            slots: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            head: CachePadded::new(AtomicUsize::new(0)),
            len: CachePadded::new(AtomicUsize::new(0)),
            peak_len: AtomicUsize::new(0),
        }
    }

    /// Returns the number of slots.
    pub fn capacity(&self) -> usize { self.slots.len() }

    /// Returns the believed length.
    pub fn len(&self) -> usize { self.len.load(Ordering::Acquire) }

    /// Returns whether the queue is believed empty.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Returns the largest length the producer observed.
    pub fn peak_len(&self) -> usize { self.peak_len.load(Ordering::Relaxed) }

    /// Appends a value at the back.
    pub fn push(&self, value: u64) {
        let pending = self.begin_push();
        self.commit_push(pending, value);
    }

    /// Reads the front value, without removing it.
    pub fn front(&self) -> Option<u64> {
        if self.is_empty() {
            return None;
        }

        let head = self.head.load(Ordering::Acquire);
        Some(self.slots[head % self.capacity()].load(Ordering::Acquire))
    }

    /// Removes the front value, whatever it currently is.
    pub fn pop(&self) {
        let pending = self.begin_pop();
        self.commit_pop(pending);
    }
}

//
//  Trait Implementations
//
impl Channel for NaiveChannel {
    type Item = u64;
    type Producer = NaiveProducer;
    type Consumer = NaiveConsumer;

    const STRATEGY: Strategy = Strategy::Naive;

    /// Creates the shared context, with at least one slot in the ring.
    fn new(config: &Config) -> NaiveChannel {
        let queue = RacyQueue::new(config.naive_capacity.max(1));
        NaiveChannel(sync::Arc::new(Shared::new(queue, config)))
    }

    fn spawn_producer(&self) -> Result<NaiveProducer> {
        UniqueProducer::new(&self.0).map(NaiveProducer)
    }

    fn spawn_consumer(&self) -> Result<NaiveConsumer> {
        UniqueConsumer::new(&self.0).map(NaiveConsumer)
    }

    fn stats(&self) -> ChannelStats {
        ChannelStats {
            remaining: self.queue().len(),
            peak_len: self.queue().peak_len(),
            peak_occupancy: None,
        }
    }

    fn stop(&self) { self.0.stop(); }
}

impl Producer for NaiveProducer {
    //  (UniqueProducer<RacyQueue>)

    /// Pushes `0, 1, 2, ...` until the consumer pass counter reaches the
    /// limit.
    fn run(self) -> ProducerReport {
        let shared = self.0.shared();
        let queue = shared.queue();

        let mut counter = 0;
        while !shared.limit_reached() {
            shared.pace();
            queue.push(counter);
            shared.count_produced();
            counter += 1;
        }

        ProducerReport { produced: shared.produced() }
    }
}

impl Consumer<u64> for NaiveConsumer {
    //  (UniqueConsumer<RacyQueue>)

    /// Reads then pops the front until the pass counter reaches the limit.
    ///
    /// The pass counter is bumped in the loop condition, so every pass counts,
    /// whether it found an item or not.
    fn run(self) -> ConsumerReport<u64> {
        let shared = self.0.shared();
        let queue = shared.queue();

        let mut stats = ConsumerStats::default();
        let mut items = Vec::new();
        let mut previous: Option<u64> = None;

        while shared.count_consumed() < shared.limit() {
            let front = match queue.front() {
                Some(front) => front,
                None => {
                    stats.empty_polls += 1;
                    shared.trace("consumer wasting resources");
                    continue;
                }
            };

            shared.trace(&front);

            //  The producer may move the queue under our feet right here.
            queue.pop();

            if let Some(previous) = previous {
                if front != previous.wrapping_add(1) {
                    stats.anomalies += 1;
                    debug!(previous, front, "out of sequence value");
                }
            }
            previous = Some(front);

            stats.consumed += 1;
            if shared.record() {
                items.push(front);
            }
        }

        if stats.anomalies > 0 {
            warn!(
                anomalies = stats.anomalies,
                consumed = stats.consumed,
                "unsynchronized consumer saw duplicated or skipped values"
            );
        }

        ConsumerReport { stats, items }
    }
}

//
//  Private Methods
//
impl RacyQueue {
    fn begin_push(&self) -> PendingPush {
        PendingPush {
            head: self.head.load(Ordering::Acquire),
            len: self.len.load(Ordering::Acquire),
        }
    }

    fn commit_push(&self, pending: PendingPush, value: u64) {
        let index = pending.head.wrapping_add(pending.len) % self.capacity();
        self.slots[index].store(value, Ordering::Release);

        let len = pending.len + 1;
        self.len.store(len, Ordering::Release);

        if len > self.peak_len.load(Ordering::Relaxed) {
            self.peak_len.store(len, Ordering::Relaxed);
        }
    }

    fn begin_pop(&self) -> PendingPop {
        PendingPop {
            head: self.head.load(Ordering::Acquire),
            len: self.len.load(Ordering::Acquire),
        }
    }

    fn commit_pop(&self, pending: PendingPop) {
        if pending.len == 0 {
            return;
        }

        self.head.store(pending.head.wrapping_add(1), Ordering::Release);
        self.len.store(pending.len - 1, Ordering::Release);
    }
}
