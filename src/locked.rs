//! Producer and consumer sharing a queue behind a single lock.
//!
//! Every push and every pop happens under the lock, so the consumer observes
//! the items in the exact order they were pushed, each exactly once.
//!
//! The consumer never waits though: when the queue is empty it still takes the
//! lock, finds nothing, releases it and tries again. With a slow producer this
//! is a busy poll under lock, burning a whole core; the wasted passes are
//! counted in `ConsumerStats::empty_polls`.
//!
//! The producer checks the consumed count before each push, on its own
//! cadence, so it may push a few items past the limit that nobody will ever
//! read. That overshoot is not bounded.

use std::collections::VecDeque;
use std::sync;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::common::{self, Shared, UniqueConsumer, UniqueProducer};
use crate::config::{Config, Strategy};
use crate::error::Result;
use crate::interface::{Channel, ChannelStats, Consumer, Producer};
use crate::interface::{ConsumerReport, ConsumerStats, ProducerReport};

//
//  Public Structs
//
/// Locked Channel
#[derive(Clone)]
pub struct LockedChannel(sync::Arc<Shared<LockedQueue>>);

/// Consumer of Locked Channel
pub struct LockedConsumer(UniqueConsumer<LockedQueue>);

/// Producer of Locked Channel
pub struct LockedProducer(UniqueProducer<LockedQueue>);

/// The queue of the lock-based strategies.
pub struct LockedQueue {
    items: Mutex<VecDeque<String>>,
    /// Largest length seen by the producer.
    peak_len: AtomicUsize,
}

//
//  Public Methods
//
impl LockedQueue {
    //  items: Mutex<VecDeque<String>>,
    //  peak_len: AtomicUsize,

    /// Creates a new, empty, `LockedQueue`.
    pub fn new() -> LockedQueue {
        LockedQueue {
            items: Mutex::new(VecDeque::new()),
            peak_len: AtomicUsize::new(0),
        }
    }

    /// Returns the lock guarding the items.
    pub fn items(&self) -> &Mutex<VecDeque<String>> { &self.items }

    /// Returns the current length, taking the lock.
    pub fn len(&self) -> usize { self.items.lock().len() }

    /// Returns whether the queue is empty, taking the lock.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Returns the largest length observed after a push.
    pub fn peak_len(&self) -> usize { self.peak_len.load(Ordering::Relaxed) }

    /// Records the length observed after a push.
    ///
    /// Called by the producer only, with the items lock held.
    pub fn observe_len(&self, len: usize) {
        if len > self.peak_len.load(Ordering::Relaxed) {
            self.peak_len.store(len, Ordering::Relaxed);
        }
    }

    /// Samples the queue state shared by all lock-based channels.
    pub(crate) fn stats<Q>(&self, shared: &Shared<Q>) -> ChannelStats {
        ChannelStats {
            remaining: self.len(),
            peak_len: self.peak_len(),
            peak_occupancy: Some(shared.occupancy().peak()),
        }
    }
}

impl LockedChannel {
    //  (sync::Arc<Shared<LockedQueue>>)

    /// Returns the shared queue.
    pub fn queue(&self) -> &LockedQueue { self.0.queue() }
}

//
//  Trait Implementations
//
impl Default for LockedQueue {
    fn default() -> LockedQueue { LockedQueue::new() }
}

impl Channel for LockedChannel {
    type Item = String;
    type Producer = LockedProducer;
    type Consumer = LockedConsumer;

    const STRATEGY: Strategy = Strategy::Locked;

    fn new(config: &Config) -> LockedChannel {
        LockedChannel(sync::Arc::new(Shared::new(LockedQueue::new(), config)))
    }

    fn spawn_producer(&self) -> Result<LockedProducer> {
        UniqueProducer::new(&self.0).map(LockedProducer)
    }

    fn spawn_consumer(&self) -> Result<LockedConsumer> {
        UniqueConsumer::new(&self.0).map(LockedConsumer)
    }

    fn stats(&self) -> ChannelStats { self.queue().stats(&self.0) }

    fn stop(&self) { self.0.stop(); }
}

impl Producer for LockedProducer {
    //  (UniqueProducer<LockedQueue>)

    /// Pushes `item-0, item-1, ...` until the consumed count reaches the
    /// limit, optionally pausing before each push.
    fn run(self) -> ProducerReport {
        let shared = self.0.shared();
        let queue = shared.queue();

        let mut counter = 0;
        while !shared.limit_reached() {
            shared.pace();

            let mut guard = queue.items().lock();
            let _inside = shared.occupancy().enter();

            guard.push_back(common::label(counter));
            queue.observe_len(guard.len());
            shared.count_produced();
            counter += 1;
        }

        ProducerReport { produced: shared.produced() }
    }
}

impl Consumer<String> for LockedConsumer {
    //  (UniqueConsumer<LockedQueue>)

    /// Takes the lock, pops the front if any, releases the lock; over and over
    /// until the consumed count reaches the limit.
    fn run(self) -> ConsumerReport<String> {
        let shared = self.0.shared();
        let queue = shared.queue();

        let mut stats = ConsumerStats::default();
        let mut items = Vec::new();

        while !shared.limit_reached() {
            let popped = {
                let mut guard = queue.items().lock();
                let _inside = shared.occupancy().enter();
                stats.lock_acquisitions += 1;

                let popped = guard.pop_front();
                if popped.is_some() {
                    shared.count_consumed();
                }
                popped
            };

            match popped {
                Some(item) => {
                    trace!(item = %item, "consumed");
                    shared.trace(&item);
                    stats.consumed += 1;
                    if shared.record() {
                        items.push(item);
                    }
                }
                None => stats.empty_polls += 1,
            }
        }

        ConsumerReport { stats, items }
    }
}
