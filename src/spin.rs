//! Lock-based producer and consumer, plus an advisory "queue is empty" flag.
//!
//! Each consumer iteration goes through:
//!
//! ```text
//! WAIT_FLAG -> ACQUIRE_LOCK -> { NONEMPTY: POP & COUNT++ | EMPTY: SET_FLAG }
//!           -> RELEASE_LOCK -> loop, or stop once COUNT == LIMIT
//! ```
//!
//! The consumer sets the flag whenever it finds the queue empty, and the
//! producer clears it after every push. While the flag is set the consumer
//! spins on it instead of on the lock: still a busy wait, but one that no
//! longer contends with the producer for the lock.
//!
//! The flag is only a hint. Reading it and taking the lock are not atomic
//! together, and anybody may overwrite it at any time; the lock-protected push
//! and pop alone decide what is consumed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::{hint, sync};

use crossbeam_utils::CachePadded;
use tracing::trace;

use crate::common::{self, Shared, UniqueConsumer, UniqueProducer};
use crate::config::{Config, Strategy};
use crate::error::Result;
use crate::interface::{Channel, ChannelStats, Consumer, Producer};
use crate::interface::{ConsumerReport, ConsumerStats, ProducerReport};
use crate::locked::LockedQueue;

//
//  Public Structs
//
/// Spin Channel
#[derive(Clone)]
pub struct SpinChannel(sync::Arc<Shared<SpinQueue>>);

/// Consumer of Spin Channel
pub struct SpinConsumer(UniqueConsumer<SpinQueue>);

/// Producer of Spin Channel
pub struct SpinProducer(UniqueProducer<SpinQueue>);

/// A `LockedQueue` paired with its "believed empty" flag.
pub struct SpinQueue {
    queue: LockedQueue,
    empty: CachePadded<AtomicBool>,
}

//
//  Public Methods
//
impl SpinChannel {
    //  (sync::Arc<Shared<SpinQueue>>)

    /// Returns the shared queue.
    pub fn queue(&self) -> &LockedQueue { &self.0.queue().queue }

    /// Returns the current value of the "believed empty" flag.
    pub fn hint(&self) -> bool { self.0.queue().empty.load(Ordering::Acquire) }

    /// Overwrites the "believed empty" flag, whatever the queue holds.
    ///
    /// The consumer may then spin for nothing, or take the lock for nothing,
    /// but it never consumes anything wrongly.
    pub fn set_hint(&self, empty: bool) {
        self.0.queue().empty.store(empty, Ordering::Release);
    }
}

//
//  Trait Implementations
//
impl Channel for SpinChannel {
    type Item = String;
    type Producer = SpinProducer;
    type Consumer = SpinConsumer;

    const STRATEGY: Strategy = Strategy::Spin;

    fn new(config: &Config) -> SpinChannel {
        let queue = SpinQueue {
            queue: LockedQueue::new(),
            empty: CachePadded::new(AtomicBool::new(false)),
        };
        SpinChannel(sync::Arc::new(Shared::new(queue, config)))
    }

    fn spawn_producer(&self) -> Result<SpinProducer> {
        UniqueProducer::new(&self.0).map(SpinProducer)
    }

    fn spawn_consumer(&self) -> Result<SpinConsumer> {
        UniqueConsumer::new(&self.0).map(SpinConsumer)
    }

    fn stats(&self) -> ChannelStats { self.queue().stats(&self.0) }

    fn stop(&self) { self.0.stop(); }
}

impl Producer for SpinProducer {
    //  (UniqueProducer<SpinQueue>)

    /// Pushes `item-0, item-1, ...` until the consumed count reaches the
    /// limit, clearing the flag after each push.
    fn run(self) -> ProducerReport {
        let shared = self.0.shared();
        let SpinQueue { queue, empty } = shared.queue();

        let mut counter = 0;
        while !shared.limit_reached() {
            shared.pace();

            let mut guard = queue.items().lock();
            let _inside = shared.occupancy().enter();

            guard.push_back(common::label(counter));
            queue.observe_len(guard.len());
            shared.count_produced();
            counter += 1;

            empty.store(false, Ordering::Release);
        }

        ProducerReport { produced: shared.produced() }
    }
}

impl Consumer<String> for SpinConsumer {
    //  (UniqueConsumer<SpinQueue>)

    /// Spins while the flag is set, then takes the lock and pops the front if
    /// any, setting the flag otherwise; until the consumed count reaches the
    /// limit.
    fn run(self) -> ConsumerReport<String> {
        let shared = self.0.shared();
        let SpinQueue { queue, empty } = shared.queue();

        let mut stats = ConsumerStats::default();
        let mut items = Vec::new();

        'run: while !shared.limit_reached() {
            while empty.load(Ordering::Acquire) {
                //  Only reachable with a forged flag: the limit is reached by
                //  this very loop otherwise.
                if shared.limit_reached() {
                    break 'run;
                }
                stats.flag_spins += 1;
                hint::spin_loop();
            }

            let popped = {
                let mut guard = queue.items().lock();
                let _inside = shared.occupancy().enter();
                stats.lock_acquisitions += 1;

                let popped = guard.pop_front();
                if popped.is_some() {
                    shared.count_consumed();
                } else {
                    empty.store(true, Ordering::Release);
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

#[cfg(test)]
mod tests {
    use std::thread;

    use rstest::rstest;

    use super::*;

    fn config(limit: usize) -> Config {
        Config::new(Strategy::Spin).with_limit(limit).with_record(true)
    }

    #[rstest]
    fn empty_queue_sets_the_flag() {
        //  With nothing to consume and no producer, the consumer takes the
        //  lock once, raises the flag, and spins until the limit is forced.
        let channel = SpinChannel::new(&config(1));
        let consumer = channel.spawn_consumer().unwrap();
        let handle = thread::spawn(move || consumer.run());

        while !channel.hint() {
            thread::yield_now();
        }
        assert!(channel.queue().is_empty());

        channel.0.count_consumed();
        let report = handle.join().unwrap();

        assert_eq!(report.stats.lock_acquisitions, 1);
        assert_eq!(report.stats.empty_polls, 1);
        assert_eq!(report.stats.consumed, 0);
    }

    #[rstest]
    fn push_clears_the_flag() {
        let channel = SpinChannel::new(&config(1));
        channel.set_hint(true);

        let producer = channel.spawn_producer().unwrap();
        let handle = thread::spawn(move || producer.run());

        while channel.hint() {
            thread::yield_now();
        }
        channel.0.count_consumed();
        handle.join().unwrap();

        assert!(!channel.queue().is_empty());
    }

    #[rstest]
    fn stale_nonempty_hint_costs_one_acquisition() {
        //  The flag claims items are there, the lock says otherwise.
        let channel = SpinChannel::new(&config(2));
        channel.queue().items().lock().push_back(common::label(0));
        channel.set_hint(false);

        let consumer = channel.spawn_consumer().unwrap();
        let handle = thread::spawn(move || consumer.run());

        while !channel.hint() {
            thread::yield_now();
        }
        channel.queue().items().lock().push_back(common::label(1));
        channel.set_hint(false);

        let report = handle.join().unwrap();

        assert_eq!(report.items, vec!["item-0", "item-1"]);
        assert!(report.stats.empty_polls >= 1);
        assert_eq!(
            report.stats.lock_acquisitions,
            2 + report.stats.empty_polls
        );
    }

    #[rstest]
    fn threads_hand_off_exactly_once() {
        let limit = 10_000;
        let channel = SpinChannel::new(&config(limit));
        let producer = channel.spawn_producer().unwrap();
        let consumer = channel.spawn_consumer().unwrap();

        let producer = thread::spawn(move || producer.run());
        let consumer = thread::spawn(move || consumer.run());

        let produced = producer.join().unwrap();
        let consumed = consumer.join().unwrap();

        let expected: Vec<_> = (0..limit).map(common::label).collect();
        assert_eq!(consumed.items, expected);
        assert!(consumed.stats.empty_polls <= limit as u64 + 1);

        let stats = channel.stats();
        assert_eq!(stats.remaining, produced.produced - limit);
        assert_eq!(stats.peak_occupancy, Some(1));
    }
}
