//! Lock-based producer and consumer, the consumer sleeping while empty.
//!
//! Same queue, same lock as the locked strategy, but when the consumer finds
//! the queue empty it blocks on a condition variable, which the producer
//! signals after every push. The consumer then only takes the lock when there
//! is, in all likelihood, something to take: wasted acquisitions are down to
//! spurious wakeups and wakeups racing with a previous pop.

use std::sync;

use parking_lot::Condvar;
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
/// Notify Channel
#[derive(Clone)]
pub struct NotifyChannel(sync::Arc<Shared<NotifyQueue>>);

/// Consumer of Notify Channel
pub struct NotifyConsumer(UniqueConsumer<NotifyQueue>);

/// Producer of Notify Channel
pub struct NotifyProducer(UniqueProducer<NotifyQueue>);

/// A `LockedQueue` paired with its "not empty" condition.
pub struct NotifyQueue {
    queue: LockedQueue,
    not_empty: Condvar,
}

//
//  Public Methods
//
impl NotifyChannel {
    //  (sync::Arc<Shared<NotifyQueue>>)

    /// Returns the shared queue.
    pub fn queue(&self) -> &LockedQueue { &self.0.queue().queue }
}

//
//  Trait Implementations
//
impl Channel for NotifyChannel {
    type Item = String;
    type Producer = NotifyProducer;
    type Consumer = NotifyConsumer;

    const STRATEGY: Strategy = Strategy::Notify;

    fn new(config: &Config) -> NotifyChannel {
        let queue = NotifyQueue {
            queue: LockedQueue::new(),
            not_empty: Condvar::new(),
        };
        NotifyChannel(sync::Arc::new(Shared::new(queue, config)))
    }

    fn spawn_producer(&self) -> Result<NotifyProducer> {
        UniqueProducer::new(&self.0).map(NotifyProducer)
    }

    fn spawn_consumer(&self) -> Result<NotifyConsumer> {
        UniqueConsumer::new(&self.0).map(NotifyConsumer)
    }

    fn stats(&self) -> ChannelStats { self.queue().stats(&self.0) }

    fn stop(&self) { self.0.stop(); }
}

impl Producer for NotifyProducer {
    //  (UniqueProducer<NotifyQueue>)

    /// Pushes `item-0, item-1, ...` until the consumed count reaches the
    /// limit, signalling the consumer after each push.
    fn run(self) -> ProducerReport {
        let shared = self.0.shared();
        let NotifyQueue { queue, not_empty } = shared.queue();

        let mut counter = 0;
        while !shared.limit_reached() {
            shared.pace();

            {
                let mut guard = queue.items().lock();
                let _inside = shared.occupancy().enter();

                guard.push_back(common::label(counter));
                queue.observe_len(guard.len());
                shared.count_produced();
                counter += 1;
            }

            not_empty.notify_one();
        }

        ProducerReport { produced: shared.produced() }
    }
}

impl Consumer<String> for NotifyConsumer {
    //  (UniqueConsumer<NotifyQueue>)

    /// Takes the lock, waits while the queue is empty, pops the front; until
    /// the consumed count reaches the limit.
    ///
    /// The emptiness check and the wait happen under the same lock the
    /// producer pushes under, so no signal can slip in between.
    fn run(self) -> ConsumerReport<String> {
        let shared = self.0.shared();
        let NotifyQueue { queue, not_empty } = shared.queue();

        let mut stats = ConsumerStats::default();
        let mut items = Vec::new();

        while !shared.limit_reached() {
            let item = {
                let mut guard = queue.items().lock();
                stats.lock_acquisitions += 1;

                loop {
                    let popped = {
                        let _inside = shared.occupancy().enter();
                        guard.pop_front()
                    };

                    if let Some(item) = popped {
                        shared.count_consumed();
                        break item;
                    }

                    stats.empty_polls += 1;
                    not_empty.wait(&mut guard);
                    stats.wakeups += 1;
                    stats.lock_acquisitions += 1;
                }
            };

            trace!(item = %item, "consumed");
            shared.trace(&item);
            stats.consumed += 1;
            if shared.record() {
                items.push(item);
            }
        }

        ConsumerReport { stats, items }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    fn config(limit: usize) -> Config {
        Config::new(Strategy::Notify).with_limit(limit).with_record(true)
    }

    #[rstest]
    #[case(1)]
    #[case(1_000)]
    #[case(100_000)]
    fn threads_hand_off_exactly_once(#[case] limit: usize) {
        let channel = NotifyChannel::new(&config(limit));
        let producer = channel.spawn_producer().unwrap();
        let consumer = channel.spawn_consumer().unwrap();

        let producer = thread::spawn(move || producer.run());
        let consumer = thread::spawn(move || consumer.run());

        let produced = producer.join().unwrap();
        let consumed = consumer.join().unwrap();

        let expected: Vec<_> = (0..limit).map(common::label).collect();
        assert_eq!(consumed.items, expected);
        assert_eq!(consumed.stats.wakeups, consumed.stats.empty_polls);

        let stats = channel.stats();
        assert_eq!(stats.remaining, produced.produced - limit);
        assert_eq!(stats.peak_occupancy, Some(1));
    }

    #[rstest]
    fn consumer_sleeps_until_signalled() {
        let channel = NotifyChannel::new(&config(1));
        let consumer = channel.spawn_consumer().unwrap();
        let handle = thread::spawn(move || consumer.run());

        //  Give the consumer ample time to find the queue empty and block.
        thread::sleep(Duration::from_millis(50));

        {
            let NotifyQueue { queue, not_empty } = channel.0.queue();
            queue.items().lock().push_back(common::label(7));
            not_empty.notify_one();
        }

        let report = handle.join().unwrap();

        assert_eq!(report.items, vec!["item-7"]);
        //  Blocked, not polling: a handful of acquisitions at most.
        assert!(report.stats.lock_acquisitions <= 3);
        assert_eq!(report.stats.wakeups, report.stats.empty_polls);
    }
}
