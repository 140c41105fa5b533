//! Generic interface of the channels, consumers and producers

use crate::config::{Config, Strategy};
use crate::error::Result;

//
//  Public Structs
//
/// What a producer reports once its loop exits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProducerReport {
    /// Number of items pushed into the queue.
    pub produced: usize,
}

/// Counters gathered by a consumer while its loop runs.
///
/// Not every strategy fills every counter: the naive consumer never locks,
/// only the spin consumer spins on a flag, only the notify consumer is woken.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConsumerStats {
    /// Items actually removed from the queue.
    pub consumed: usize,
    /// Times the queue lock was acquired (including re-acquisition on wakeup).
    pub lock_acquisitions: u64,
    /// Times the queue was found empty: a wasted poll.
    pub empty_polls: u64,
    /// Iterations of the spin-flag busy wait.
    pub flag_spins: u64,
    /// Returns from a condition variable wait.
    pub wakeups: u64,
    /// Items that did not follow their predecessor in sequence.
    pub anomalies: u64,
}

/// What a consumer reports once its loop exits.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConsumerReport<T> {
    /// Counters gathered during the run.
    pub stats: ConsumerStats,
    /// Consumed items, in consumption order, if recording was requested.
    pub items: Vec<T>,
}

/// State of the shared queue, sampled after both sides have joined.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChannelStats {
    /// Items left in the queue, never consumed.
    pub remaining: usize,
    /// Largest queue length observed by the producer.
    pub peak_len: usize,
    /// Largest number of threads observed inside the queue critical section,
    /// `None` when the strategy has no critical section to watch.
    pub peak_occupancy: Option<usize>,
}

//
//  Public Traits
//
/// Minimal interface of all producers.
pub trait Producer: Send + 'static {
    /// Pushes items until the consumed count reaches the limit.
    fn run(self) -> ProducerReport;
}

/// Minimal interface of all consumers.
pub trait Consumer<T>: Send + 'static {
    /// Pops items until the consumed count reaches the limit.
    fn run(self) -> ConsumerReport<T>;
}

/// Minimal interface of all channels.
///
/// A channel is a cheap handle over the shared context; clones refer to the
/// same queue and counters.
pub trait Channel: Clone + Send + 'static {
    /// Items travelling through the queue.
    type Item: Send + 'static;
    /// Producer to be used with this channel.
    type Producer: Producer;
    /// Consumer to be used with this channel.
    type Consumer: Consumer<Self::Item>;

    /// The strategy this channel implements.
    const STRATEGY: Strategy;

    /// Creates the shared context for a single run.
    fn new(config: &Config) -> Self;

    /// Attempts to spawn the producer for this channel, this will fail if a
    /// producer already exists.
    fn spawn_producer(&self) -> Result<Self::Producer>;

    /// Attempts to spawn the consumer for this channel, this will fail if a
    /// consumer already exists.
    fn spawn_consumer(&self) -> Result<Self::Consumer>;

    /// Samples the queue state.
    fn stats(&self) -> ChannelStats;

    /// Forces the consumed count to the limit, so that a running producer
    /// exits at its next check.
    ///
    /// Only meant for a run whose consumer never started.
    fn stop(&self);
}
