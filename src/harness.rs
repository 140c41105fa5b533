//! Runs one producer/consumer pair to completion and reports on it.
//!
//! The harness owns the shared context: it creates the channel, spawns the
//! producer and the consumer on their own threads, joins both, and times the
//! whole. Neither side can be cancelled, each stops on its own once the
//! consumed count reaches the limit.

use std::{fmt, thread, time};

use tracing::{debug, info, warn};

use crate::config::{Config, Strategy};
use crate::error::{Error, Result, Role};
use crate::interface::{Channel, ChannelStats, Consumer, Producer};
use crate::interface::{ConsumerReport, ConsumerStats, ProducerReport};
use crate::locked::LockedChannel;
use crate::naive::NaiveChannel;
use crate::notify::NotifyChannel;
use crate::spin::SpinChannel;

//
//  Public Structs
//

/// Everything observed during a run.
#[derive(Clone, Debug)]
pub struct RunReport<T> {
    /// The strategy that ran.
    pub strategy: Strategy,
    /// Wall-clock time from spawning the threads to joining them both.
    pub elapsed: time::Duration,
    /// What the producer reported.
    pub producer: ProducerReport,
    /// What the consumer reported.
    pub consumer: ConsumerReport<T>,
    /// State of the queue after the run.
    pub channel: ChannelStats,
}

/// A `RunReport` without the consumed items.
#[derive(Clone, Copy, Debug)]
pub struct Summary {
    /// The strategy that ran.
    pub strategy: Strategy,
    /// Wall-clock time from spawning the threads to joining them both.
    pub elapsed: time::Duration,
    /// What the producer reported.
    pub producer: ProducerReport,
    /// What the consumer counted.
    pub consumer: ConsumerStats,
    /// State of the queue after the run.
    pub channel: ChannelStats,
}

//
//  Public Functions
//

/// Runs the channel `C` configured by `config`.
pub fn run<C: Channel>(config: &Config) -> Result<RunReport<C::Item>> {
    config.validate()?;
    run_channel(C::new(config))
}

/// Runs an already created channel.
///
/// Keeping a clone of the channel lets the caller poke at the shared state
/// while the run is in progress.
pub fn run_channel<C: Channel>(channel: C) -> Result<RunReport<C::Item>> {
    let producer = channel.spawn_producer()?;
    let consumer = channel.spawn_consumer()?;

    info!(strategy = %C::STRATEGY, "starting producer and consumer");
    let started = time::Instant::now();

    let producer = spawn(Role::Producer, move || producer.run())?;
    let consumer = match spawn(Role::Consumer, move || consumer.run()) {
        Ok(consumer) => consumer,
        Err(error) => {
            abandon(&channel, producer)?;
            return Err(error);
        }
    };

    let producer = join(Role::Producer, producer)?;
    let consumer = join(Role::Consumer, consumer)?;

    let report = RunReport {
        strategy: C::STRATEGY,
        elapsed: started.elapsed(),
        producer,
        consumer,
        channel: channel.stats(),
    };

    report.log();
    Ok(report)
}

/// Runs whichever channel `config.strategy` names.
pub fn run_configured(config: &Config) -> Result<Summary> {
    let summary = match config.strategy {
        Strategy::Naive => run::<NaiveChannel>(config)?.summary(),
        Strategy::Locked => run::<LockedChannel>(config)?.summary(),
        Strategy::Spin => run::<SpinChannel>(config)?.summary(),
        Strategy::Notify => run::<NotifyChannel>(config)?.summary(),
    };
    Ok(summary)
}

//
//  Public Methods
//
impl<T> RunReport<T> {
    //  strategy, elapsed, producer, consumer, channel

    /// Returns the report, minus the items.
    pub fn summary(&self) -> Summary {
        Summary {
            strategy: self.strategy,
            elapsed: self.elapsed,
            producer: self.producer,
            consumer: self.consumer.stats,
            channel: self.channel,
        }
    }

    /// Returns the number of items produced past those consumed.
    pub fn overshoot(&self) -> usize { self.summary().overshoot() }

    fn log(&self) {
        let summary = self.summary();

        info!(
            strategy = %summary.strategy,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            produced = summary.producer.produced,
            consumed = summary.consumer.consumed,
            overshoot = summary.overshoot(),
            "run complete"
        );
        debug!(
            lock_acquisitions = summary.consumer.lock_acquisitions,
            empty_polls = summary.consumer.empty_polls,
            flag_spins = summary.consumer.flag_spins,
            wakeups = summary.consumer.wakeups,
            peak_len = summary.channel.peak_len,
            remaining = summary.channel.remaining,
            "consumer statistics"
        );

        if summary.consumer.anomalies > 0 {
            warn!(
                anomalies = summary.consumer.anomalies,
                "items were duplicated or skipped"
            );
        }
        if let Some(peak) = summary.channel.peak_occupancy {
            if peak > 1 {
                warn!(peak, "critical section entered concurrently");
            }
        }
    }
}

impl Summary {
    /// Returns the number of items produced past those consumed.
    pub fn overshoot(&self) -> usize {
        self.producer.produced.saturating_sub(self.consumer.consumed)
    }
}

//
//  Trait Implementations
//
impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: consumed {} of {} produced items in {}ms",
            self.strategy,
            self.consumer.consumed,
            self.producer.produced,
            self.elapsed.as_millis(),
        )?;

        if self.consumer.lock_acquisitions > 0 {
            write!(f, ", {} lock acquisitions", self.consumer.lock_acquisitions)?;
        }
        write!(f, ", {} empty polls", self.consumer.empty_polls)?;
        if self.consumer.flag_spins > 0 {
            write!(f, ", {} flag spins", self.consumer.flag_spins)?;
        }
        if self.consumer.wakeups > 0 {
            write!(f, ", {} wakeups", self.consumer.wakeups)?;
        }
        if self.consumer.anomalies > 0 {
            write!(f, ", {} out of sequence", self.consumer.anomalies)?;
        }
        Ok(())
    }
}

//
//  Private Functions
//
fn spawn<R, F>(role: Role, body: F) -> Result<thread::JoinHandle<R>>
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    debug!(%role, "spawning thread");
    thread::Builder::new()
        .name(role.to_string())
        .spawn(move || {
            debug!(%role, "thread started");
            let result = body();
            debug!(%role, "thread exiting");
            result
        })
        .map_err(Error::Spawn)
}

fn join<R>(role: Role, handle: thread::JoinHandle<R>) -> Result<R> {
    handle.join().map_err(|_| Error::WorkerPanicked(role))
}

//  Without a consumer nothing reaches the limit: force it, then reap the producer.
fn abandon<C: Channel>(
    channel: &C,
    producer: thread::JoinHandle<ProducerReport>,
) -> Result<ProducerReport> {
    warn!(strategy = %C::STRATEGY, "consumer did not start, stopping producer");
    channel.stop();
    join(Role::Producer, producer)
}
