//! Knobs of a run: which strategy, how many items, how slow the producer is.
//!
//! A `Config` can be built in code, or loaded from a TOML file carrying the
//! same keys:
//!
//! ```toml
//! strategy = "spin"
//! consumer_limit = 1000
//! wait = true
//! delay_ms = 1
//! ```

use std::{fmt, fs, path, time};

use serde::Deserialize;

use crate::error::{Error, Result};

//
//  Public Constants
//

/// Items to consume when no limit is configured.
pub const DEFAULT_LIMIT: usize = 1_000_000;

/// Items to consume with the naive strategy when no limit is configured.
///
/// The unsynchronized demo traces every item, a million lines is no demo.
pub const NAIVE_DEFAULT_LIMIT: usize = 1_000;

/// Pause of a slow producer between two pushes, in milliseconds.
pub const DEFAULT_DELAY_MS: u64 = 1;

/// Number of slots of the naive ring.
pub const DEFAULT_NAIVE_CAPACITY: usize = 1 << 16;

//
//  Public Structs
//

/// The synchronization strategy wired between producer and consumer.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[derive(Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// No synchronization at all; intentionally broken.
    Naive,
    /// A single lock around every queue access; consumer polls under lock.
    #[default]
    Locked,
    /// Lock plus an advisory flag the consumer spins on while empty.
    Spin,
    /// Lock plus a condition variable the consumer blocks on while empty.
    Notify,
}

/// Configuration of a single run.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Which producer/consumer pair to wire up.
    pub strategy: Strategy,
    /// Number of items the consumer must process before both sides stop;
    /// see `limit` for the default.
    pub consumer_limit: Option<usize>,
    /// Whether the producer sleeps `delay_ms` before each push.
    pub wait: bool,
    /// Producer pause when `wait` is set.
    pub delay_ms: u64,
    /// Whether every consumed item is printed on stdout.
    pub trace: bool,
    /// Whether the consumer keeps every consumed item for its report.
    pub record: bool,
    /// Number of slots of the naive ring, past which the producer laps the
    /// consumer.
    pub naive_capacity: usize,
}

//
//  Public Methods
//
impl Config {
    /// Creates the default configuration for the given strategy.
    pub fn new(strategy: Strategy) -> Config {
        Config { strategy, ..Config::default() }
    }

    /// Loads a configuration from a TOML file.
    pub fn load<P: AsRef<path::Path>>(path: P) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(Error::ConfigRead)?;
        Config::parse(&content)
    }

    /// Parses a configuration from TOML text.
    pub fn parse(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the consumer limit.
    pub fn with_limit(mut self, limit: usize) -> Config {
        self.consumer_limit = Some(limit);
        self
    }

    /// Makes the producer sleep `delay_ms` before each push.
    pub fn with_wait(mut self, wait: bool) -> Config {
        self.wait = wait;
        self
    }

    /// Makes the consumer keep the consumed items.
    pub fn with_record(mut self, record: bool) -> Config {
        self.record = record;
        self
    }

    /// Returns the number of items the consumer must process.
    pub fn limit(&self) -> usize {
        match (self.consumer_limit, self.strategy) {
            (Some(limit), _) => limit,
            (None, Strategy::Naive) => NAIVE_DEFAULT_LIMIT,
            (None, _) => DEFAULT_LIMIT,
        }
    }

    /// Returns the pause of the producer before each push, if any.
    pub fn delay(&self) -> Option<time::Duration> {
        if self.wait {
            Some(time::Duration::from_millis(self.delay_ms))
        } else {
            None
        }
    }

    /// Checks that the configuration can drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.naive_capacity == 0 {
            return Err(Error::InvalidConfig(
                "naive_capacity must be at least 1".to_owned()
            ));
        }
        Ok(())
    }
}

//
//  Trait Implementations
//
impl Default for Config {
    fn default() -> Config {
        Config {
            strategy: Strategy::default(),
            consumer_limit: None,
            wait: false,
            delay_ms: DEFAULT_DELAY_MS,
            trace: false,
            record: false,
            naive_capacity: DEFAULT_NAIVE_CAPACITY,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            Strategy::Naive => "naive",
            Strategy::Locked => "locked",
            Strategy::Spin => "spin",
            Strategy::Notify => "notify",
        };
        f.write_str(name)
    }
}
