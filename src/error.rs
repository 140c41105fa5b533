//! Failures of the harness itself.
//!
//! The hazards the channels demonstrate (duplicated or skipped items, wasted
//! polls, unbounded growth) are *not* errors: they are counted in the reports.

use std::{fmt, io};

use thiserror::Error;

/// The two roles sharing a channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// The side inserting items.
    Producer,
    /// The side removing items.
    Consumer,
}

/// Errors raised while configuring or running a channel.
#[derive(Error, Debug)]
pub enum Error {
    /// The channel already handed out this role.
    #[error("a {0} is already registered on this channel")]
    RoleTaken(Role),

    /// A worker thread panicked before it could be joined.
    #[error("the {0} thread panicked")]
    WorkerPanicked(Role),

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    /// The configuration cannot drive a run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read.
    #[error("failed to read configuration file: {0}")]
    ConfigRead(#[source] io::Error),

    /// The configuration file is not valid TOML for `Config`.
    #[error("failed to parse configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Role::Producer => f.write_str("producer"),
            Role::Consumer => f.write_str("consumer"),
        }
    }
}
