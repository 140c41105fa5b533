#![deny(missing_docs)]

//! A single producer, a single consumer, a queue between them, and several
//! ways of getting it wrong, or less wrong.
//!
//! This crate hands items from one producer thread to one consumer thread
//! through a shared queue, with a choice of synchronization strategies:
//!
//! - naive: no synchronization at all, items get duplicated or lost,
//! - locked: a single lock, correct, but the consumer polls under the lock,
//! - spin: a lock plus a flag, correct, the consumer polls the flag instead,
//! - notify: a lock plus a condition variable, correct, the consumer sleeps.
//!
//! All strategies share a unified interface, see `interface`, and are driven
//! by the `harness`.
//!
//! # Warning
//!
//! The naive strategy is broken on purpose, and the locked and spin strategies
//! waste a full core whenever the producer is slower than the consumer. They
//! are demonstrations, not building blocks.

pub mod config;
pub mod error;
pub mod harness;
pub mod interface;
pub mod locked;
pub mod naive;
pub mod notify;
pub mod spin;

mod common;

pub use config::{Config, Strategy};
pub use error::{Error, Result, Role};
