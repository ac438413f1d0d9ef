//! A bounded-buffer race experiment over a small array of slot cells.
//!
//! Two roles share one [`SlotArray`] of `n` cells:
//!
//! - the tail advancer (producer) reads the tail cell, waits for an induced
//!   delay, reads it again and, if it did not change, writes the next value
//!   modulo `n`;
//! - the head drainer (consumer) reads the head cell and shifts the whole
//!   array left by one, zeroing the tail.
//!
//! If the two roles alternate strictly, the head cell only ever holds `0` or
//! `1`. Any higher value means two advances landed between drains, and the
//! drainer reports it as a race condition.
//!
//! The same roles run in two experiments that differ only in their
//! [`Exclusion`] policy:
//!
//! - [`Unsynchronized`] runs each step as is, and with a nonzero delay and a
//!   burst above one it finds a race in most runs;
//! - [`Synchronized`] runs each step under a fair MCS [spin-lock] shared by
//!   both roles. The lock orders whole steps but does not force the roles
//!   to alternate, so with a burst of one it finds no race within `n`
//!   drains, while a longer run can still stack two advances between drains.
//!
//! Every slot cell is an atomic with relaxed ordering, so the race is purely
//! logical: it spans multi-cell sequences and never becomes a data race.
//!
//! ## Running an experiment
//!
//! ```
//! use std::time::Duration;
//!
//! use slotrace::{Config, Outcome, Synchronized};
//!
//! let config = Config::synchronized().with_delay(Duration::ZERO).with_idle(Duration::from_millis(20));
//! let report = Synchronized::new(config)?.run()?;
//! assert_eq!(report.outcome, Outcome::BudgetExhausted);
//! assert_eq!((report.producer_steps, report.consumer_steps), (10, 10));
//! # Ok::<(), slotrace::Error>(())
//! ```
//!
//! A [`Config`] can also be read from TOML, see [`Config::from_toml_str`].
//! Both workers log through [`tracing`]; install any subscriber to see the
//! `so far okay` progress events and the final verdict.
//!
//! [`SlotArray`]: slots::SlotArray
//! [`Exclusion`]: exclusion::Exclusion
//! [`Unsynchronized`]: experiment::Unsynchronized
//! [`Synchronized`]: experiment::Synchronized
//! [spin-lock]: https://en.wikipedia.org/wiki/Spinlock
//! [`tracing`]: https://docs.rs/tracing

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod config;
pub mod consumer;
pub mod error;
pub mod exclusion;
pub mod lock;
pub mod producer;
pub mod relax;
pub mod slots;
pub mod state;

#[cfg(not(all(loom, test)))]
pub mod experiment;

pub use config::Config;
pub use error::{Error, Result};

#[cfg(not(all(loom, test)))]
pub use experiment::{Experiment, Outcome, Report, Synchronized, Unsynchronized};

pub(crate) mod cfg;

#[cfg(all(not(loom), test))]
pub(crate) mod test;

#[cfg(all(loom, test))]
#[cfg(not(tarpaulin))]
pub(crate) mod loom;
