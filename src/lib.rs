#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # tickd
//!
//! Daemon that owns a [`timetracker::Timetracker`], installs the built-in
//! housekeeping timers, and drives dispatch passes at a fixed cadence.

pub mod cli;
pub mod config;
pub mod driver;
pub mod housekeeping;

pub use tickd_core;
pub use timetracker;
