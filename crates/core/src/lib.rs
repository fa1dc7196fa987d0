//! # tickd-core
//!
//! Error and result types shared by the tickd daemon crates.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod error;
pub mod result;

pub use error::Error;
pub use result::{LoggedResultExt, Result};
