//! Result type definition and logging combinators.
//!
//! Long-running loops must not stop on a single failure, so these helpers
//! turn an error into a log line and let the caller carry on.

use crate::error::Error;

/// The standard Result type for tickd daemon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for Results whose failure should be logged, not propagated.
pub trait LoggedResultExt<T> {
    /// Convert to an Option, logging the error under `context` if present.
    fn ok_logged(self, context: &str) -> Option<T>;

    /// Get the value or a default, logging the error under `context` if present.
    fn or_default_logged(self, context: &str, default: T) -> T;
}

impl<T, E: std::fmt::Display> LoggedResultExt<T> for std::result::Result<T, E> {
    fn ok_logged(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(context, error = %e, "Operation failed");
                None
            }
        }
    }

    fn or_default_logged(self, context: &str, default: T) -> T {
        self.ok_logged(context).unwrap_or(default)
    }
}
