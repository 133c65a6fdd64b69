//! Result alias and Railway-style combinators.
//!
//! Failures that are contained at their origin (an agent that errors, a subscriber
//! that throws) are logged and turned into values with these helpers instead of being
//! propagated.

use crate::error::Error;

/// The standard Result type for concord operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Log-and-continue helpers for any `Result` whose error can be displayed.
pub trait ResultExt<T> {
    /// Convert to an Option, logging the error at `warn` if present.
    fn into_option_logged(self, context: &str) -> Option<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn into_option_logged(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "{context}");
                None
            }
        }
    }
}

/// Railway helpers for Option.
pub trait OptionExt<T> {
    /// Tap into None without consuming the Option.
    fn tap_none<F: FnOnce()>(self, f: F) -> Self;
}

impl<T> OptionExt<T> for Option<T> {
    fn tap_none<F: FnOnce()>(self, f: F) -> Self {
        if self.is_none() {
            f();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_option_logged() {
        let ok: Result<i32> = Ok(42);
        assert_eq!(ok.into_option_logged("ctx"), Some(42));

        let err: Result<i32> = Err(Error::invalid_config("field", "boom"));
        assert_eq!(err.into_option_logged("ctx"), None);
    }

    #[test]
    fn test_tap_none() {
        let mut called = false;
        let value: Option<i32> = None;
        let _ = value.tap_none(|| called = true);
        assert!(called);
    }
}
